//! Disk staging for scripts that must exist as real files.
//!
//! The staging directory is created on demand under the cache root. Every
//! staged file is owned by a [`StagedScript`] that removes it when dropped,
//! so files disappear on success and failure alike.

use std::path::{Path, PathBuf};

use crate::error::{SandboxError, SandboxResult};

/// A directory that holds transient script files.
#[derive(Debug, Clone)]
pub struct StagingDir {
    root: PathBuf,
    extension: String,
}

impl StagingDir {
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            extension: extension.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Create the directory (and parents) if it does not exist yet.
    pub async fn ensure(&self) -> SandboxResult<&Path> {
        tokio::fs::create_dir_all(&self.root).await.map_err(|e| {
            SandboxError::io(format!("create staging dir {}", self.root.display()), e)
        })?;
        Ok(&self.root)
    }

    /// Path a token's script would be staged at.
    pub fn script_path(&self, token: &str) -> PathBuf {
        if self.extension.is_empty() {
            self.root.join(token)
        } else {
            self.root.join(format!("{}.{}", token, self.extension))
        }
    }

    /// Write `source` to `<token>.<ext>`.
    ///
    /// Fails if the file already exists, so a colliding token never
    /// clobbers another execution's script.
    pub async fn stage(&self, token: &str, source: &str) -> SandboxResult<StagedScript> {
        use tokio::io::AsyncWriteExt;

        self.ensure().await?;
        let path = self.script_path(token);

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| SandboxError::io(format!("stage {}", path.display()), e))?;

        // Own the path before writing so a failed write still cleans up.
        let staged = StagedScript { path };
        file.write_all(source.as_bytes())
            .await
            .map_err(|e| SandboxError::io(format!("write {}", staged.path.display()), e))?;
        file.flush()
            .await
            .map_err(|e| SandboxError::io(format!("flush {}", staged.path.display()), e))?;

        tracing::debug!(path = %staged.path.display(), "staged script");
        Ok(staged)
    }
}

/// A staged script file, removed on drop.
#[derive(Debug)]
pub struct StagedScript {
    path: PathBuf,
}

impl StagedScript {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagedScript {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!("Failed to remove staged script {}: {}", self.path.display(), e);
            }
        }
    }
}
