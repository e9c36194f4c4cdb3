//! Source providers: load a script by location.

use std::io::{self, Read};
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::memory::VirtualScriptStore;

/// Loads script text from a named location.
///
/// Evaluators "include" scripts through this trait, so a virtual script and
/// a real file are interchangeable.
#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// Read the whole script at `location`.
    async fn load(&self, location: &str) -> io::Result<String>;
}

/// Serves `sandbox://<token>` locations from a [`VirtualScriptStore`].
#[derive(Debug, Clone)]
pub struct VirtualSource {
    store: VirtualScriptStore,
}

impl VirtualSource {
    pub fn new(store: VirtualScriptStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SourceProvider for VirtualSource {
    async fn load(&self, location: &str) -> io::Result<String> {
        let mut handle = self
            .store
            .open(location)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;

        if !self.store.contains(handle.token()) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("not found: {}", location),
            ));
        }

        let mut source = String::new();
        handle.read_to_string(&mut source)?;
        Ok(source)
    }
}

/// Serves real files, optionally confined to a root directory.
#[derive(Debug, Clone, Default)]
pub struct FileSource {
    root: Option<PathBuf>,
}

impl FileSource {
    /// Any path on the local filesystem.
    pub fn new() -> Self {
        Self::default()
    }

    /// Only paths under `root`; relative locations resolve against it.
    pub fn rooted(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, location: &str) -> io::Result<PathBuf> {
        let path = Path::new(location);
        let Some(root) = &self.root else {
            return Ok(path.to_path_buf());
        };

        let full = if path.is_absolute() {
            path.to_path_buf()
        } else {
            root.join(path)
        };

        if full.components().any(|c| matches!(c, std::path::Component::ParentDir))
            || !full.starts_with(root)
        {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("outside of {}: {}", root.display(), location),
            ));
        }
        Ok(full)
    }
}

#[async_trait]
impl SourceProvider for FileSource {
    async fn load(&self, location: &str) -> io::Result<String> {
        let path = self.resolve(location)?;
        tokio::fs::read_to_string(&path).await
    }
}
