//! Interpreter process plumbing.
//!
//! Two ways to run the interpreter:
//!
//! - [`run_piped`]: stdin, stdout and stderr piped. Stdin is fed while both
//!   output pipes are drained, so a child that floods its output before
//!   reading all of its input cannot wedge us on a full pipe buffer.
//! - [`spawn_detached`]: stdio detached, own process group, optionally waited on.

use std::ffi::{OsStr, OsString};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use snipbox_types::Bindings;

use crate::error::{SandboxError, SandboxResult};

/// A fully described interpreter invocation.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    /// Environment variables for the child.
    pub env: Bindings,
    /// Start from an empty environment instead of inheriting ours.
    pub clear_env: bool,
    pub cwd: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Bindings::new(),
            clear_env: false,
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn program_name(&self) -> String {
        self.program.display().to_string()
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);

        if self.clear_env {
            cmd.env_clear();
        }
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }
        cmd
    }
}

/// Run to completion with piped stdio.
///
/// `input`, when present, is written to the child's stdin, which is then
/// closed; otherwise stdin is `/dev/null`.
pub async fn run_piped(invocation: &Invocation, input: Option<&[u8]>) -> SandboxResult<Output> {
    let mut cmd = invocation.command();
    cmd.stdin(if input.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    });
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let mut child = cmd.spawn().map_err(|source| SandboxError::Spawn {
        program: invocation.program_name(),
        source,
    })?;
    tracing::debug!(pid = ?child.id(), program = %invocation.program.display(), "spawned interpreter");

    let stdin = child.stdin.take();
    let feed = async move {
        if let (Some(mut stdin), Some(data)) = (stdin, input) {
            stdin.write_all(data).await?;
            stdin.shutdown().await?;
        }
        Ok::<(), io::Error>(())
    };

    let (fed, output) = tokio::join!(feed, child.wait_with_output());

    match fed {
        Ok(()) => {}
        // The child may exit without reading all of its input (e.g. on a parse error).
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
            tracing::debug!("interpreter closed stdin early");
        }
        Err(e) => return Err(SandboxError::io("write interpreter stdin", e)),
    }

    output.map_err(|e| SandboxError::io("wait for interpreter", e))
}

/// Start a detached child. With `wait`, block until it exits.
///
/// The exit status is logged and otherwise ignored. Without `wait` the child
/// runs on its own; the runtime reaps it when it exits.
pub async fn spawn_detached(invocation: &Invocation, wait: bool) -> SandboxResult<()> {
    let mut cmd = invocation.command();
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::null());
    cmd.stderr(Stdio::null());
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn().map_err(|source| SandboxError::ForkFailed {
        program: invocation.program_name(),
        source,
    })?;
    let pid = child.id();
    tracing::debug!(?pid, wait, "started background interpreter");

    if wait {
        match child.wait().await {
            Ok(status) => tracing::debug!(?pid, %status, "background interpreter exited"),
            Err(e) => tracing::warn!("Failed to wait for background interpreter {:?}: {}", pid, e),
        }
    }
    Ok(())
}

/// First executable named `name` in a `PATH`-style list of directories.
///
/// Empty entries are skipped rather than meaning the current directory.
pub fn find_executable(name: &str, search_path: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(search_path)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

/// [`find_executable`] over this process's `PATH`.
pub fn which(name: &str) -> Option<PathBuf> {
    std::env::var_os("PATH").and_then(|path| find_executable(name, &path))
}

fn is_executable(path: &Path) -> bool {
    let Ok(metadata) = path.metadata() else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}
