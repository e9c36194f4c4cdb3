//! Configuration for the dispatcher.
//!
//! Configuration is loaded from `~/.config/snipbox/snipbox.toml`. Every
//! field has a default, so a missing file or an empty table is valid.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::classifier::DiagnosticPatterns;
use crate::paths;
use crate::process::which;

/// Environment variable that overrides interpreter discovery.
pub const INTERPRETER_ENV: &str = "SNIPBOX_INTERPRETER";

/// Where inline scripts live while they are evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InlineStaging {
    /// `sandbox://<token>` in the process-wide virtual store.
    #[default]
    Virtual,
    /// `<token>.<ext>` in the staging directory.
    Disk,
}

/// How subprocess executions receive their source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubprocessStaging {
    /// Written to the child's stdin.
    #[default]
    Pipe,
    /// Written to a staging file whose path is passed as an argument.
    Disk,
}

/// How to talk to one interpreter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterpreterProfile {
    /// Interpreter binary. Discovered from the environment when unset.
    #[serde(default)]
    pub binary: Option<PathBuf>,

    /// Arguments placed before everything else on every invocation.
    #[serde(default = "default_args")]
    pub args: Vec<String>,

    /// Flag that makes the interpreter run its next argument as code.
    #[serde(default = "default_run_flag")]
    pub run_flag: String,

    /// Marker that switches the interpreter into code mode.
    #[serde(default = "default_entry_marker")]
    pub entry_marker: String,

    /// Statement that turns on maximal diagnostic verbosity.
    #[serde(default = "default_diagnostics_directive")]
    pub diagnostics_directive: String,

    /// File extension for staged scripts.
    #[serde(default = "default_extension")]
    pub extension: String,
}

fn default_args() -> Vec<String> {
    // Route diagnostics to stderr with the logged "PHP " prefix.
    ["-d", "display_errors=0", "-d", "log_errors=1", "-d", "error_reporting=E_ALL"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_run_flag() -> String {
    "-r".to_string()
}

fn default_entry_marker() -> String {
    "<?php".to_string()
}

fn default_diagnostics_directive() -> String {
    "ini_set('display_errors', '1'); error_reporting(E_ALL);".to_string()
}

fn default_extension() -> String {
    "php".to_string()
}

impl Default for InterpreterProfile {
    fn default() -> Self {
        Self {
            binary: None,
            args: default_args(),
            run_flag: default_run_flag(),
            entry_marker: default_entry_marker(),
            diagnostics_directive: default_diagnostics_directive(),
            extension: default_extension(),
        }
    }
}

impl InterpreterProfile {
    /// Resolve the interpreter binary.
    ///
    /// Order: configured path, `$SNIPBOX_INTERPRETER`, `php` on `PATH`, bare
    /// `php` (the OS reports the failure at spawn time).
    pub fn resolve_binary(&self) -> PathBuf {
        if let Some(binary) = &self.binary {
            return binary.clone();
        }

        if let Ok(binary) = std::env::var(INTERPRETER_ENV)
            && !binary.is_empty()
        {
            return PathBuf::from(binary);
        }

        which("php").unwrap_or_else(|| PathBuf::from("php"))
    }
}

/// Top-level dispatcher configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Cache root; staging lives in `<cache_dir>/staging`.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    /// Start children from an empty environment instead of inheriting ours.
    #[serde(default)]
    pub clear_env: bool,

    /// Run subprocess children inside the staging directory.
    #[serde(default = "default_true")]
    pub use_staging_cwd: bool,

    #[serde(default)]
    pub inline_staging: InlineStaging,

    #[serde(default)]
    pub subprocess_staging: SubprocessStaging,

    #[serde(default)]
    pub interpreter: InterpreterProfile,

    #[serde(default)]
    pub diagnostics: DiagnosticPatterns,
}

fn default_true() -> bool {
    true
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            clear_env: false,
            use_staging_cwd: true,
            inline_staging: InlineStaging::default(),
            subprocess_staging: SubprocessStaging::default(),
            interpreter: InterpreterProfile::default(),
            diagnostics: DiagnosticPatterns::default(),
        }
    }
}

impl SandboxConfig {
    /// Load configuration from the default path.
    ///
    /// If the config file doesn't exist, returns default configuration.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();

        if !path.exists() {
            tracing::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Default config file path.
    pub fn config_path() -> PathBuf {
        paths::config_dir().join("snipbox.toml")
    }

    /// Directory where staged scripts are written.
    pub fn staging_dir(&self) -> PathBuf {
        match &self.cache_dir {
            Some(root) => root.join(paths::STAGING_DIR_NAME),
            None => paths::staging_dir(),
        }
    }

    /// Use `root` as the cache root.
    pub fn with_cache_dir(mut self, root: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(root.into());
        self
    }

    /// Use a specific interpreter binary.
    pub fn with_interpreter(mut self, binary: impl Into<PathBuf>) -> Self {
        self.interpreter.binary = Some(binary.into());
        self
    }
}
