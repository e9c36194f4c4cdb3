//! ExecutionRequest: what the dispatcher is asked to run.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Name → value pairs handed to the executed code.
///
/// Inline mode exposes them through the evaluator scope; subprocess and
/// background modes pass them as the child's environment.
pub type Bindings = BTreeMap<String, String>;

/// Isolation tier for an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Shared runtime, same process.
    Inline,
    /// Separate interpreter process with piped stdio.
    #[default]
    Subprocess,
    /// Detached interpreter process.
    Background,
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionMode::Inline => write!(f, "inline"),
            ExecutionMode::Subprocess => write!(f, "subprocess"),
            ExecutionMode::Background => write!(f, "background"),
        }
    }
}

/// A single execution request.
///
/// Built per call and consumed by the dispatcher:
///
/// ```
/// use snipbox_types::{ExecutionMode, ExecutionRequest};
///
/// let req = ExecutionRequest::new("echo getenv('who');")
///     .bind("who", "world")
///     .mode(ExecutionMode::Subprocess);
/// assert_eq!(req.bindings["who"], "world");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Raw source text.
    pub code: String,
    /// Values exposed to the code.
    #[serde(default)]
    pub bindings: Bindings,
    /// Isolation tier.
    #[serde(default)]
    pub mode: ExecutionMode,
    /// Prepend the interpreter's diagnostics directive.
    #[serde(default)]
    pub enable_diagnostics: bool,
    /// Background only: block until the child exits.
    #[serde(default)]
    pub wait_for_completion: bool,
}

impl ExecutionRequest {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            bindings: Bindings::new(),
            mode: ExecutionMode::default(),
            enable_diagnostics: false,
            wait_for_completion: false,
        }
    }

    /// Replace all bindings.
    pub fn bindings(mut self, bindings: Bindings) -> Self {
        self.bindings = bindings;
        self
    }

    /// Add one binding.
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.bindings.insert(name.into(), value.into());
        self
    }

    pub fn mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn diagnostics(mut self, enable: bool) -> Self {
        self.enable_diagnostics = enable;
        self
    }

    pub fn wait(mut self, wait: bool) -> Self {
        self.wait_for_completion = wait;
        self
    }
}
