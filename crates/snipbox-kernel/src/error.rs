//! Error types for the dispatcher.

use std::io;

use thiserror::Error;

use snipbox_types::Diagnostic;

/// Result type for sandbox operations.
pub type SandboxResult<T> = Result<T, SandboxError>;

/// Failures raised by the dispatcher itself.
///
/// Subprocess diagnostics arrive as [`SandboxError::Diagnostic`]; inline
/// failures raised by the host runtime are carried separately by
/// [`InlineError`] so they reach the caller untouched.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error(transparent)]
    Diagnostic(#[from] Diagnostic),
    #[error("could not start background interpreter {program}: {source}")]
    ForkFailed {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("could not spawn interpreter {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
    #[error("invalid virtual script uri: {0}")]
    InvalidUri(String),
    #[error("could not allocate a free script token")]
    TokenExhausted,
    #[error("inline execution needs an evaluator")]
    InlineUnsupported,
}

impl SandboxError {
    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        SandboxError::Io {
            context: context.into(),
            source,
        }
    }

    /// The classified diagnostic, if this failure came from the interpreter's log.
    pub fn diagnostic(&self) -> Option<&Diagnostic> {
        match self {
            SandboxError::Diagnostic(d) => Some(d),
            _ => None,
        }
    }

    /// Numeric diagnostic code, if any.
    pub fn code(&self) -> Option<u32> {
        self.diagnostic().map(Diagnostic::code)
    }
}

/// Failure of an inline execution.
#[derive(Debug, Error)]
pub enum InlineError<E> {
    /// Raised by the evaluator; passed through unmodified.
    #[error("{0}")]
    Native(E),
    /// Staging or store failure before or after evaluation.
    #[error(transparent)]
    Sandbox(#[from] SandboxError),
}

impl<E> InlineError<E> {
    /// The evaluator's own error, if that is what failed.
    pub fn into_native(self) -> Option<E> {
        match self {
            InlineError::Native(e) => Some(e),
            InlineError::Sandbox(_) => None,
        }
    }
}
