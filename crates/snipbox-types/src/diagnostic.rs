//! Diagnostic: a classified interpreter failure.
//!
//! Subprocess executions capture the interpreter's stderr; the classifier in
//! snipbox-kernel turns that text into at most one `Diagnostic`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Kind of a classified diagnostic.
///
/// The numeric codes are stable and exposed to hosts through [`DiagnosticKind::code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// The interpreter could not parse the snippet.
    ParseError,
    /// The interpreter aborted at runtime.
    FatalError,
    /// Non-fatal runtime warning.
    Warning,
    /// Informational runtime notice.
    Notice,
    /// Non-empty diagnostic output that matched no known pattern.
    Generic,
}

impl DiagnosticKind {
    /// Every kind, in classification priority order (Generic last).
    pub const ALL: [DiagnosticKind; 5] = [
        DiagnosticKind::ParseError,
        DiagnosticKind::FatalError,
        DiagnosticKind::Warning,
        DiagnosticKind::Notice,
        DiagnosticKind::Generic,
    ];

    /// Stable numeric code for this kind.
    pub fn code(self) -> u32 {
        match self {
            DiagnosticKind::ParseError => 0x1,
            DiagnosticKind::FatalError => 0x2,
            DiagnosticKind::Warning => 0x3,
            DiagnosticKind::Notice => 0x4,
            DiagnosticKind::Generic => 0x5,
        }
    }

    /// Parse and fatal errors share the "hard error" category.
    pub fn is_hard_error(self) -> bool {
        matches!(self, DiagnosticKind::ParseError | DiagnosticKind::FatalError)
    }
}

impl std::fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiagnosticKind::ParseError => write!(f, "parse error"),
            DiagnosticKind::FatalError => write!(f, "fatal error"),
            DiagnosticKind::Warning => write!(f, "warning"),
            DiagnosticKind::Notice => write!(f, "notice"),
            DiagnosticKind::Generic => write!(f, "error"),
        }
    }
}

/// A classified diagnostic produced from an interpreter's error log.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct Diagnostic {
    /// What the classifier recognized.
    pub kind: DiagnosticKind,
    /// First line of the log (or the whole log for `Generic`).
    pub message: String,
    /// The complete, unmodified log.
    pub raw_log: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>, raw_log: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            raw_log: raw_log.into(),
        }
    }

    /// Stable numeric code of the diagnostic's kind.
    pub fn code(&self) -> u32 {
        self.kind.code()
    }
}
