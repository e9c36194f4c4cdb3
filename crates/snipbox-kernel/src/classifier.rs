//! Diagnostic classifier: interpreter error text to a typed failure.
//!
//! The classifier tests a log against an ordered pattern list and reports the
//! first kind that matches. Order is priority, not position: a log that
//! starts with a notice and later carries a fatal error is a fatal error.
//!
//! ```
//! use snipbox_kernel::classifier::classify;
//! use snipbox_types::DiagnosticKind;
//!
//! let log = "PHP Notice:  Undefined index: a\nPHP Fatal error:  boom\n";
//! let d = classify(log).unwrap();
//! assert_eq!(d.kind, DiagnosticKind::FatalError);
//! assert_eq!(d.message, "PHP Notice:  Undefined index: a");
//! ```

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use snipbox_types::{Diagnostic, DiagnosticKind};

/// Pattern text for each recognized kind.
///
/// Values are regular expressions matched anywhere in the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticPatterns {
    #[serde(default = "default_parse_error")]
    pub parse_error: String,
    #[serde(default = "default_fatal_error")]
    pub fatal_error: String,
    #[serde(default = "default_warning")]
    pub warning: String,
    #[serde(default = "default_notice")]
    pub notice: String,
}

fn default_parse_error() -> String {
    "PHP Parse error:".to_string()
}

fn default_fatal_error() -> String {
    "PHP Fatal error:".to_string()
}

fn default_warning() -> String {
    "PHP Warning:".to_string()
}

fn default_notice() -> String {
    "PHP Notice:".to_string()
}

impl Default for DiagnosticPatterns {
    fn default() -> Self {
        Self {
            parse_error: default_parse_error(),
            fatal_error: default_fatal_error(),
            warning: default_warning(),
            notice: default_notice(),
        }
    }
}

/// Ordered pattern list: parse error, fatal error, warning, notice.
#[derive(Debug, Clone)]
pub struct Classifier {
    patterns: Vec<(DiagnosticKind, Regex)>,
}

static DEFAULT: LazyLock<Classifier> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    let classifier = Classifier::from_patterns(&DiagnosticPatterns::default())
        .expect("default diagnostic patterns compile");
    classifier
});

impl Classifier {
    /// Build a classifier from pattern text. Priority order is fixed.
    pub fn from_patterns(patterns: &DiagnosticPatterns) -> Result<Self, regex::Error> {
        Ok(Self {
            patterns: vec![
                (DiagnosticKind::ParseError, Regex::new(&patterns.parse_error)?),
                (DiagnosticKind::FatalError, Regex::new(&patterns.fatal_error)?),
                (DiagnosticKind::Warning, Regex::new(&patterns.warning)?),
                (DiagnosticKind::Notice, Regex::new(&patterns.notice)?),
            ],
        })
    }

    /// Classify a raw log. Empty logs are success (`None`).
    pub fn classify(&self, raw_log: &str) -> Option<Diagnostic> {
        if raw_log.is_empty() {
            return None;
        }

        let kind = self
            .patterns
            .iter()
            .find(|(_, re)| re.is_match(raw_log))
            .map(|(kind, _)| *kind);

        Some(match kind {
            Some(kind) => Diagnostic::new(kind, first_line(raw_log), raw_log),
            None => Diagnostic::new(DiagnosticKind::Generic, raw_log, raw_log),
        })
    }
}

impl Default for Classifier {
    fn default() -> Self {
        DEFAULT.clone()
    }
}

/// Classify with the default PHP patterns.
pub fn classify(raw_log: &str) -> Option<Diagnostic> {
    DEFAULT.classify(raw_log)
}

fn first_line(raw_log: &str) -> &str {
    raw_log.split('\n').next().unwrap_or(raw_log).trim()
}
