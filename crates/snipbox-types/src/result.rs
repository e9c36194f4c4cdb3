//! ExecutionResult: output of an inline or subprocess execution.

use serde::{Deserialize, Serialize};

/// Captured output of a finished execution.
///
/// Background executions produce no result; success there only means the
/// child process started.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Everything the code wrote to its output.
    pub captured_output: String,
}

impl ExecutionResult {
    pub fn new(captured_output: impl Into<String>) -> Self {
        Self {
            captured_output: captured_output.into(),
        }
    }
}

impl From<String> for ExecutionResult {
    fn from(captured_output: String) -> Self {
        Self { captured_output }
    }
}
