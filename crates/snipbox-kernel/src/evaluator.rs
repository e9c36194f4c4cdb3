//! The inline evaluator capability.
//!
//! Inline mode runs snippets inside the host's own runtime. snipbox does not
//! know how to execute the language; the host plugs its runtime in through
//! [`Evaluator`]. The dispatcher stages the script, opens a capture frame,
//! and asks the evaluator to include it.

use std::io;

use async_trait::async_trait;

use snipbox_types::Bindings;

use crate::capture::OutputStack;
use crate::store::SourceProvider;

/// What an evaluator is asked to run.
#[derive(Clone, Copy)]
pub enum ScriptInput<'a> {
    /// A named script, loaded through `provider` as if it were a file.
    Location {
        location: &'a str,
        provider: &'a dyn SourceProvider,
    },
    /// Source text handed over directly.
    Direct(&'a str),
}

impl ScriptInput<'_> {
    /// Resolve the script text.
    pub async fn source(&self) -> io::Result<String> {
        match self {
            ScriptInput::Location { location, provider } => provider.load(location).await,
            ScriptInput::Direct(source) => Ok(source.to_string()),
        }
    }

    /// Location of the script, if it has one.
    pub fn location(&self) -> Option<&str> {
        match self {
            ScriptInput::Location { location, .. } => Some(location),
            ScriptInput::Direct(_) => None,
        }
    }
}

impl std::fmt::Debug for ScriptInput<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScriptInput::Location { location, .. } => {
                f.debug_struct("Location").field("location", location).finish()
            }
            ScriptInput::Direct(source) => f.debug_tuple("Direct").field(&source.len()).finish(),
        }
    }
}

/// Execution context handed to the evaluator for one inline run.
///
/// Bindings are exposed here, never through the process environment.
/// Output goes to `output`; the dispatcher has already opened a fresh
/// capture frame on it.
#[derive(Debug, Clone, Copy)]
pub struct InlineScope<'a> {
    pub bindings: &'a Bindings,
    pub output: &'a OutputStack,
}

impl InlineScope<'_> {
    pub fn binding(&self, name: &str) -> Option<&str> {
        self.bindings.get(name).map(String::as_str)
    }

    /// Write text into the current capture frame.
    pub fn echo(&self, text: &str) {
        self.output.echo(text);
    }
}

/// A host runtime able to include scripts.
///
/// Side effects of evaluation (definitions, globals) are expected to persist
/// in the runtime after the call; that is what distinguishes inline mode.
/// Errors are returned untouched to the dispatcher's caller.
#[async_trait]
pub trait Evaluator: Send {
    /// The runtime's own failure type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Evaluate `input`, writing output through `scope`.
    async fn evaluate(
        &mut self,
        input: ScriptInput<'_>,
        scope: &InlineScope<'_>,
    ) -> Result<(), Self::Error>;
}
