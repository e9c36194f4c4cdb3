//! snipbox-kernel: runs interpreter snippets three ways.
//!
//! This crate provides:
//!
//! - **Stager**: normalizes snippets and mints script tokens
//! - **Store**: process-wide `sandbox://` scripts and the source providers that load them
//! - **Capture**: the output stack inline evaluations write into
//! - **Classifier**: interpreter logs to typed diagnostics
//! - **Dispatcher**: inline, subprocess and background execution
//! - **Config / Paths**: TOML configuration and XDG locations

pub mod capture;
pub mod classifier;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod evaluator;
pub mod paths;
pub mod process;
pub mod stager;
pub mod staging;
pub mod store;
pub mod testing;

pub use capture::{CaptureFrame, OutputStack};
pub use classifier::{Classifier, DiagnosticPatterns, classify};
pub use config::{InlineStaging, InterpreterProfile, SandboxConfig, SubprocessStaging};
pub use dispatcher::Dispatcher;
pub use error::{InlineError, SandboxError, SandboxResult};
pub use evaluator::{Evaluator, InlineScope, ScriptInput};
pub use stager::{CodeStager, CodeUnit, unique_token};
pub use store::{FileSource, ScriptHandle, ScriptLease, SourceProvider, VirtualScriptStore, VirtualSource};

// Data types, so embedders need only one dependency.
pub use snipbox_types::{
    Bindings, Diagnostic, DiagnosticKind, ExecutionMode, ExecutionRequest, ExecutionResult,
};
