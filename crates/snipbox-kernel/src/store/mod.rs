//! Virtual script store and source providers.
//!
//! Inline executions never touch the disk: the normalized source is written
//! into a process-wide, in-memory store and loaded back through a
//! `sandbox://<token>` location.
//!
//! ```text
//!   dispatcher ──write──▶ VirtualScriptStore["<token>"] ◀──read── VirtualSource
//!        │                        ▲                                 ▲
//!        └── ScriptLease (drop) ──┘ remove            evaluator ────┘ load("sandbox://<token>")
//! ```
//!
//! Real files are served by [`FileSource`], so evaluators see one
//! [`SourceProvider`] capability regardless of where the script lives.

mod memory;
mod source;

pub use memory::{parse_uri, script_uri, ScriptHandle, ScriptLease, VirtualScriptStore, Whence, SCHEME};
pub use source::{FileSource, SourceProvider, VirtualSource};
