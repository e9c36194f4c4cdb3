//! Pure data types for snipbox: diagnostics, execution modes, requests, results.
//!
//! This crate is a leaf dependency with no async runtime and no I/O.
//! It exists so that hosts can match on snipbox failures and build requests
//! without pulling in snipbox-kernel's process machinery.

pub mod diagnostic;
pub mod request;
pub mod result;

// Flat re-exports for convenience
pub use diagnostic::*;
pub use request::*;
pub use result::*;
