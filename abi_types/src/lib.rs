//! ABI Type Definitions
//!
//! This crate contains the core type definitions for the decoder generator:
//! the type-definition model a front end produces, and the offset term
//! language plans are expressed in. It holds pure data structures without
//! any file I/O or code generation logic.

pub mod expr;
pub mod types;

// Re-export commonly used types at the crate root
pub use expr::*;
pub use types::*;
