//! Scout SDK
//!
//! Shared library providing the error taxonomy and tool input/output types.
//! This crate is used by the engine and by external tool collaborators.

/// Error types and handling
pub mod errors;

/// Tool input/output types
pub mod types;

// Re-export commonly used types
pub use errors::{ErrorExt, ResearchError};
pub use types::{ParamValue, ToolError, ToolInput, ToolOutput};
