//! Cadre SDK
//!
//! Shared library providing error types and value types for Cadre components.
//! This crate is used by the engine and by anything that consumes its output.

/// Error types and handling
pub mod errors;

/// Classification and recommendation types
pub mod types;

// Re-export commonly used types
pub use errors::{CadreErrorExt, EngineError};
pub use types::{Complexity, Recommendation, TaskType, WorkflowStep};
