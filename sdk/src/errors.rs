//! Error types and handling
//!
//! This module provides the error types used throughout the Cadre engine.
//! All errors implement the `CadreErrorExt` trait which provides user-friendly
//! hints and indicates whether errors are recoverable.
//!
//! # Propagation
//!
//! Component-local failures (a single file, a single role document, a disk
//! cache write) are absorbed by the component and reported as warnings.
//! Only the variants below ever reach a caller:
//! - **Validation**: empty or malformed task text, unknown role names
//! - **Security**: a path explicitly requested by the caller was rejected
//! - **Startup**: no role definitions could be loaded at all
//! - **Runtime**: configuration, I/O and invocation timeouts

use std::path::PathBuf;
use thiserror::Error;

/// Trait for Cadre error extensions
///
/// This trait provides additional context for errors, including user-friendly
/// hints and recoverability information. All engine errors implement this trait.
pub trait CadreErrorExt {
    /// Returns a user-friendly hint for the error
    ///
    /// The hint is safe to display to end users and never echoes the raw
    /// task text, file contents or resolved paths.
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors can be retried with different input. Non-recoverable
    /// errors require fixing the installation (definitions, configuration).
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// # Examples
///
/// ```
/// use sdk::errors::{CadreErrorExt, EngineError};
///
/// let error = EngineError::UnknownRole("ghost".to_string());
/// println!("Hint: {}", error.user_hint());
/// assert!(error.is_recoverable());
///
/// let fatal = EngineError::NoDefinitionsLoaded("agents/".to_string());
/// assert!(!fatal.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Validation errors
    #[error("Invalid task description: {0}")]
    InvalidTask(String),

    #[error("Unknown role: {0}")]
    UnknownRole(String),

    // Definition loading errors
    #[error("Failed to parse role definition {path:?}: {reason}")]
    DefinitionParse { path: PathBuf, reason: String },

    #[error("No role definitions could be loaded from {0}")]
    NoDefinitionsLoaded(String),

    // File system security errors
    #[error("Path rejected {path:?}: {}", violations.join("; "))]
    PathRejected {
        path: PathBuf,
        violations: Vec<String>,
    },

    // Cache errors
    #[error("Cache I/O error: {0}")]
    CacheIo(String),

    // Runtime errors
    #[error("Invocation timed out after {0} seconds")]
    InvocationTimeout(u64),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CadreErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your config.toml file for errors",

            Self::InvalidTask(_) => "Describe the task in 10 to 500 characters",
            Self::UnknownRole(_) => "Run 'cadre roles' to list the available roles",

            Self::DefinitionParse { .. } => {
                "A role definition is malformed. Check its metadata header"
            }
            Self::NoDefinitionsLoaded(_) => {
                "No role definitions found. Check the definitions directory"
            }

            Self::PathRejected { .. } => "Access to this path is not allowed",

            Self::CacheIo(_) => "Context cache unavailable. Results will be recomputed",

            Self::InvocationTimeout(_) => "The operation took too long. Try a smaller context",

            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            // Non-recoverable errors
            Self::NoDefinitionsLoaded(_) | Self::Config(_) => false,

            // All other errors are potentially recoverable
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_rejected_lists_every_violation() {
        let err = EngineError::PathRejected {
            path: PathBuf::from("/tmp/x.exe"),
            violations: vec!["outside allowed roots".into(), "extension .exe".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("outside allowed roots"));
        assert!(msg.contains("extension .exe"));
    }

    #[test]
    fn test_recoverability() {
        assert!(EngineError::InvalidTask("short".into()).is_recoverable());
        assert!(EngineError::CacheIo("disk full".into()).is_recoverable());
        assert!(!EngineError::NoDefinitionsLoaded("agents".into()).is_recoverable());
        assert!(!EngineError::Config("bad".into()).is_recoverable());
    }

    #[test]
    fn test_hint_does_not_echo_input() {
        let err = EngineError::UnknownRole("secret-role-name".into());
        assert!(!err.user_hint().contains("secret-role-name"));
    }
}
