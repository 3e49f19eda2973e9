//! Cadre Engine Library
//!
//! Role recommendation and secure context assembly.
//! It is used by both the `cadre` binary and integration tests.

/// Configuration management module
pub mod config;

/// File system security module
pub mod fs_guard;

/// Bounded concurrent file loading
pub mod loader;

/// Two-tier context cache
pub mod cache;

/// Content escaping and injection detection
pub mod sanitizer;

/// Role-definition documents
pub mod definitions;

/// Task classification and role selection
pub mod selection;

/// Conductor orchestration module
pub mod conductor;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
