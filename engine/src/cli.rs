//! CLI interface for Cadre
//!
//! This module provides the command-line interface using clap's derive API.

use clap::{Parser, Subcommand};
use sdk::types::Complexity;
use std::path::PathBuf;

/// Cadre role recommender
///
/// Recommends specialist roles for a task and assembles the bounded,
/// sanitized project context handed to a role.
#[derive(Parser, Debug)]
#[command(name = "cadre")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Recommend roles for a task
    Recommend {
        /// Free-text task description
        task: String,

        /// Maximum number of roles (default from config)
        #[arg(long, value_parser = clap::value_parser!(u16).range(1..=32))]
        max_agents: Option<u16>,

        /// Do not suggest a recipe
        #[arg(long)]
        no_recipes: bool,

        /// Role to leave out (repeatable)
        #[arg(long = "exclude", value_name = "ROLE")]
        exclude: Vec<String>,

        /// Override the detected complexity (simple, medium, complex)
        #[arg(long)]
        complexity: Option<Complexity>,
    },

    /// Assemble the context for a role
    Context {
        /// Role name
        role: String,

        /// Task description to include
        #[arg(long)]
        task: Option<String>,

        /// File or directory to load
        #[arg(long)]
        path: Option<PathBuf>,

        /// Template variable as KEY=VALUE (repeatable; VALUE may be JSON)
        #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_var)]
        vars: Vec<(String, String)>,
    },

    /// Recommend roles and assemble context for the lead role
    Run {
        /// Free-text task description
        task: String,

        /// File or directory to load
        #[arg(long)]
        path: Option<PathBuf>,
    },

    /// List loaded role definitions and built-in capability profiles
    Roles,

    /// List built-in recipes
    Recipes,

    /// Inspect or clear the context cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

/// Context cache actions
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Show cache counters
    Stats,

    /// Remove cached entries
    Clear {
        /// Only entries whose resolved path starts with this prefix
        prefix: Option<String>,
    },
}

fn parse_var(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}
