//! Configuration management
//!
//! This module handles loading, validation, and management of the Cadre configuration.
//! Configuration is stored in TOML format at ~/.cadre/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Log level, data directory, role-definition directory
//! - **security**: Allowed roots, extension allow-list, write deny-list, limits
//! - **loader**: File caps, depth, worker count, exclude patterns
//! - **cache**: Memory budget, TTL, optional disk tier
//! - **selection**: Role selection defaults and invocation timeout
//!
//! Every section has defaults, so a partial file (or an empty one) parses.
//!
//! # Path Expansion
//!
//! The configuration system automatically:
//! - Expands ~ to the user's home directory
//! - Canonicalizes allowed roots to resolve symlinks and .. patterns
//! - Drops allowed roots that do not exist (with a warning)
//!
//! # Examples
//!
//! ```no_run
//! use cadre_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//! println!("Allowed roots: {:?}", config.security.allowed_roots);
//! println!("Cache TTL: {} minutes", config.cache.ttl_minutes);
//! # Ok(())
//! # }
//! ```

use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Core settings
    #[serde(default)]
    pub core: CoreConfig,

    /// Filesystem boundary settings
    #[serde(default)]
    pub security: SecurityConfig,

    /// Concurrent file loader settings
    #[serde(default)]
    pub loader: LoaderConfig,

    /// Context cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Role selection settings
    #[serde(default)]
    pub selection: SelectionConfig,
}

/// Core configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Directory holding role-definition documents (supports ~ expansion)
    #[serde(default = "default_definitions_dir")]
    pub definitions_dir: PathBuf,
}

/// Filesystem boundary configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Directories within which every read and write must resolve
    #[serde(default = "default_allowed_roots")]
    pub allowed_roots: Vec<PathBuf>,

    /// File extensions (without the dot) that may be read
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,

    /// File names that may never be written
    #[serde(default = "default_denied_write_targets")]
    pub denied_write_targets: Vec<String>,

    /// Maximum number of components below an allowed root
    #[serde(default = "default_security_max_depth")]
    pub max_depth: usize,

    /// Maximum size of a single readable file
    #[serde(default = "default_max_file_size")]
    pub max_file_size_bytes: u64,
}

/// Concurrent file loader configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Maximum number of files loaded from one directory
    #[serde(default = "default_max_files")]
    pub max_files: usize,

    /// Maximum directory depth walked below the load root
    #[serde(default = "default_loader_max_depth")]
    pub max_depth: usize,

    /// Number of concurrent file reads
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Directory names and `*.ext` globs skipped during enumeration
    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,
}

/// Context cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Enable the context cache
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Memory tier budget in megabytes
    #[serde(default = "default_memory_budget_mb")]
    pub memory_budget_mb: u64,

    /// Time-to-live of an entry in minutes
    #[serde(default = "default_ttl_minutes")]
    pub ttl_minutes: u64,

    /// Enable the disk tier for large entries
    #[serde(default)]
    pub disk_enabled: bool,

    /// Entries larger than this go to the disk tier (when enabled)
    #[serde(default = "default_disk_threshold")]
    pub disk_threshold_bytes: u64,

    /// Disk tier size budget in megabytes
    #[serde(default = "default_disk_budget_mb")]
    pub disk_budget_mb: u64,

    /// Disk tier directory (supports ~ expansion)
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
}

/// Role selection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Default number of roles to recommend
    #[serde(default = "default_max_agents")]
    pub max_agents: usize,

    /// Roles must score strictly above this to be recommended
    #[serde(default = "default_min_score")]
    pub min_score: u32,

    /// Consider predefined recipes by default
    #[serde(default = "default_true")]
    pub include_recipes: bool,

    /// Shortest accepted task description (characters)
    #[serde(default = "default_min_task_length")]
    pub min_task_length: usize,

    /// Longest accepted task description (characters)
    #[serde(default = "default_max_task_length")]
    pub max_task_length: usize,

    /// Wall-clock bound for classification plus context assembly
    #[serde(default = "default_invocation_timeout")]
    pub invocation_timeout_secs: u64,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_definitions_dir() -> PathBuf {
    PathBuf::from("~/.cadre/agents")
}

fn default_allowed_roots() -> Vec<PathBuf> {
    vec![PathBuf::from(".")]
}

fn default_allowed_extensions() -> Vec<String> {
    [
        "rs", "toml", "md", "txt", "py", "js", "ts", "tsx", "jsx", "go", "java", "c", "h",
        "cpp", "hpp", "json", "yaml", "yml", "sql", "sh", "html", "css",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_denied_write_targets() -> Vec<String> {
    ["Cargo.lock", "package-lock.json", "yarn.lock", ".gitignore"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_security_max_depth() -> usize {
    12
}

fn default_max_file_size() -> u64 {
    1024 * 1024
}

fn default_max_files() -> usize {
    50
}

fn default_loader_max_depth() -> usize {
    8
}

fn default_concurrency() -> usize {
    3
}

fn default_exclude_patterns() -> Vec<String> {
    [
        ".git",
        "target",
        "node_modules",
        "__pycache__",
        ".venv",
        "dist",
        "build",
        "*.lock",
        "*.min.js",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_memory_budget_mb() -> u64 {
    64
}

fn default_ttl_minutes() -> u64 {
    120
}

fn default_disk_threshold() -> u64 {
    256 * 1024
}

fn default_disk_budget_mb() -> u64 {
    256
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("~/.cadre/cache")
}

fn default_max_agents() -> usize {
    4
}

fn default_min_score() -> u32 {
    25
}

fn default_min_task_length() -> usize {
    10
}

fn default_max_task_length() -> usize {
    500
}

fn default_invocation_timeout() -> u64 {
    30
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            definitions_dir: default_definitions_dir(),
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            allowed_roots: default_allowed_roots(),
            allowed_extensions: default_allowed_extensions(),
            denied_write_targets: default_denied_write_targets(),
            max_depth: default_security_max_depth(),
            max_file_size_bytes: default_max_file_size(),
        }
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_files: default_max_files(),
            max_depth: default_loader_max_depth(),
            concurrency: default_concurrency(),
            exclude_patterns: default_exclude_patterns(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            memory_budget_mb: default_memory_budget_mb(),
            ttl_minutes: default_ttl_minutes(),
            disk_enabled: false,
            disk_threshold_bytes: default_disk_threshold(),
            disk_budget_mb: default_disk_budget_mb(),
            cache_dir: default_cache_dir(),
        }
    }
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            max_agents: default_max_agents(),
            min_score: default_min_score(),
            include_recipes: true,
            min_task_length: default_min_task_length(),
            max_task_length: default_max_task_length(),
            invocation_timeout_secs: default_invocation_timeout(),
        }
    }
}

impl Config {
    /// Load configuration from the default location (~/.cadre/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self, EngineError> {
        let mut config: Config = toml::from_str(contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let defaults = Self::default();

        let toml_string = toml::to_string_pretty(&defaults)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        let mut config = defaults;
        config.validate_and_process()?;
        Ok(config)
    }

    /// Get the default configuration file path (~/.cadre/config.toml)
    fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".cadre").join("config.toml"))
    }

    /// Validate and process configuration
    ///
    /// This method:
    /// - Validates the log level and numeric ranges
    /// - Expands ~ in paths
    /// - Canonicalizes allowed roots, dropping the ones that do not exist
    ///
    /// # Errors
    ///
    /// Returns an error if a field is out of range or no allowed root survives.
    pub fn validate_and_process(&mut self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        if self.loader.concurrency == 0 {
            return Err(EngineError::Config(
                "loader.concurrency must be at least 1".to_string(),
            ));
        }
        if self.loader.max_files == 0 {
            return Err(EngineError::Config(
                "loader.max_files must be at least 1".to_string(),
            ));
        }
        if self.cache.ttl_minutes == 0 {
            return Err(EngineError::Config(
                "cache.ttl_minutes must be at least 1".to_string(),
            ));
        }
        if self.cache.disk_enabled && self.cache.disk_budget_mb == 0 {
            return Err(EngineError::Config(
                "cache.disk_budget_mb must be at least 1 when the disk tier is enabled"
                    .to_string(),
            ));
        }
        if self.selection.max_agents == 0 {
            return Err(EngineError::Config(
                "selection.max_agents must be at least 1".to_string(),
            ));
        }
        if self.selection.min_task_length > self.selection.max_task_length {
            return Err(EngineError::Config(
                "selection.min_task_length must not exceed max_task_length".to_string(),
            ));
        }

        // Extensions are compared without the leading dot, case-insensitively
        self.security.allowed_extensions = self
            .security
            .allowed_extensions
            .iter()
            .map(|e| e.trim_start_matches('.').to_lowercase())
            .collect();

        self.core.definitions_dir = expand_path(&self.core.definitions_dir)?;
        self.cache.cache_dir = expand_path(&self.cache.cache_dir)?;

        let mut roots = Vec::with_capacity(self.security.allowed_roots.len());
        for root in &self.security.allowed_roots {
            let expanded = expand_path(root)?;
            match expanded.canonicalize() {
                Ok(canonical) if canonical.is_dir() => roots.push(canonical),
                Ok(canonical) => warn!("Allowed root is not a directory: {:?}", canonical),
                Err(e) => warn!("Dropping allowed root {:?}: {}", expanded, e),
            }
        }
        if roots.is_empty() {
            return Err(EngineError::Config(
                "security.allowed_roots has no existing directory".to_string(),
            ));
        }
        self.security.allowed_roots = roots;

        Ok(())
    }
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_values() {
        let config = Config::default();

        assert_eq!(config.core.log_level, "info");
        assert_eq!(config.loader.concurrency, 3);
        assert_eq!(config.cache.ttl_minutes, 120);
        assert!(!config.cache.disk_enabled);
        assert_eq!(config.cache.disk_budget_mb, 256);
        assert_eq!(config.selection.min_task_length, 10);
        assert_eq!(config.selection.max_task_length, 500);
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let path = PathBuf::from("~/test");
        let expanded = expand_path(&path).unwrap();

        let home = dirs::home_dir().unwrap();
        assert_eq!(expanded, home.join("test"));
    }

    #[test]
    fn test_expand_path_without_tilde() {
        let path = PathBuf::from("/absolute/path");
        let expanded = expand_path(&path).unwrap();

        assert_eq!(expanded, path);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let toml = format!(
            "[security]\nallowed_roots = [{:?}]\nallowed_extensions = [\".RS\", \"md\"]\n\n[loader]\nmax_files = 7\n",
            temp.path()
        );

        let config = Config::from_toml_str(&toml).unwrap();
        assert_eq!(config.loader.max_files, 7);
        assert_eq!(config.loader.concurrency, 3);
        assert_eq!(config.security.allowed_extensions, vec!["rs", "md"]);
        assert_eq!(
            config.security.allowed_roots,
            vec![temp.path().canonicalize().unwrap()]
        );
    }

    #[test]
    fn test_missing_roots_are_rejected() {
        let toml = "[security]\nallowed_roots = [\"/definitely/not/here/cadre\"]\n";
        let err = Config::from_toml_str(toml).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn test_zero_disk_budget_is_rejected_when_disk_enabled() {
        let temp = TempDir::new().unwrap();
        let toml = format!(
            "[security]\nallowed_roots = [{:?}]\n\n[cache]\ndisk_enabled = true\ndisk_budget_mb = 0\n",
            temp.path()
        );
        let err = Config::from_toml_str(&toml).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn test_invalid_log_level() {
        let toml = "[core]\nlog_level = \"loud\"\n";
        assert!(Config::from_toml_str(toml).is_err());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_string = toml::to_string(&config).unwrap();

        let deserialized: Config = toml::from_str(&toml_string).unwrap();
        assert_eq!(config.core.log_level, deserialized.core.log_level);
        assert_eq!(config.loader.max_files, deserialized.loader.max_files);
        assert_eq!(
            config.cache.memory_budget_mb,
            deserialized.cache.memory_budget_mb
        );
    }
}
