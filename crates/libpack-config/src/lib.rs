//! libpack Configuration System
//!
//! Provides the packaging configuration for libpack projects:
//! - Project configuration (libpack.toml)
//! - Embedded configuration (the `libpack` field of package.json)
//! - Environment variable overrides (LIBPACK_*)
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Project config (./libpack.toml, or the `libpack` field of ./package.json)
//! 2. Environment variables (LIBPACK_*)
//!
//! # Example
//!
//! ```no_run
//! use libpack_config::ConfigLoader;
//! use std::path::Path;
//!
//! let loader = ConfigLoader::new();
//! let config = loader.load_from_directory(Path::new(".")).unwrap();
//! ```

pub mod loader;
pub mod project;

use std::path::PathBuf;
use thiserror::Error;

/// File name of the standalone project configuration
pub const CONFIG_FILE_NAME: &str = "libpack.toml";

/// package.json field holding embedded configuration
pub const EMBEDDED_CONFIG_FIELD: &str = "libpack";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid TOML syntax in {file}: {error}")]
    TomlParseError {
        file: PathBuf,
        error: toml::de::Error,
    },

    #[error("Invalid JSON in {file}: {error}")]
    JsonParseError {
        file: PathBuf,
        error: serde_json::Error,
    },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Invalid path: {0}")]
    InvalidPath(PathBuf),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

// Re-export main types
pub use loader::{Config, ConfigLoader, ConfigSource};
pub use project::{
    AssetEntryConfig, AssetPattern, CompilationMode, EntryPointConfig, ProjectConfig,
};
