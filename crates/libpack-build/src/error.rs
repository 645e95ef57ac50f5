/// Build system error types
use libpack_config::ConfigError;
use libpack_package::{PackageError, ValidationError};
use std::path::PathBuf;
use thiserror::Error;

pub type BuildResult<T> = Result<T, BuildError>;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Cannot read assets from a location outside of the project root: {input}")]
    AssetInputOutsideRoot { input: PathBuf },

    #[error("Cannot write assets to a location outside of the output path: {output}")]
    AssetOutputOutsideRoot { output: PathBuf },

    #[error(transparent)]
    DependencyNotAllowed(#[from] ValidationError),

    #[error("Invalid asset glob '{glob}': {reason}")]
    InvalidGlob { glob: String, reason: String },

    #[error("Node not found in build graph: {url}")]
    NodeNotFound { url: String },

    #[error("No entry point is in progress")]
    NoEntryPointInProgress,

    #[error("Entry point '{requested}' cannot start while '{active}' is in progress")]
    EntryPointAlreadyInProgress { requested: String, active: String },

    #[error("Failed to read manifest at {path}: {error}")]
    ManifestParse { path: PathBuf, error: String },

    #[error("I/O error at {path}: {error}")]
    IoError {
        path: PathBuf,
        error: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Package error: {0}")]
    Package(#[from] PackageError),

    #[error("Worker pool error: {0}")]
    Pool(#[from] crate::worker_pool::PoolError),
}

impl BuildError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        Self::IoError {
            path: path.into(),
            error,
        }
    }

    /// Create a manifest read error
    pub fn manifest_parse(path: impl Into<PathBuf>, error: impl ToString) -> Self {
        Self::ManifestParse {
            path: path.into(),
            error: error.to_string(),
        }
    }

    /// Create a node lookup error
    pub fn node_not_found(url: impl Into<String>) -> Self {
        Self::NodeNotFound { url: url.into() }
    }

    /// Whether the error is the dependency policy failure that rolled back output
    pub fn is_dependency_violation(&self) -> bool {
        matches!(self, Self::DependencyNotAllowed(_))
    }
}
