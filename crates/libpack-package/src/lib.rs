//! libpack Package Manifests
//!
//! Data model for the distributable `package.json`: the manifest schema,
//! conditional export maps, the non-peer dependency policy and watch-mode
//! pseudo-versions. Nothing in this crate touches the output tree; the build
//! crate decides what gets written.

pub mod exports;
pub mod manifest;
pub mod validator;
pub mod version;

pub use exports::{ConditionalExport, ExportConflict, ExportMap, ExportTarget};
pub use manifest::{DependencyMap, PackageJson, ShimChange, SideEffects};
pub use validator::{DependencyPolicy, InvalidPattern, ValidationError};
pub use version::{parse_watch_stamp, watch_version, WatchVersionClock};

/// Package management errors
#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    #[error("Failed to parse manifest: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Failed to read manifest {path}: {error}")]
    ReadError {
        path: std::path::PathBuf,
        error: std::io::Error,
    },

    #[error("Validation error: {0}")]
    ValidationError(#[from] ValidationError),

    #[error("Invalid field value: {field} - {reason}")]
    InvalidField { field: String, reason: String },
}

pub type Result<T> = std::result::Result<T, PackageError>;
