//! libpack build infrastructure
//!
//! Turns already compiled library output into a publishable package tree:
//! - Build graph of entry points, the package and copied assets
//! - Transform pipeline with injected progress reporting
//! - Asset resolution with root containment checks
//! - Manifest assembly and export map generation per entry point
//! - Worker pool configuration for upstream compiler transforms

pub mod assets;
pub mod builder;
pub mod entry_point;
pub mod error;
pub mod graph;
pub mod paths;
pub mod reporter;
pub mod transform;
pub mod worker_pool;
pub mod write_package;

// Re-export main types
pub use assets::{AssetEntry, CopiedAsset};
pub use builder::{BuildOptions, BuildSummary, Builder, EntryPointFailure};
pub use entry_point::{DestinationFiles, EntryPoint, Package};
pub use error::{BuildError, BuildResult};
pub use graph::{BuildGraph, Node, NodeData, NodeState};
pub use reporter::{MemoryReporter, ReportEvent, Reporter, TracingReporter};
pub use transform::{Pipeline, Transform};
pub use worker_pool::{
    HostCapabilities, PoolError, PoolStats, SyncMode, TaskHandle, WorkerContext, WorkerPool,
    WorkerPoolOptions,
};
pub use write_package::WritePackageTransform;

// Re-export package types for convenience
pub use libpack_package::PackageJson;
