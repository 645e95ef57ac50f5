//! Writes the published package tree: assets, manifests and `.npmignore`
use crate::assets::{copy_assets, default_assets, resolve_assets};
use crate::entry_point::{EntryPoint, Package};
use crate::error::{BuildError, BuildResult};
use crate::graph::BuildGraph;
use crate::paths::{self, relative_unix};
use crate::reporter::Reporter;
use crate::transform::{phase, Transform};
use async_trait::async_trait;
use libpack_package::exports::{export_path, subpath_for};
use libpack_package::{
    ConditionalExport, DependencyPolicy, ExportMap, ExportTarget, PackageJson, ShimChange,
    SideEffects, WatchVersionClock,
};
use std::path::Path;
use std::sync::Arc;
use tracing::instrument;

/// Manifest file name
pub const MANIFEST_FILE: &str = "package.json";

/// Contents of the generated `.npmignore`
pub const NPMIGNORE_CONTENT: &str =
    "# Nested package.json's are only needed for development.\n**/package.json\n";

/// Script that blocks publishing output compiled in full mode
pub const PUBLISH_GUARD_SCRIPT: &str = "node --eval \"console.error('ERROR: Trying to publish a package that has been compiled in full compilation mode. This is not allowed.\\nPlease delete and rebuild the package with partial compilation mode, before attempting to publish.\\n')\" && exit 1";

/// Copies assets and writes one manifest per entry point
pub struct WritePackageTransform {
    watch: bool,
    clock: Arc<WatchVersionClock>,
}

impl WritePackageTransform {
    pub fn new(watch: bool, clock: Arc<WatchVersionClock>) -> Self {
        Self { watch, clock }
    }

    async fn write_primary(
        &self,
        graph: &mut BuildGraph,
        entry_point: &EntryPoint,
        package: &Package,
        reporter: &dyn Reporter,
    ) -> BuildResult<()> {
        let url = entry_point.url();

        phase(reporter, "Copying assets", async {
            let mut patterns = package.assets.clone();
            patterns.extend(default_assets(package, &graph.entry_points()));

            let entries = resolve_assets(&patterns, &package.src, &package.dest).await?;
            let copied = copy_assets(graph, &url, &entries, &package.dest).await?;
            reporter.debug(&format!("Copied {} asset(s)", copied.len()));
            Ok(())
        })
        .await?;

        phase(reporter, "Writing package manifest", async {
            if !self.watch {
                let path = package.dest.join(".npmignore");
                write_file(&path, NPMIGNORE_CONTENT).await?;
            }

            let targets = export_targets(graph.entry_points().as_slice(), package);
            self.write_manifest(entry_point, package, &targets, reporter)
                .await?;
            Ok(())
        })
        .await
    }

    async fn write_secondary(
        &self,
        entry_point: &EntryPoint,
        package: &Package,
        graph: &BuildGraph,
        reporter: &dyn Reporter,
    ) -> BuildResult<()> {
        phase(reporter, "Writing package manifest", async {
            if self.watch {
                if let Some(primary) = graph.get(&package.primary_url).and_then(|n| n.entry_point()) {
                    self.bump_version(&primary.destination.directory, reporter)
                        .await?;
                }
            }

            let module = relative_unix(&entry_point.destination.directory, &entry_point.destination.fesm);
            let stub = serde_json::json!({ "module": module });
            let content = serde_json::to_string_pretty(&stub)
                .map_err(|e| BuildError::Package(e.into()))?;
            write_file(&entry_point.destination.directory.join(MANIFEST_FILE), &content).await
        })
        .await
    }

    /// Give an already written manifest a fresh watch version
    async fn bump_version(&self, directory: &Path, reporter: &dyn Reporter) -> BuildResult<()> {
        let path = directory.join(MANIFEST_FILE);
        if tokio::fs::metadata(&path).await.is_err() {
            reporter.debug(&format!("No manifest to refresh at {}", path.display()));
            return Ok(());
        }

        let mut manifest = read_manifest(&path).await?;
        manifest.version = Some(self.clock.next());
        write_file(&path, &manifest.to_string_pretty()?).await
    }

    /// Assemble and write the full manifest of an entry point
    pub async fn write_manifest(
        &self,
        entry_point: &EntryPoint,
        package: &Package,
        targets: &[ExportTarget],
        reporter: &dyn Reporter,
    ) -> BuildResult<PackageJson> {
        let destination = &entry_point.destination;
        let mut manifest = entry_point.manifest.clone();

        manifest.module = Some(relative_unix(&destination.directory, &destination.fesm));
        manifest.typings = Some(relative_unix(&destination.directory, &destination.declarations));
        if entry_point.is_primary() {
            let (exports, conflicts) = ExportMap::generate(manifest.exports.as_ref(), targets);
            for conflict in conflicts {
                reporter.warn(&conflict.to_string());
            }
            manifest.exports = Some(exports);
        }
        manifest.side_effects = Some(manifest.side_effects.take().unwrap_or_default());

        if self.watch {
            manifest.version = Some(self.clock.next());
        }

        let shim = package.compat_shim.as_str();
        let toolchain_version = toolchain_shim_version(package, reporter).await;
        match manifest.ensure_compat_shim(shim, toolchain_version.as_deref()) {
            ShimChange::MovedFromPeer { .. } => reporter.warn(&format!(
                "'{}' is no longer recommended to be used as a 'peerDependencies'. Moving it to 'dependencies'.",
                shim
            )),
            ShimChange::Injected { version } => {
                reporter.debug(&format!("Adding '{}@{}' to 'dependencies'", shim, version))
            }
            ShimChange::AlreadyDeclared | ShimChange::Unavailable => {}
        }

        let policy = DependencyPolicy::new(shim, &package.allowed_non_peer_dependencies);
        for skipped in policy.skipped_patterns() {
            reporter.warn(&format!(
                "Ignoring allowed dependency pattern '{}': {}",
                skipped.pattern, skipped.reason
            ));
        }
        if let Err(violation) = policy.check(&manifest) {
            rollback_destination(&destination.directory, package, reporter).await;
            return Err(violation.into());
        }

        if manifest.scripts.is_some() {
            if package.keep_lifecycle_scripts {
                reporter.warn("You enabled keep-lifecycle-scripts explicitly. The scripts section in package.json will be published to npm.");
            } else {
                reporter.info("Removing scripts section in package.json as it's considered a potential security vulnerability.");
                manifest.remove_scripts();
            }
        }

        if !entry_point.compilation_mode.is_redistributable() {
            manifest.set_script("prepublishOnly", PUBLISH_GUARD_SCRIPT);
        }

        for field in manifest.strip_tooling_fields() {
            reporter.info(&format!("Removing {} section in package.json.", field));
        }

        manifest.name = Some(entry_point.module_id.clone());

        let content = manifest.to_string_pretty()?;
        write_file(&destination.directory.join(MANIFEST_FILE), &content).await?;
        Ok(manifest)
    }
}

#[async_trait]
impl Transform for WritePackageTransform {
    fn name(&self) -> &str {
        "write-package"
    }

    #[instrument(skip_all, fields(watch = self.watch))]
    async fn apply(&self, graph: &mut BuildGraph, reporter: &dyn Reporter) -> BuildResult<()> {
        let entry_point = graph
            .entry_point_in_progress()?
            .entry_point()
            .cloned()
            .ok_or(BuildError::NoEntryPointInProgress)?;
        let package = graph
            .package()
            .cloned()
            .ok_or_else(|| BuildError::node_not_found("package"))?;

        if entry_point.is_primary() {
            self.write_primary(graph, &entry_point, &package, reporter)
                .await
        } else {
            self.write_secondary(&entry_point, &package, graph, reporter)
                .await
        }
    }
}

/// Export targets for every entry point, relative to the package root
pub fn export_targets(entry_points: &[&EntryPoint], package: &Package) -> Vec<ExportTarget> {
    entry_points
        .iter()
        .map(|entry_point| {
            let destination = &entry_point.destination;
            ExportTarget::new(
                subpath_for(&relative_unix(&package.dest, &destination.directory)),
                ConditionalExport::new(
                    export_path(&relative_unix(&package.dest, &destination.declarations)),
                    export_path(&relative_unix(&package.dest, &destination.fesm)),
                ),
            )
        })
        .collect()
}

/// Remove an entry point's output directory after a dependency policy failure
///
/// Only directories inside the package destination that hold no sources are
/// removed.
pub async fn rollback_destination(directory: &Path, package: &Package, reporter: &dyn Reporter) {
    if !paths::is_within(&package.dest, directory) || paths::is_within(directory, &package.src) {
        reporter.warn(&format!(
            "Not removing {}: it is not a build output directory",
            directory.display()
        ));
        return;
    }

    match tokio::fs::remove_dir_all(directory).await {
        Ok(()) => reporter.debug(&format!("Removed {}", directory.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => reporter.warn(&format!(
            "Could not remove {}: {}",
            directory.display(),
            e
        )),
    }
}

/// Shim version pinned by the toolchain manifest, if any
async fn toolchain_shim_version(package: &Package, reporter: &dyn Reporter) -> Option<String> {
    let path = package.toolchain_manifest.as_ref()?;
    match read_manifest(path).await {
        Ok(manifest) => manifest
            .declared_version(&package.compat_shim)
            .map(str::to_string),
        Err(e) => {
            reporter.debug(&format!("Toolchain manifest unavailable: {}", e));
            None
        }
    }
}

async fn read_manifest(path: &Path) -> BuildResult<PackageJson> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| BuildError::io(path, e))?;
    PackageJson::from_str(&content).map_err(|e| BuildError::manifest_parse(path, e))
}

async fn write_file(path: &Path, content: &str) -> BuildResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| BuildError::io(parent, e))?;
    }
    tokio::fs::write(path, content)
        .await
        .map_err(|e| BuildError::io(path, e))
}
