//! Build orchestration: seeds the graph and drives every entry point
use crate::entry_point::{
    entry_point_url, flat_module_file, package_url, DestinationFiles, EntryPoint, Package,
};
use crate::error::{BuildError, BuildResult};
use crate::graph::{is_entry_point, BuildGraph, Node, NodeData};
use crate::paths;
use crate::reporter::Reporter;
use crate::transform::Pipeline;
use crate::write_package::{WritePackageTransform, MANIFEST_FILE};
use libpack_config::{Config, ConfigError, ConfigLoader, EntryPointConfig};
use libpack_package::{PackageJson, WatchVersionClock};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Build options not stored in configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildOptions {
    /// Rebuilds are driven by a watcher; manifests get watch versions
    pub watch: bool,
}

/// An entry point that failed to build
#[derive(Debug)]
pub struct EntryPointFailure {
    pub module_id: String,
    pub error: BuildError,
}

/// Result of a build run
#[derive(Debug)]
pub struct BuildSummary {
    /// Module ids of entry points that were built
    pub built: Vec<String>,
    pub failures: Vec<EntryPointFailure>,
    pub total_time: Duration,
    /// Graph as left by the run
    pub graph: BuildGraph,
}

impl BuildSummary {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Main builder for packaging a library
pub struct Builder {
    root_dir: PathBuf,
    config: Config,
    options: BuildOptions,
    clock: Arc<WatchVersionClock>,
}

impl Builder {
    /// Create a builder for the project at the given path
    pub fn new(project_path: impl AsRef<Path>) -> BuildResult<Self> {
        let start = project_path.as_ref();
        let config = ConfigLoader::new().load_from_directory(start)?;
        Ok(Self::with_config(start, config))
    }

    /// Create a builder from an already loaded configuration
    pub fn with_config(project_path: impl AsRef<Path>, config: Config) -> Self {
        let root_dir = config
            .project_root()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| project_path.as_ref().to_path_buf());

        Self {
            root_dir,
            config,
            options: BuildOptions::default(),
            clock: Arc::new(WatchVersionClock::new()),
        }
    }

    pub fn with_options(mut self, options: BuildOptions) -> Self {
        self.options = options;
        self
    }

    /// Share a watch clock across builders so versions keep increasing
    pub fn with_clock(mut self, clock: Arc<WatchVersionClock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn dest_dir(&self) -> PathBuf {
        let dest = self
            .config
            .dest_dir()
            .unwrap_or_else(|| self.root_dir.join(self.config.project.dest()));
        paths::normalize(&dest)
    }

    /// Create a fresh graph with the package and every entry point, primary first
    pub fn seed_graph(&self) -> BuildResult<BuildGraph> {
        let project = &self.config.project;
        let src = self.root_dir.clone();
        let dest = self.dest_dir();
        if paths::is_within(&dest, &src) {
            return Err(ConfigError::InvalidValue {
                field: "package.dest".to_string(),
                reason: format!(
                    "{} contains the project root {}",
                    dest.display(),
                    src.display()
                ),
            }
            .into());
        }

        let primary_manifest = read_manifest(&src.join(MANIFEST_FILE))?;
        let name = primary_manifest.name.clone().ok_or_else(|| {
            BuildError::manifest_parse(src.join(MANIFEST_FILE), "missing required field `name`")
        })?;

        let mut entry_points = vec![EntryPoint {
            module_id: name.clone(),
            base_path: src.clone(),
            destination: DestinationFiles::for_entry_point(&dest, None, &flat_module_file(&name)),
            manifest: primary_manifest,
            compilation_mode: project.compilation_mode(),
            is_secondary: false,
        }];
        for secondary in &project.entry_points {
            entry_points.push(self.secondary_entry_point(&name, secondary, &src, &dest)?);
        }

        let package = Package {
            src: src.clone(),
            dest,
            assets: project.package.assets.clone(),
            allowed_non_peer_dependencies: project.package.allowed_non_peer_dependencies.clone(),
            keep_lifecycle_scripts: project.package.keep_lifecycle_scripts,
            primary_url: entry_point_url(&name),
            compat_shim: project.toolchain.compat_shim().to_string(),
            toolchain_manifest: project.toolchain.manifest.as_ref().map(|p| src.join(p)),
        };

        let mut graph = BuildGraph::new();
        let pkg_url = package_url(&name);
        graph.put(Node::new(pkg_url.clone(), NodeData::Package(Box::new(package))));
        for entry_point in entry_points {
            let url = entry_point.url();
            graph.put(Node::new(url.clone(), NodeData::EntryPoint(Box::new(entry_point))));
            graph.add_dependency(&pkg_url, &url)?;
        }

        Ok(graph)
    }

    fn secondary_entry_point(
        &self,
        primary_name: &str,
        config: &EntryPointConfig,
        src: &Path,
        dest: &Path,
    ) -> BuildResult<EntryPoint> {
        let base_path = src.join(&config.path);
        let escapes = |root: &Path| {
            let joined = paths::normalize(&root.join(&config.path));
            joined == paths::normalize(root) || !paths::is_within(root, &joined)
        };
        if escapes(src) || escapes(dest) {
            return Err(ConfigError::InvalidPath(config.path.clone()).into());
        }
        let manifest_path = base_path.join(MANIFEST_FILE);
        let manifest = if manifest_path.is_file() {
            read_manifest(&manifest_path)?
        } else {
            PackageJson::default()
        };

        let module_id = format!("{}/{}", primary_name, paths::to_unix(&config.path));
        let flat = config
            .flat_module_file
            .clone()
            .unwrap_or_else(|| flat_module_file(&module_id));

        Ok(EntryPoint {
            destination: DestinationFiles::for_entry_point(dest, Some(&config.path), &flat),
            module_id,
            base_path,
            manifest,
            compilation_mode: self.config.project.compilation_mode(),
            is_secondary: true,
        })
    }

    /// Build every entry point
    ///
    /// A failing entry point is recorded and the remaining ones still run.
    pub async fn build(&self, reporter: &dyn Reporter) -> BuildResult<BuildSummary> {
        let mut graph = self.seed_graph()?;
        let (built, failures, total_time) = self.build_graph(&mut graph, reporter).await?;
        Ok(BuildSummary {
            built,
            failures,
            total_time,
            graph,
        })
    }

    async fn build_graph(
        &self,
        graph: &mut BuildGraph,
        reporter: &dyn Reporter,
    ) -> BuildResult<(Vec<String>, Vec<EntryPointFailure>, Duration)> {
        let start = Instant::now();
        let pipeline = Pipeline::new().with(WritePackageTransform::new(
            self.options.watch,
            Arc::clone(&self.clock),
        ));

        let targets: Vec<(String, String)> = graph
            .filter(is_entry_point)
            .into_iter()
            .filter_map(|node| {
                node.entry_point()
                    .map(|ep| (node.url().to_string(), ep.module_id.clone()))
            })
            .collect();

        let mut built = Vec::new();
        let mut failures = Vec::new();

        for (url, module_id) in targets {
            reporter.info(&format!("Building entry point '{}'", module_id));
            graph.begin(&url)?;

            match pipeline.run(graph, reporter).await {
                Ok(()) => {
                    graph.finish(&url)?;
                    built.push(module_id);
                }
                Err(error) => {
                    graph.abandon(&url)?;
                    tracing::error!(entry_point = %module_id, %error, "entry point failed");
                    failures.push(EntryPointFailure { module_id, error });
                }
            }
        }

        Ok((built, failures, start.elapsed()))
    }
}

fn read_manifest(path: &Path) -> BuildResult<PackageJson> {
    PackageJson::from_file(path).map_err(|e| BuildError::manifest_parse(path, e))
}
