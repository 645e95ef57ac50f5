//! Configuration Loader
//!
//! Handles locating and loading configuration with proper precedence.

use crate::project::{CompilationMode, ProjectConfig};
use crate::{ConfigResult, CONFIG_FILE_NAME};
use std::env;
use std::path::{Path, PathBuf};

/// Where a loaded configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// A standalone libpack.toml
    Toml(PathBuf),
    /// The `libpack` field of a package.json
    PackageJson(PathBuf),
    /// Nothing found, built-in defaults
    Default,
}

/// Configuration loader
///
/// Loads configuration with the following precedence:
/// 1. Project config (libpack.toml found by walking up, else the `libpack`
///    field of package.json in the start directory) - lowest priority
/// 2. Environment variables (LIBPACK_*) - overrides project
pub struct ConfigLoader {
    /// Apply LIBPACK_* overrides
    use_env: bool,
}

/// Loaded configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Project configuration
    pub project: ProjectConfig,

    /// Project root directory (where the configuration was found)
    pub project_root: Option<PathBuf>,

    /// Origin of the configuration
    pub source: ConfigSource,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self { use_env: true }
    }

    /// Disable environment variable overrides
    pub fn without_env(mut self) -> Self {
        self.use_env = false;
        self
    }

    /// Load configuration starting from the given directory
    ///
    /// Walks up the directory tree to find libpack.toml. When none exists,
    /// falls back to the embedded `libpack` field of `start_dir/package.json`.
    pub fn load_from_directory(&self, start_dir: &Path) -> ConfigResult<Config> {
        let (project_root, source, project) = match self.find_project_config(start_dir)? {
            Some((root, path, config)) => (Some(root), ConfigSource::Toml(path), config),
            None => {
                let manifest_path = start_dir.join("package.json");
                if !manifest_path.exists() {
                    (None, ConfigSource::Default, ProjectConfig::default())
                } else if let Some(config) =
                    ProjectConfig::load_from_package_json(&manifest_path)?
                {
                    (
                        Some(start_dir.to_path_buf()),
                        ConfigSource::PackageJson(manifest_path),
                        config,
                    )
                } else {
                    (
                        Some(start_dir.to_path_buf()),
                        ConfigSource::Default,
                        ProjectConfig::default(),
                    )
                }
            }
        };

        let project = self.apply_env_overrides(project)?;

        Ok(Config {
            project,
            project_root,
            source,
        })
    }

    /// Load configuration from a specific libpack.toml
    pub fn load_from_file(&self, config_path: &Path) -> ConfigResult<Config> {
        let project = ProjectConfig::load_from_file(config_path)?;
        let project = self.apply_env_overrides(project)?;

        Ok(Config {
            project,
            project_root: config_path.parent().map(|p| p.to_path_buf()),
            source: ConfigSource::Toml(config_path.to_path_buf()),
        })
    }

    /// Find libpack.toml by walking up the directory tree
    fn find_project_config(
        &self,
        start_dir: &Path,
    ) -> ConfigResult<Option<(PathBuf, PathBuf, ProjectConfig)>> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(CONFIG_FILE_NAME);

            if config_path.exists() {
                let project_config = ProjectConfig::load_from_file(&config_path)?;
                return Ok(Some((current, config_path, project_config)));
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => return Ok(None),
            }
        }
    }

    /// Apply environment variable overrides to project config
    ///
    /// Recognized: LIBPACK_DEST, LIBPACK_COMPILATION_MODE,
    /// LIBPACK_KEEP_LIFECYCLE_SCRIPTS
    fn apply_env_overrides(&self, mut config: ProjectConfig) -> ConfigResult<ProjectConfig> {
        if !self.use_env {
            return Ok(config);
        }

        if let Ok(dest) = env::var("LIBPACK_DEST") {
            if !dest.is_empty() {
                config.package.dest = Some(PathBuf::from(dest));
            }
        }

        if let Ok(mode) = env::var("LIBPACK_COMPILATION_MODE") {
            config.compiler.compilation_mode = mode.parse::<CompilationMode>()?;
        }

        if let Ok(keep) = env::var("LIBPACK_KEEP_LIFECYCLE_SCRIPTS") {
            config.package.keep_lifecycle_scripts =
                matches!(keep.to_lowercase().as_str(), "true" | "1" | "yes");
        }

        config.validate()?;
        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Get the project root directory
    pub fn project_root(&self) -> Option<&Path> {
        self.project_root.as_deref()
    }

    /// Absolute destination directory, if a project root is known
    pub fn dest_dir(&self) -> Option<PathBuf> {
        self.project_root().map(|root| root.join(self.project.dest()))
    }

    /// Check if a project root was found
    pub fn is_project(&self) -> bool {
        self.project_root.is_some()
    }
}
