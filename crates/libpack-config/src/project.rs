//! Project Configuration (libpack.toml)
//!
//! Describes how a library is packaged: where the output lands, which assets
//! are copied, which non-peer dependencies are tolerated, and which secondary
//! entry points exist next to the primary one.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

/// Default destination directory, relative to the project root
pub const DEFAULT_DEST: &str = "dist";

/// Default runtime compatibility shim injected into `dependencies`
pub const DEFAULT_COMPAT_SHIM: &str = "tslib";

/// Project configuration from libpack.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Packaging options
    #[serde(default)]
    pub package: PackageSection,

    /// Compiler options relevant to packaging
    #[serde(default)]
    pub compiler: CompilerSection,

    /// Compiler toolchain metadata
    #[serde(default)]
    pub toolchain: ToolchainSection,

    /// Secondary entry points
    #[serde(default, rename = "entry-point", skip_serializing_if = "Vec::is_empty")]
    pub entry_points: Vec<EntryPointConfig>,
}

/// `[package]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct PackageSection {
    /// Output directory (default: "dist")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dest: Option<PathBuf>,

    /// Declared assets, either bare paths/globs or structured entries
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assets: Vec<AssetPattern>,

    /// Regular expressions naming dependencies allowed outside `peerDependencies`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_non_peer_dependencies: Vec<String>,

    /// Publish the `scripts` section instead of stripping it
    #[serde(default)]
    pub keep_lifecycle_scripts: bool,
}

/// A declared asset
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum AssetPattern {
    /// A file, a directory, or a glob relative to the source root
    Path(String),

    /// A structured glob entry
    Entry(AssetEntryConfig),
}

impl From<&str> for AssetPattern {
    fn from(value: &str) -> Self {
        Self::Path(value.to_string())
    }
}

/// Structured asset declaration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct AssetEntryConfig {
    /// Glob evaluated relative to `input`
    pub glob: String,

    /// Input directory, relative to the source root
    pub input: String,

    /// Output directory, relative to the destination root
    pub output: String,

    /// Additional globs to exclude
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignore: Vec<String>,

    /// Follow symbolic links while matching
    #[serde(default)]
    pub follow_symlinks: bool,
}

/// `[compiler]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct CompilerSection {
    /// Compilation mode used by upstream compilation
    #[serde(default)]
    pub compilation_mode: CompilationMode,
}

/// Compilation mode
///
/// `Full` output is self-contained but must not be published; `Partial`
/// output is redistributable and recompiled by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CompilationMode {
    #[default]
    Full,
    Partial,
}

impl CompilationMode {
    /// Whether the compiled output may be published to a registry
    pub fn is_redistributable(&self) -> bool {
        matches!(self, Self::Partial)
    }
}

impl fmt::Display for CompilationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Partial => write!(f, "partial"),
        }
    }
}

impl FromStr for CompilationMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "partial" => Ok(Self::Partial),
            other => Err(ConfigError::InvalidValue {
                field: "compiler.compilation-mode".to_string(),
                reason: format!("expected 'full' or 'partial', got '{}'", other),
            }),
        }
    }
}

/// `[toolchain]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct ToolchainSection {
    /// Path to the compiler toolchain's own package.json
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest: Option<PathBuf>,

    /// Name of the runtime compatibility shim (default: "tslib")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compat_shim: Option<String>,
}

impl ToolchainSection {
    /// Effective compatibility shim name
    pub fn compat_shim(&self) -> &str {
        self.compat_shim.as_deref().unwrap_or(DEFAULT_COMPAT_SHIM)
    }
}

/// `[[entry-point]]` table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct EntryPointConfig {
    /// Directory of the entry point, relative to the source root
    pub path: PathBuf,

    /// Flat module file name without extension
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flat_module_file: Option<String>,
}

impl ProjectConfig {
    /// Load project configuration from a TOML file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
            file: path.to_path_buf(),
            error: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Parse the embedded configuration from a package.json `libpack` field
    ///
    /// Returns `Ok(None)` when the manifest has no such field.
    pub fn load_from_package_json(path: &Path) -> ConfigResult<Option<Self>> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        let mut manifest: serde_json::Value =
            serde_json::from_str(&content).map_err(|e| ConfigError::JsonParseError {
                file: path.to_path_buf(),
                error: e,
            })?;

        let Some(embedded) = manifest
            .as_object_mut()
            .and_then(|fields| fields.remove(crate::EMBEDDED_CONFIG_FIELD))
        else {
            return Ok(None);
        };

        let config: Self =
            serde_json::from_value(embedded).map_err(|e| ConfigError::JsonParseError {
                file: path.to_path_buf(),
                error: e,
            })?;

        config.validate()?;
        Ok(Some(config))
    }

    /// Validate the project configuration
    pub fn validate(&self) -> ConfigResult<()> {
        for asset in &self.package.assets {
            validate_asset(asset)?;
        }

        for pattern in &self.package.allowed_non_peer_dependencies {
            if pattern.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "package.allowed-non-peer-dependencies".to_string(),
                    reason: "pattern cannot be empty".to_string(),
                });
            }
        }

        if let Some(shim) = &self.toolchain.compat_shim {
            if shim.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "toolchain.compat-shim".to_string(),
                    reason: "name cannot be empty".to_string(),
                });
            }
        }

        if let Some(dest) = &self.package.dest {
            if names_project_root_or_parent(dest) {
                return Err(ConfigError::InvalidValue {
                    field: "package.dest".to_string(),
                    reason: format!(
                        "'{}' would place the output over the project sources",
                        dest.display()
                    ),
                });
            }
        }

        let mut seen = HashSet::new();
        for entry in &self.entry_points {
            if entry.path.as_os_str().is_empty() || entry.path == Path::new(".") {
                return Err(ConfigError::InvalidValue {
                    field: "entry-point.path".to_string(),
                    reason: "secondary entry point path cannot be the source root".to_string(),
                });
            }
            if entry.path.is_absolute() {
                return Err(ConfigError::InvalidPath(entry.path.clone()));
            }
            if entry
                .path
                .components()
                .any(|c| matches!(c, Component::ParentDir))
            {
                return Err(ConfigError::InvalidValue {
                    field: "entry-point.path".to_string(),
                    reason: format!(
                        "'{}' must stay inside the source root",
                        entry.path.display()
                    ),
                });
            }
            if !seen.insert(entry.path.clone()) {
                return Err(ConfigError::InvalidValue {
                    field: "entry-point.path".to_string(),
                    reason: format!("duplicate entry point '{}'", entry.path.display()),
                });
            }
        }

        Ok(())
    }

    /// Destination directory, relative to the project root unless absolute
    pub fn dest(&self) -> &Path {
        self.package
            .dest
            .as_deref()
            .unwrap_or_else(|| Path::new(DEFAULT_DEST))
    }

    /// Compilation mode
    pub fn compilation_mode(&self) -> CompilationMode {
        self.compiler.compilation_mode
    }
}

/// Whether `dest` resolves to the project root or one of its ancestors
///
/// Absolute paths other than the filesystem root are left to the builder,
/// which knows where the project lives.
fn names_project_root_or_parent(dest: &Path) -> bool {
    let mut depth = 0usize;
    for component in dest.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::ParentDir => depth = depth.saturating_sub(1),
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }
    depth == 0
}

fn validate_asset(asset: &AssetPattern) -> ConfigResult<()> {
    match asset {
        AssetPattern::Path(path) if path.trim().is_empty() => Err(ConfigError::InvalidValue {
            field: "package.assets".to_string(),
            reason: "asset path cannot be empty".to_string(),
        }),
        AssetPattern::Entry(entry) if entry.glob.trim().is_empty() => {
            Err(ConfigError::InvalidValue {
                field: "package.assets.glob".to_string(),
                reason: format!("empty glob for input '{}'", entry.input),
            })
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty_config_uses_defaults() {
        let config: ProjectConfig = toml::from_str("").unwrap();
        assert_eq!(config.dest(), Path::new("dist"));
        assert_eq!(config.compilation_mode(), CompilationMode::Full);
        assert_eq!(config.toolchain.compat_shim(), "tslib");
        assert!(!config.package.keep_lifecycle_scripts);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[package]
dest = "out"
assets = ["CHANGELOG.md", { glob = "**/*.css", input = "styles", output = "css", ignore = ["*.tmp"], follow-symlinks = true }]
allowed-non-peer-dependencies = ["^rxjs$"]
keep-lifecycle-scripts = true

[compiler]
compilation-mode = "partial"

[toolchain]
manifest = "node_modules/@angular/compiler/package.json"

[[entry-point]]
path = "testing"
flat-module-file = "lib-testing"
"#;

        let config: ProjectConfig = toml::from_str(toml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.dest(), Path::new("out"));
        assert_eq!(config.compilation_mode(), CompilationMode::Partial);
        assert_eq!(config.package.assets.len(), 2);
        assert_eq!(config.package.assets[0], AssetPattern::from("CHANGELOG.md"));
        match &config.package.assets[1] {
            AssetPattern::Entry(entry) => {
                assert_eq!(entry.glob, "**/*.css");
                assert_eq!(entry.output, "css");
                assert!(entry.follow_symlinks);
            }
            other => panic!("expected structured asset, got {:?}", other),
        }
        assert_eq!(config.entry_points[0].flat_module_file.as_deref(), Some("lib-testing"));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result: Result<ProjectConfig, _> = toml::from_str("[package]\noutput = \"x\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_compilation_mode_from_str() {
        assert_eq!("partial".parse::<CompilationMode>().unwrap(), CompilationMode::Partial);
        assert_eq!(" FULL ".parse::<CompilationMode>().unwrap(), CompilationMode::Full);
        assert!("ivy".parse::<CompilationMode>().is_err());
        assert!(CompilationMode::Partial.is_redistributable());
        assert!(!CompilationMode::Full.is_redistributable());
    }

    #[test]
    fn test_duplicate_entry_points_rejected() {
        let config = ProjectConfig {
            entry_points: vec![
                EntryPointConfig {
                    path: PathBuf::from("testing"),
                    flat_module_file: None,
                },
                EntryPointConfig {
                    path: PathBuf::from("testing"),
                    flat_module_file: None,
                },
            ],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[rstest::rstest]
    #[case(".", false)]
    #[case("", false)]
    #[case("..", false)]
    #[case("out/../..", false)]
    #[case("/", false)]
    #[case("dist", true)]
    #[case("build/dist", true)]
    #[case("../lib-dist", true)]
    fn test_dest_must_not_cover_the_project(#[case] dest: &str, #[case] valid: bool) {
        let mut config = ProjectConfig::default();
        config.package.dest = Some(PathBuf::from(dest));
        assert_eq!(config.validate().is_ok(), valid, "dest = {:?}", dest);
    }

    #[test]
    fn test_entry_point_cannot_leave_source_root() {
        let config = ProjectConfig {
            entry_points: vec![EntryPointConfig {
                path: PathBuf::from("testing/../../outside"),
                flat_module_file: None,
            }],
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_empty_asset_rejected() {
        let mut config = ProjectConfig::default();
        config.package.assets.push(AssetPattern::from("  "));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
