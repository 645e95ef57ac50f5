//! Package manifest parsing and types (package.json)
//!
//! Fields the packager reads or writes are named; everything else is carried
//! through untouched in [`PackageJson::extra`], in declaration order.

use crate::exports::ExportMap;
use crate::{PackageError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

/// Dependency table (`name -> version range`), declaration order preserved
pub type DependencyMap = Map<String, Value>;

/// Internal build-config field that never reaches the published manifest
pub const EMBEDDED_CONFIG_FIELD: &str = "libpack";

/// Tooling sections removed from the published manifest
pub const TOOLING_FIELDS: &[&str] = &[
    "stylelint",
    "prettier",
    "eslintConfig",
    "jest",
    "workspaces",
    "husky",
    "devDependencies",
];

/// Package manifest (package.json)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageJson {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub typings: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exports: Option<ExportMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub side_effects: Option<SideEffects>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<DependencyMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer_dependencies: Option<DependencyMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scripts: Option<Map<String, Value>>,
    /// Every other field, as declared
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `sideEffects` declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SideEffects {
    Flag(bool),
    Files(Vec<String>),
}

impl Default for SideEffects {
    fn default() -> Self {
        Self::Flag(false)
    }
}

/// Outcome of ensuring the compatibility shim is a regular dependency
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShimChange {
    /// Already a regular dependency; nothing changed
    AlreadyDeclared,
    /// Added to `dependencies` with the toolchain's version
    Injected { version: String },
    /// Moved from `peerDependencies` to `dependencies`
    MovedFromPeer { version: Value },
    /// Not declared and the toolchain declares no version for it
    Unavailable,
}

impl PackageJson {
    /// Parse manifest from a JSON string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Load manifest from file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|error| PackageError::ReadError {
            path: path.to_path_buf(),
            error,
        })?;
        Self::from_str(&content)
    }

    /// Serialize as pretty-printed JSON with two-space indentation
    pub fn to_string_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Whether `name` is a regular dependency
    pub fn has_dependency(&self, name: &str) -> bool {
        self.dependencies
            .as_ref()
            .is_some_and(|deps| deps.contains_key(name))
    }

    /// Whether `name` is a peer dependency
    pub fn has_peer_dependency(&self, name: &str) -> bool {
        self.peer_dependencies
            .as_ref()
            .is_some_and(|deps| deps.contains_key(name))
    }

    /// Version range declared for `name` in `dependencies` or `peerDependencies`
    ///
    /// Peer declarations win, mirroring how toolchain manifests pin their
    /// runtime requirements.
    pub fn declared_version(&self, name: &str) -> Option<&str> {
        self.peer_dependencies
            .as_ref()
            .and_then(|deps| deps.get(name))
            .or_else(|| self.dependencies.as_ref().and_then(|deps| deps.get(name)))
            .and_then(Value::as_str)
    }

    /// Make sure the runtime compatibility shim is a regular dependency
    pub fn ensure_compat_shim(&mut self, shim: &str, toolchain_version: Option<&str>) -> ShimChange {
        if self.has_dependency(shim) {
            return ShimChange::AlreadyDeclared;
        }

        let peer = self
            .peer_dependencies
            .as_mut()
            .and_then(|peers| peers.shift_remove(shim));

        if let Some(version) = peer {
            self.dependencies
                .get_or_insert_with(Map::new)
                .insert(shim.to_string(), version.clone());
            return ShimChange::MovedFromPeer { version };
        }

        match toolchain_version {
            Some(version) => {
                self.dependencies
                    .get_or_insert_with(Map::new)
                    .insert(shim.to_string(), Value::String(version.to_string()));
                ShimChange::Injected {
                    version: version.to_string(),
                }
            }
            None => ShimChange::Unavailable,
        }
    }

    /// Remove the `scripts` section; returns whether one was present
    pub fn remove_scripts(&mut self) -> bool {
        self.scripts.take().is_some()
    }

    /// Set (or replace) a script
    pub fn set_script(&mut self, name: &str, command: &str) {
        self.scripts
            .get_or_insert_with(Map::new)
            .insert(name.to_string(), Value::String(command.to_string()));
    }

    /// Get a script command
    pub fn script(&self, name: &str) -> Option<&str> {
        self.scripts
            .as_ref()
            .and_then(|scripts| scripts.get(name))
            .and_then(Value::as_str)
    }

    /// Remove the internal build-config field and tooling sections
    ///
    /// Returns the names of the fields that were present and removed.
    pub fn strip_tooling_fields(&mut self) -> Vec<&'static str> {
        std::iter::once(EMBEDDED_CONFIG_FIELD)
            .chain(TOOLING_FIELDS.iter().copied())
            .filter(|field| self.extra.shift_remove(*field).is_some())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_parse_minimal_manifest() {
        let manifest = PackageJson::from_str(r#"{ "name": "my-lib", "version": "1.0.0" }"#).unwrap();
        assert_eq!(manifest.name.as_deref(), Some("my-lib"));
        assert_eq!(manifest.version.as_deref(), Some("1.0.0"));
        assert!(manifest.extra.is_empty());
    }

    #[test]
    fn test_unknown_fields_preserved_in_order() {
        let manifest = PackageJson::from_str(
            r#"{ "name": "x", "license": "MIT", "keywords": ["a"], "author": "me" }"#,
        )
        .unwrap();
        let keys: Vec<_> = manifest.extra.keys().cloned().collect();
        assert_eq!(keys, vec!["license", "keywords", "author"]);
    }

    #[test]
    fn test_side_effects_forms() {
        let manifest = PackageJson::from_str(r#"{ "sideEffects": ["*.css"] }"#).unwrap();
        assert_eq!(
            manifest.side_effects,
            Some(SideEffects::Files(vec!["*.css".to_string()]))
        );
        let manifest = PackageJson::from_str(r#"{ "sideEffects": true }"#).unwrap();
        assert_eq!(manifest.side_effects, Some(SideEffects::Flag(true)));
    }

    #[test]
    fn test_inject_shim_from_toolchain() {
        let mut manifest = PackageJson::default();
        let change = manifest.ensure_compat_shim("tslib", Some("^2.3.0"));

        assert_eq!(change, ShimChange::Injected { version: "^2.3.0".to_string() });
        assert_eq!(manifest.dependencies.unwrap()["tslib"], json!("^2.3.0"));
    }

    #[test]
    fn test_move_shim_from_peer_dependencies() {
        let mut manifest =
            PackageJson::from_str(r#"{ "peerDependencies": { "tslib": "^2.0.0", "rxjs": "^7" } }"#)
                .unwrap();
        let change = manifest.ensure_compat_shim("tslib", Some("^2.3.0"));

        assert_eq!(change, ShimChange::MovedFromPeer { version: json!("^2.0.0") });
        assert!(manifest.has_dependency("tslib"));
        assert!(!manifest.has_peer_dependency("tslib"));
        assert!(manifest.has_peer_dependency("rxjs"));
    }

    #[test]
    fn test_shim_already_declared() {
        let mut manifest = PackageJson::from_str(r#"{ "dependencies": { "tslib": "^2.1.0" } }"#).unwrap();
        assert_eq!(
            manifest.ensure_compat_shim("tslib", Some("^2.3.0")),
            ShimChange::AlreadyDeclared
        );
        assert_eq!(manifest.dependencies.unwrap()["tslib"], json!("^2.1.0"));
    }

    #[test]
    fn test_shim_unavailable() {
        let mut manifest = PackageJson::default();
        assert_eq!(manifest.ensure_compat_shim("tslib", None), ShimChange::Unavailable);
        assert!(manifest.dependencies.is_none());
    }

    #[test]
    fn test_declared_version_prefers_peer() {
        let manifest = PackageJson::from_str(
            r#"{ "dependencies": { "tslib": "^2.0.0" }, "peerDependencies": { "tslib": "^2.3.0" } }"#,
        )
        .unwrap();
        assert_eq!(manifest.declared_version("tslib"), Some("^2.3.0"));
        assert_eq!(manifest.declared_version("rxjs"), None);
    }

    #[test]
    fn test_strip_tooling_fields() {
        let mut manifest = PackageJson::from_str(
            r#"{ "name": "x", "libpack": {}, "prettier": {}, "devDependencies": {}, "license": "MIT" }"#,
        )
        .unwrap();
        let removed = manifest.strip_tooling_fields();

        assert_eq!(removed, vec!["libpack", "prettier", "devDependencies"]);
        assert_eq!(manifest.extra.keys().collect::<Vec<_>>(), vec!["license"]);
    }

    #[test]
    fn test_scripts_helpers() {
        let mut manifest = PackageJson::default();
        assert!(!manifest.remove_scripts());
        manifest.set_script("prepublishOnly", "exit 1");
        assert_eq!(manifest.script("prepublishOnly"), Some("exit 1"));
        assert!(manifest.remove_scripts());
        assert!(manifest.scripts.is_none());
    }
}
