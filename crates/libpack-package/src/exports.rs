//! Conditional export maps (`package.json#exports`)
//!
//! Generated conditions are merged first-write-wins: a condition that is
//! already present under a subpath, whether declared by the user or inserted
//! for an earlier entry point, is kept and reported as an [`ExportConflict`].

use crate::PackageError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Subpath of the primary entry point
pub const ROOT_SUBPATH: &str = ".";

/// Self-reference subpath exposing the manifest itself
pub const MANIFEST_SUBPATH: &str = "./package.json";

/// Resolution conditions generated for one subpath
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConditionalExport {
    pub types: Option<String>,
    pub default: Option<String>,
}

impl ConditionalExport {
    /// Export with both the declaration and runtime module conditions
    pub fn new(types: impl Into<String>, default: impl Into<String>) -> Self {
        Self {
            types: Some(types.into()),
            default: Some(default.into()),
        }
    }

    /// Export with only the `default` condition
    pub fn default_only(default: impl Into<String>) -> Self {
        Self {
            types: None,
            default: Some(default.into()),
        }
    }

    /// Conditions in insertion order (`types` must precede `default`)
    pub fn conditions(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [("types", self.types.as_deref()), ("default", self.default.as_deref())]
            .into_iter()
            .filter_map(|(name, value)| value.map(|v| (name, v)))
    }
}

/// A generated export for one entry point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportTarget {
    pub subpath: String,
    pub mapping: ConditionalExport,
}

impl ExportTarget {
    pub fn new(subpath: impl Into<String>, mapping: ConditionalExport) -> Self {
        Self {
            subpath: subpath.into(),
            mapping,
        }
    }
}

/// A generated condition that was not applied because one was already set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportConflict {
    pub subpath: String,
    pub condition: String,
}

impl fmt::Display for ExportConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Found a conflicting export condition for \"{}\". The \"{}\" condition is already set and was not overridden. Please unset it.",
            self.subpath, self.condition
        )
    }
}

/// Ordered map from subpath to its condition set
///
/// Every value is a JSON object; the string shorthand
/// (`"./x": "./x.mjs"`) is normalized to `{ "default": "./x.mjs" }` on load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Map<String, Value>")]
pub struct ExportMap {
    entries: Map<String, Value>,
}

impl ExportMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Conditions declared for a subpath
    pub fn get(&self, subpath: &str) -> Option<&Map<String, Value>> {
        self.entries.get(subpath).and_then(Value::as_object)
    }

    /// A single condition value for a subpath
    pub fn condition(&self, subpath: &str, condition: &str) -> Option<&Value> {
        self.get(subpath).and_then(|conditions| conditions.get(condition))
    }

    /// Subpaths in insertion order
    pub fn subpaths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert generated conditions under `subpath` without overwriting
    ///
    /// Existing subpaths and conditions keep their position; new ones are
    /// appended. Returns the conditions that were skipped.
    pub fn insert_mapping(
        &mut self,
        subpath: &str,
        mapping: &ConditionalExport,
    ) -> Vec<ExportConflict> {
        let mut conflicts = Vec::new();
        let slot = self
            .entries
            .entry(subpath.to_string())
            .or_insert_with(|| Value::Object(Map::new()));

        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }

        if let Value::Object(conditions) = slot {
            for (condition, value) in mapping.conditions() {
                if conditions.contains_key(condition) {
                    conflicts.push(ExportConflict {
                        subpath: subpath.to_string(),
                        condition: condition.to_string(),
                    });
                } else {
                    conditions.insert(condition.to_string(), Value::String(value.to_string()));
                }
            }
        }

        conflicts
    }

    /// Build the export table for a package
    ///
    /// Starts from a copy of the declared exports, asserts the
    /// `./package.json` self-reference, then inserts one mapping per entry
    /// point in the given order.
    pub fn generate(
        declared: Option<&ExportMap>,
        targets: &[ExportTarget],
    ) -> (ExportMap, Vec<ExportConflict>) {
        let mut exports = declared.cloned().unwrap_or_default();
        let mut conflicts = exports.insert_mapping(
            MANIFEST_SUBPATH,
            &ConditionalExport::default_only("./package.json"),
        );

        for target in targets {
            conflicts.extend(exports.insert_mapping(&target.subpath, &target.mapping));
        }

        (exports, conflicts)
    }
}

/// Export subpath for an entry point directory relative to the package root
///
/// An empty relative directory (or ".") is the primary entry point.
pub fn subpath_for(relative_dir: &str) -> String {
    let trimmed = relative_dir.trim_start_matches("./").trim_end_matches('/');
    if trimmed.is_empty() || trimmed == "." {
        ROOT_SUBPATH.to_string()
    } else {
        format!("./{}", trimmed)
    }
}

/// Prefix a relative forward-slash path so it is a valid export target
pub fn export_path(relative: &str) -> String {
    if relative.starts_with("./") || relative.starts_with("../") {
        relative.to_string()
    } else {
        format!("./{}", relative)
    }
}

impl TryFrom<Value> for ExportMap {
    type Error = PackageError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let raw = match value {
            Value::Object(map) => map,
            Value::String(target) => {
                let mut map = Map::new();
                map.insert(ROOT_SUBPATH.to_string(), Value::String(target));
                map
            }
            other => {
                return Err(PackageError::InvalidField {
                    field: "exports".to_string(),
                    reason: format!("expected an object or a string, got {}", other),
                })
            }
        };

        let mut entries = Map::new();
        for (subpath, conditions) in raw {
            let normalized = match conditions {
                Value::Object(map) => Value::Object(map),
                Value::String(target) => {
                    let mut map = Map::new();
                    map.insert("default".to_string(), Value::String(target));
                    Value::Object(map)
                }
                other => {
                    return Err(PackageError::InvalidField {
                        field: format!("exports[\"{}\"]", subpath),
                        reason: format!("expected a condition object or a string, got {}", other),
                    })
                }
            };
            entries.insert(subpath, normalized);
        }

        Ok(Self { entries })
    }
}

impl From<ExportMap> for Map<String, Value> {
    fn from(exports: ExportMap) -> Self {
        exports.entries
    }
}
