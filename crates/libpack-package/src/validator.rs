//! Non-peer dependency policy
//!
//! Regular `dependencies` of a library end up installed once per consumer,
//! so every one of them has to be explicitly allowed.

use crate::manifest::PackageJson;
use regex::Regex;

/// Validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A dependency is not matched by any allowed pattern
    DependencyNotAllowed { dependency: String },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::DependencyNotAllowed { dependency } => write!(
                f,
                "Dependency {} must be explicitly allowed using the \"allowed-non-peer-dependencies\" option.",
                dependency
            ),
        }
    }
}

impl std::error::Error for ValidationError {}

/// An allow-list entry that is not a valid regular expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidPattern {
    pub pattern: String,
    pub reason: String,
}

/// Allow-list of dependencies permitted outside `peerDependencies`
#[derive(Debug, Clone)]
pub struct DependencyPolicy {
    allowed: Vec<Regex>,
    skipped: Vec<InvalidPattern>,
}

impl DependencyPolicy {
    /// Build the policy; the compatibility shim is always allowed
    ///
    /// Patterns that fail to compile are skipped and reported through
    /// [`DependencyPolicy::skipped_patterns`].
    pub fn new<I, S>(compat_shim: &str, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut allowed = Vec::new();
        let mut skipped = Vec::new();

        if let Ok(shim) = Regex::new(&format!("^{}$", regex::escape(compat_shim))) {
            allowed.push(shim);
        }

        for pattern in patterns {
            let pattern = pattern.as_ref();
            match Regex::new(pattern) {
                Ok(regex) => allowed.push(regex),
                Err(e) => skipped.push(InvalidPattern {
                    pattern: pattern.to_string(),
                    reason: e.to_string(),
                }),
            }
        }

        Self { allowed, skipped }
    }

    /// Patterns dropped because they are not valid regular expressions
    pub fn skipped_patterns(&self) -> &[InvalidPattern] {
        &self.skipped
    }

    /// Whether a dependency name matches any allowed pattern
    pub fn is_allowed(&self, dependency: &str) -> bool {
        self.allowed.iter().any(|regex| regex.is_match(dependency))
    }

    /// Check `dependencies`, failing on the first one that is not allowed
    pub fn check(&self, manifest: &PackageJson) -> Result<(), ValidationError> {
        let Some(dependencies) = &manifest.dependencies else {
            return Ok(());
        };

        match dependencies.keys().find(|name| !self.is_allowed(name)) {
            Some(name) => Err(ValidationError::DependencyNotAllowed {
                dependency: name.clone(),
            }),
            None => Ok(()),
        }
    }
}
