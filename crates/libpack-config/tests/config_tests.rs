//! Configuration loading and precedence tests

use libpack_config::{
    AssetPattern, CompilationMode, ConfigError, ConfigLoader, ConfigSource, ProjectConfig,
};
use pretty_assertions::assert_eq;
use rstest::rstest;
use serial_test::serial;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn create_config_file(dir: &Path, content: &str) -> PathBuf {
    let config_path = dir.join("libpack.toml");
    fs::write(&config_path, content).unwrap();
    config_path
}

// ============================================================================
// Config Loading Tests
// ============================================================================

#[test]
fn test_load_when_no_config_exists() {
    let temp_dir = TempDir::new().unwrap();

    let config = ConfigLoader::new()
        .without_env()
        .load_from_directory(temp_dir.path())
        .unwrap();

    assert!(!config.is_project());
    assert_eq!(config.source, ConfigSource::Default);
    assert_eq!(config.dest_dir(), None);
}

#[test]
fn test_load_from_nested_subdirectory_finds_parent() {
    let temp_dir = TempDir::new().unwrap();
    create_config_file(temp_dir.path(), "[package]\ndest = \"out\"\n");

    let nested = temp_dir.path().join("sub1").join("sub2");
    fs::create_dir_all(&nested).unwrap();

    let config = ConfigLoader::new()
        .without_env()
        .load_from_directory(&nested)
        .unwrap();

    assert_eq!(config.project_root(), Some(temp_dir.path()));
    assert_eq!(config.dest_dir(), Some(temp_dir.path().join("out")));
}

#[test]
fn test_toml_takes_precedence_over_embedded_config() {
    let temp_dir = TempDir::new().unwrap();
    create_config_file(temp_dir.path(), "[package]\ndest = \"from-toml\"\n");
    fs::write(
        temp_dir.path().join("package.json"),
        r#"{ "libpack": { "package": { "dest": "from-json" } } }"#,
    )
    .unwrap();

    let config = ConfigLoader::new()
        .without_env()
        .load_from_directory(temp_dir.path())
        .unwrap();

    assert_eq!(config.project.dest(), Path::new("from-toml"));
}

#[test]
fn test_load_from_specific_file() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = create_config_file(
        temp_dir.path(),
        r#"
[package]
assets = ["README.md"]
allowed-non-peer-dependencies = ["^lodash"]
"#,
    );

    let config = ConfigLoader::new()
        .without_env()
        .load_from_file(&config_path)
        .unwrap();

    assert_eq!(config.project.package.assets, vec![AssetPattern::from("README.md")]);
    assert_eq!(
        config.project.package.allowed_non_peer_dependencies,
        vec!["^lodash".to_string()]
    );
}

#[test]
fn test_embedded_config_uses_same_schema() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join("package.json"),
        r#"{
  "name": "@scope/lib",
  "libpack": {
    "package": {
      "assets": [{ "glob": "*.md", "input": ".", "output": "." }],
      "keep-lifecycle-scripts": true
    },
    "compiler": { "compilation-mode": "partial" },
    "entry-point": [{ "path": "testing" }]
  }
}"#,
    )
    .unwrap();

    let config = ConfigLoader::new()
        .without_env()
        .load_from_directory(temp_dir.path())
        .unwrap();

    assert!(config.project.package.keep_lifecycle_scripts);
    assert_eq!(config.project.compilation_mode(), CompilationMode::Partial);
    assert_eq!(config.project.entry_points[0].path, PathBuf::from("testing"));
}

// ============================================================================
// Invalid Config Tests
// ============================================================================

#[test]
fn test_invalid_toml_syntax() {
    let temp_dir = TempDir::new().unwrap();
    create_config_file(temp_dir.path(), "[package\ndest = \"broken\n");

    let result = ConfigLoader::new()
        .without_env()
        .load_from_directory(temp_dir.path());

    assert!(matches!(result, Err(ConfigError::TomlParseError { .. })));
}

#[test]
fn test_invalid_embedded_json() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("package.json"), "{ not json").unwrap();

    let result = ConfigLoader::new()
        .without_env()
        .load_from_directory(temp_dir.path());

    assert!(matches!(result, Err(ConfigError::JsonParseError { .. })));
}

#[rstest]
#[case("[package]\nunknown = 1\n")]
#[case("[compiler]\ncompilation-mode = \"ivy\"\n")]
#[case("[[entry-point]]\npath = \"\"\n")]
#[case("[[entry-point]]\npath = \"/abs\"\n")]
#[case("[toolchain]\ncompat-shim = \" \"\n")]
#[case("[package]\nassets = [{ glob = \"\", input = \".\", output = \".\" }]\n")]
fn test_rejected_configs(#[case] content: &str) {
    let temp_dir = TempDir::new().unwrap();
    let path = create_config_file(temp_dir.path(), content);

    assert!(ProjectConfig::load_from_file(&path).is_err());
}

#[test]
fn test_missing_file_reports_not_found() {
    let temp_dir = TempDir::new().unwrap();
    let result = ProjectConfig::load_from_file(&temp_dir.path().join("libpack.toml"));

    assert!(matches!(result, Err(ConfigError::NotFound(_))));
}

// ============================================================================
// Precedence Tests
// ============================================================================

#[test]
#[serial]
fn test_env_override_dest() {
    let temp_dir = TempDir::new().unwrap();
    create_config_file(temp_dir.path(), "[package]\ndest = \"dist\"\n");

    temp_env::with_var("LIBPACK_DEST", Some("elsewhere"), || {
        let config = ConfigLoader::new()
            .load_from_directory(temp_dir.path())
            .unwrap();
        assert_eq!(config.project.dest(), Path::new("elsewhere"));
    });
}

#[test]
#[serial]
fn test_env_override_dest_cannot_be_project_root() {
    let temp_dir = TempDir::new().unwrap();
    create_config_file(temp_dir.path(), "");

    for dest in [".", "..", "/"] {
        temp_env::with_var("LIBPACK_DEST", Some(dest), || {
            let result = ConfigLoader::new().load_from_directory(temp_dir.path());
            assert!(
                matches!(result, Err(ConfigError::InvalidValue { ref field, .. }) if field == "package.dest"),
                "LIBPACK_DEST={} was accepted",
                dest
            );
        });
    }
}

#[test]
fn test_dest_at_project_root_rejected_from_file() {
    let temp_dir = TempDir::new().unwrap();
    create_config_file(temp_dir.path(), "[package]\ndest = \".\"\n");

    let result = ConfigLoader::new()
        .without_env()
        .load_from_directory(temp_dir.path());

    assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
}

#[test]
#[serial]
fn test_env_override_keep_lifecycle_scripts() {
    let temp_dir = TempDir::new().unwrap();
    create_config_file(temp_dir.path(), "");

    for (value, expected) in [("true", true), ("1", true), ("YES", true), ("false", false), ("0", false)] {
        temp_env::with_var("LIBPACK_KEEP_LIFECYCLE_SCRIPTS", Some(value), || {
            let config = ConfigLoader::new()
                .load_from_directory(temp_dir.path())
                .unwrap();
            assert_eq!(
                config.project.package.keep_lifecycle_scripts, expected,
                "LIBPACK_KEEP_LIFECYCLE_SCRIPTS={}",
                value
            );
        });
    }
}

#[test]
#[serial]
fn test_without_env_ignores_overrides() {
    let temp_dir = TempDir::new().unwrap();
    create_config_file(temp_dir.path(), "");

    temp_env::with_var("LIBPACK_COMPILATION_MODE", Some("partial"), || {
        let config = ConfigLoader::new()
            .without_env()
            .load_from_directory(temp_dir.path())
            .unwrap();
        assert_eq!(config.project.compilation_mode(), CompilationMode::Full);
    });
}
