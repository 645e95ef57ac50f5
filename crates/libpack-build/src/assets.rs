//! Asset resolution and copying
//!
//! Declared patterns are resolved against the source and destination roots
//! and checked for containment before a single file is copied.
use crate::entry_point::{EntryPoint, Package};
use crate::error::{BuildError, BuildResult};
use crate::graph::{BuildGraph, Node};
use crate::paths;
use globset::{Glob, GlobBuilder, GlobSet, GlobSetBuilder};
use libpack_config::{AssetEntryConfig, AssetPattern};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Filesystem noise that is never copied
pub const FORCE_IGNORE: &[&str] = &["**/.gitkeep", "**/.DS_Store", "**/Thumbs.db"];

/// Glob matching every file below a directory
pub const RECURSIVE_GLOB: &str = "**/*";

/// A resolved asset declaration with absolute roots
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetEntry {
    pub glob: String,
    /// Absolute directory the glob is matched in
    pub input: PathBuf,
    /// Absolute directory matched files are copied to
    pub output: PathBuf,
    pub ignore: Vec<String>,
    pub follow_symlinks: bool,
}

/// A file copied by [`copy_assets`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopiedAsset {
    pub source: PathBuf,
    pub destination: PathBuf,
}

/// Asset declarations every package gets: the license and one README per entry point
pub fn default_assets(package: &Package, entry_points: &[&EntryPoint]) -> Vec<AssetPattern> {
    let mut assets = vec![AssetPattern::from("LICENSE")];
    for entry_point in entry_points {
        let input = pathdiff::diff_paths(&entry_point.base_path, &package.src)
            .unwrap_or_default();
        let output = pathdiff::diff_paths(&entry_point.destination.directory, &package.dest)
            .unwrap_or_default();
        assets.push(AssetPattern::Entry(AssetEntryConfig {
            glob: "README.md".to_string(),
            input: dir_or_root(&input),
            output: dir_or_root(&output),
            ignore: Vec::new(),
            follow_symlinks: false,
        }));
    }
    assets
}

fn dir_or_root(relative: &Path) -> String {
    let unix = paths::to_unix(relative);
    if unix.is_empty() {
        ".".to_string()
    } else {
        unix
    }
}

/// Resolve asset declarations into absolute, contained entries
///
/// A bare path naming a directory copies it recursively; one naming a file
/// copies that file; anything else is used as a glob rooted at `src`. Fails
/// on the first entry that escapes `src` or `dest`.
pub async fn resolve_assets(
    patterns: &[AssetPattern],
    src: &Path,
    dest: &Path,
) -> BuildResult<Vec<AssetEntry>> {
    let mut entries = Vec::with_capacity(patterns.len());

    for pattern in patterns {
        let config = match pattern {
            AssetPattern::Entry(config) => config.clone(),
            AssetPattern::Path(path) => resolve_bare_path(path, src).await,
        };

        let input = paths::join_under(src, &config.input);
        if !paths::is_within(src, &input) {
            return Err(BuildError::AssetInputOutsideRoot { input });
        }

        let output = paths::join_under(dest, &config.output);
        if !paths::is_within(dest, &output) {
            return Err(BuildError::AssetOutputOutsideRoot { output });
        }

        entries.push(AssetEntry {
            glob: config.glob,
            input,
            output,
            ignore: config.ignore,
            follow_symlinks: config.follow_symlinks,
        });
    }

    Ok(entries)
}

async fn resolve_bare_path(path: &str, src: &Path) -> AssetEntryConfig {
    let probe = paths::join_under(src, path);

    let (glob, input, output) = match tokio::fs::metadata(&probe).await {
        Ok(metadata) if metadata.is_dir() => {
            (RECURSIVE_GLOB.to_string(), path.to_string(), path.to_string())
        }
        Ok(metadata) if metadata.is_file() => {
            let relative = Path::new(path);
            let name = relative
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.to_string());
            let parent = relative
                .parent()
                .map(paths::to_unix)
                .unwrap_or_default();
            (name, parent.clone(), parent)
        }
        _ => (path.to_string(), "/".to_string(), "/".to_string()),
    };

    AssetEntryConfig {
        glob,
        input,
        output,
        ignore: Vec::new(),
        follow_symlinks: false,
    }
}

fn compile_glob(glob: &str) -> BuildResult<Glob> {
    GlobBuilder::new(glob)
        .literal_separator(true)
        .case_insensitive(false)
        .build()
        .map_err(|e| BuildError::InvalidGlob {
            glob: glob.to_string(),
            reason: e.to_string(),
        })
}

fn compile_ignore_set(extra: &[String]) -> BuildResult<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for glob in FORCE_IGNORE.iter().copied().chain(extra.iter().map(String::as_str)) {
        builder.add(compile_glob(glob)?);
    }
    builder.build().map_err(|e| BuildError::InvalidGlob {
        glob: extra.join(", "),
        reason: e.to_string(),
    })
}

fn is_literal(glob: &str) -> bool {
    !glob.contains(|c: char| matches!(c, '*' | '?' | '[' | ']' | '{' | '}' | '\\'))
}

fn glob_segments(glob: &str) -> Vec<&str> {
    glob.split('/').filter(|segment| !segment.is_empty()).collect()
}

/// Deepest level a glob can match, `None` when it contains `**`
fn glob_depth(glob: &str) -> Option<usize> {
    if glob.contains("**") {
        None
    } else {
        Some(glob_segments(glob).len().max(1))
    }
}

/// Whether a directory can still hold matches given the glob's literal prefix
fn on_literal_prefix(prefix: &[&str], item: &DirEntry) -> bool {
    if item.depth() == 0 || !item.file_type().is_dir() {
        return true;
    }
    match prefix.get(item.depth() - 1) {
        Some(segment) => item.file_name() == OsStr::new(segment),
        None => true,
    }
}

/// Files matched by an entry, relative to its input directory
///
/// Anything inside `dest_root` is skipped so the build never copies its own
/// output. Only the part of the input tree the glob can reach is walked.
pub fn match_files(entry: &AssetEntry, dest_root: &Path) -> BuildResult<Vec<PathBuf>> {
    let matcher = compile_glob(&entry.glob)?.compile_matcher();
    let ignore = compile_ignore_set(&entry.ignore)?;

    if !entry.input.is_dir() {
        return Ok(Vec::new());
    }

    if is_literal(&entry.glob) {
        return Ok(match_literal(entry, &ignore, dest_root));
    }

    let segments = glob_segments(&entry.glob);
    let prefix: Vec<&str> = segments
        .iter()
        .copied()
        .take_while(|segment| is_literal(segment))
        .collect();

    let mut walker = WalkDir::new(&entry.input)
        .follow_links(entry.follow_symlinks)
        .sort_by_file_name();
    if let Some(depth) = glob_depth(&entry.glob) {
        walker = walker.max_depth(depth);
    }

    let mut matched = Vec::new();
    let walker = walker.into_iter().filter_entry(|e| {
        !paths::is_within(dest_root, e.path()) && on_literal_prefix(&prefix, e)
    });

    for item in walker {
        let item = item.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| entry.input.clone());
            BuildError::io(path, std::io::Error::other(e))
        })?;
        if !item.file_type().is_file() {
            continue;
        }

        let Ok(relative) = item.path().strip_prefix(&entry.input) else {
            continue;
        };
        let candidate = paths::to_unix(relative);
        if matcher.is_match(&candidate) && !ignore.is_match(&candidate) {
            matched.push(relative.to_path_buf());
        }
    }

    Ok(matched)
}

/// A glob without wildcards names one file: look it up instead of walking
fn match_literal(entry: &AssetEntry, ignore: &GlobSet, dest_root: &Path) -> Vec<PathBuf> {
    let relative = PathBuf::from(entry.glob.trim_start_matches('/'));
    let candidate = entry.input.join(&relative);
    if !paths::is_within(&entry.input, &candidate) || paths::is_within(dest_root, &candidate) {
        return Vec::new();
    }

    let metadata = if entry.follow_symlinks {
        std::fs::metadata(&candidate)
    } else {
        std::fs::symlink_metadata(&candidate)
    };
    match metadata {
        Ok(metadata) if metadata.is_file() && !ignore.is_match(paths::to_unix(&relative)) => {
            vec![relative]
        }
        _ => Vec::new(),
    }
}

/// Copy every matched file and record it as a dependency of `entry_point_url`
pub async fn copy_assets(
    graph: &mut BuildGraph,
    entry_point_url: &str,
    entries: &[AssetEntry],
    dest_root: &Path,
) -> BuildResult<Vec<CopiedAsset>> {
    let mut copied = Vec::new();

    for entry in entries {
        for relative in match_files(entry, dest_root)? {
            let source = entry.input.join(&relative);
            let destination = entry.output.join(&relative);

            if let Some(parent) = destination.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| BuildError::io(parent, e))?;
            }
            tokio::fs::copy(&source, &destination)
                .await
                .map_err(|e| BuildError::io(&source, e))?;

            let url = paths::file_url(&source);
            if graph.get(&url).is_none() {
                graph.put(Node::file(url.clone()));
            }
            graph.add_dependency(entry_point_url, &url)?;

            tracing::debug!(source = %source.display(), destination = %destination.display(), "copied asset");
            copied.push(CopiedAsset {
                source,
                destination,
            });
        }
    }

    Ok(copied)
}
