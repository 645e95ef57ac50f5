//! Entry point and package descriptors
use libpack_config::{AssetPattern, CompilationMode};
use libpack_package::PackageJson;
use std::path::{Path, PathBuf};

/// Directory holding flattened ES module bundles
pub const FESM_DIR: &str = "fesm2022";

/// Bundled type declarations inside an entry point's output directory
pub const DECLARATIONS_FILE: &str = "index.d.ts";

/// URL scheme for entry point nodes
pub const ENTRY_POINT_SCHEME: &str = "entry-point://";

/// URL scheme for package nodes
pub const PACKAGE_SCHEME: &str = "package://";

/// Graph URL of an entry point
pub fn entry_point_url(module_id: &str) -> String {
    format!("{}{}", ENTRY_POINT_SCHEME, module_id)
}

/// Graph URL of a package
pub fn package_url(name: &str) -> String {
    format!("{}{}", PACKAGE_SCHEME, name)
}

/// Default flat module file name for a module id (`@scope/lib/testing` -> `scope-lib-testing`)
pub fn flat_module_file(module_id: &str) -> String {
    module_id.replace('@', "").replace('/', "-")
}

/// Output files of one entry point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationFiles {
    /// Output directory; holds the entry point's package.json
    pub directory: PathBuf,
    /// Flattened ES module bundle
    pub fesm: PathBuf,
    /// Bundled type declarations
    pub declarations: PathBuf,
}

impl DestinationFiles {
    /// Conventional layout below `dest_root`
    ///
    /// Bundles for every entry point share `<dest>/fesm2022`; declarations sit
    /// in the entry point's own directory.
    pub fn for_entry_point(
        dest_root: &Path,
        secondary_subpath: Option<&Path>,
        flat_module_file: &str,
    ) -> Self {
        let directory = match secondary_subpath {
            Some(subpath) => dest_root.join(subpath),
            None => dest_root.to_path_buf(),
        };

        Self {
            fesm: dest_root
                .join(FESM_DIR)
                .join(format!("{}.mjs", flat_module_file)),
            declarations: directory.join(DECLARATIONS_FILE),
            directory,
        }
    }
}

/// One publishable unit of the library
#[derive(Debug, Clone)]
pub struct EntryPoint {
    /// Module identifier, also the published package name
    pub module_id: String,
    /// Source directory
    pub base_path: PathBuf,
    /// Declared manifest fragment
    pub manifest: PackageJson,
    pub destination: DestinationFiles,
    pub compilation_mode: CompilationMode,
    pub is_secondary: bool,
}

impl EntryPoint {
    pub fn url(&self) -> String {
        entry_point_url(&self.module_id)
    }

    pub fn is_primary(&self) -> bool {
        !self.is_secondary
    }
}

/// Root-level packaging settings
#[derive(Debug, Clone)]
pub struct Package {
    /// Source root
    pub src: PathBuf,
    /// Destination root
    pub dest: PathBuf,
    pub assets: Vec<AssetPattern>,
    /// Regular expressions for dependencies allowed outside `peerDependencies`
    pub allowed_non_peer_dependencies: Vec<String>,
    pub keep_lifecycle_scripts: bool,
    /// Graph URL of the primary entry point
    pub primary_url: String,
    /// Runtime compatibility shim package
    pub compat_shim: String,
    /// Manifest of the compiler toolchain, which pins the shim version
    pub toolchain_manifest: Option<PathBuf>,
}
