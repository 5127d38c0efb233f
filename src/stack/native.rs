//! Native library catalogue
//!
//! One entry per shared library that Python extension modules compile against.
//! Both stage package lists are derived from this table: the builder installs
//! `dev_package`, the runtime installs `runtime_package`. Keeping the two sides
//! in a single record is what keeps them in sync.

use serde::{Deserialize, Serialize};

/// A native library with its build-time and run-time package names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeLibrary {
    /// Short library name (e.g., "libxml2")
    pub name: String,
    /// Headers/static package installed in the builder stage
    pub dev_package: String,
    /// Shared-library package installed in the runtime stage
    pub runtime_package: String,
    /// Python distributions whose extension modules link against this library
    #[serde(default)]
    pub python_packages: Vec<String>,
    /// Importable modules that prove the library loads in the runtime image
    #[serde(default)]
    pub import_checks: Vec<String>,
}

impl NativeLibrary {
    pub fn new(name: &str, dev_package: &str, runtime_package: &str) -> Self {
        Self {
            name: name.to_string(),
            dev_package: dev_package.to_string(),
            runtime_package: runtime_package.to_string(),
            python_packages: Vec::new(),
            import_checks: Vec::new(),
        }
    }

    pub fn used_by(mut self, packages: &[&str]) -> Self {
        self.python_packages = packages.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn checked_by(mut self, modules: &[&str]) -> Self {
        self.import_checks = modules.iter().map(|m| m.to_string()).collect();
        self
    }

    /// True if a normalized Python distribution name needs this library
    pub fn is_needed_by(&self, distribution: &str) -> bool {
        let wanted = normalize_distribution(distribution);
        self.python_packages
            .iter()
            .any(|p| normalize_distribution(p) == wanted)
    }
}

/// Normalize a Python distribution name the way pip compares them
pub fn normalize_distribution(name: &str) -> String {
    name.trim().to_lowercase().replace(['_', '.'], "-")
}

/// Libraries needed by the reconnaissance tool's dependency set on Alpine
pub fn default_libraries() -> Vec<NativeLibrary> {
    vec![
        NativeLibrary::new("musl", "musl-dev", "musl"),
        NativeLibrary::new("openssl", "openssl-dev", "openssl")
            .used_by(&["cryptography", "pyopenssl"])
            .checked_by(&["ssl", "cryptography.hazmat.bindings._openssl"]),
        NativeLibrary::new("libffi", "libffi-dev", "libffi")
            .used_by(&["cffi", "cryptography"])
            .checked_by(&["_cffi_backend"]),
        NativeLibrary::new("libxml2", "libxml2-dev", "libxml2")
            .used_by(&["lxml"])
            .checked_by(&["lxml.etree"]),
        NativeLibrary::new("libxslt", "libxslt-dev", "libxslt")
            .used_by(&["lxml"])
            .checked_by(&["lxml.etree"]),
        NativeLibrary::new("libyaml", "yaml-dev", "yaml")
            .used_by(&["pyyaml"])
            .checked_by(&["yaml", "yaml._yaml"]),
        NativeLibrary::new("tinyxml", "tinyxml-dev", "tinyxml"),
        NativeLibrary::new("jpeg", "jpeg-dev", "jpeg")
            .used_by(&["pillow"])
            .checked_by(&["PIL.Image"]),
        NativeLibrary::new("openjpeg", "openjpeg-dev", "openjpeg")
            .used_by(&["pillow"])
            .checked_by(&["PIL.Image"]),
        NativeLibrary::new("zlib", "zlib-dev", "zlib")
            .used_by(&["pillow"])
            .checked_by(&["zlib"]),
    ]
}

/// Toolchain packages that exist only in the builder stage.
/// The interpreter itself is shared by both stages and is not listed here.
pub fn default_toolchain() -> Vec<String> {
    [
        "gcc",
        "git",
        "curl",
        "python3-dev",
        "py3-pip",
        "swig",
        "cargo",
        "rust",
    ]
    .iter()
    .map(|p| p.to_string())
    .collect()
}

/// Looks up the runtime counterpart of a build-time package
pub fn runtime_counterpart<'a>(libraries: &'a [NativeLibrary], dev_package: &str) -> Option<&'a str> {
    libraries
        .iter()
        .find(|lib| lib.dev_package == dev_package)
        .map(|lib| lib.runtime_package.as_str())
}

/// Heuristic: Alpine and Debian both suffix header packages with `-dev`
pub fn is_dev_package(package: &str) -> bool {
    package.ends_with("-dev")
}
