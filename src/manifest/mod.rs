//! Requirements manifests: selection, loading and analysis

pub mod analysis;
pub mod parser;

pub use analysis::{analyze, ManifestAnalysis};
pub use parser::{parse_manifest, Requirement, RequirementsManifest};

use crate::error::PackagingError;
use crate::fs::FileSystem;
use crate::output::RequirementsSpec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Which manifest the `REQUIREMENTS` build argument selects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestVariant {
    Production,
    Test,
    /// Any other manifest path inside the build context
    Custom(String),
}

impl ManifestVariant {
    /// `production`/`prod`, `test`/`dev`, or a path
    pub fn parse(value: &str) -> Result<Self, PackagingError> {
        let value = value.trim();
        match value.to_lowercase().as_str() {
            "" => Err(PackagingError::EmptyRequirementsRef),
            "production" | "prod" | "default" => Ok(Self::Production),
            "test" | "dev" | "development" => Ok(Self::Test),
            _ => Ok(Self::Custom(value.to_string())),
        }
    }

    /// Manifest path relative to the build context
    pub fn path<'a>(&'a self, spec: &'a RequirementsSpec) -> &'a str {
        match self {
            Self::Production => &spec.production,
            Self::Test => &spec.test,
            Self::Custom(path) => path,
        }
    }
}

impl Default for ManifestVariant {
    fn default() -> Self {
        Self::Production
    }
}

impl fmt::Display for ManifestVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Production => write!(f, "production"),
            Self::Test => write!(f, "test"),
            Self::Custom(path) => write!(f, "{}", path),
        }
    }
}

/// The resolved build argument: its name and the manifest path it defaults to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementsRef {
    pub arg_name: String,
    pub default_path: String,
}

impl RequirementsRef {
    pub fn resolve(spec: &RequirementsSpec, variant: &ManifestVariant) -> Result<Self, PackagingError> {
        let path = variant.path(spec).trim();
        if path.is_empty() || spec.arg_name.trim().is_empty() {
            return Err(PackagingError::EmptyRequirementsRef);
        }
        Ok(Self {
            arg_name: spec.arg_name.clone(),
            default_path: path.to_string(),
        })
    }

    /// `$NAME` expansion used inside the builder stage
    pub fn expansion(&self) -> String {
        format!("${}", self.arg_name)
    }
}

/// Load a manifest and every manifest it includes, depth-first.
///
/// The returned list starts with the root manifest. Paths are relative to
/// `context_root`. A missing or empty root manifest, a malformed line, or an
/// include cycle is a build-configuration error.
pub fn load_manifest_tree(
    fs: &dyn FileSystem,
    context_root: &Path,
    manifest: &Path,
) -> Result<Vec<RequirementsManifest>, PackagingError> {
    let mut loaded = Vec::new();
    let mut stack = Vec::new();
    load_recursive(fs, context_root, &parser::normalize(manifest), &mut stack, &mut loaded)?;

    if loaded.iter().all(RequirementsManifest::is_empty) {
        return Err(PackagingError::EmptyManifest(manifest.to_path_buf()));
    }
    Ok(loaded)
}

fn load_recursive(
    fs: &dyn FileSystem,
    context_root: &Path,
    relative: &Path,
    stack: &mut Vec<PathBuf>,
    loaded: &mut Vec<RequirementsManifest>,
) -> Result<(), PackagingError> {
    if stack.iter().any(|p| p == relative) {
        return Err(PackagingError::IncludeCycle(relative.to_path_buf()));
    }
    if loaded.iter().any(|m| m.path == relative) {
        return Ok(());
    }

    let absolute = context_root.join(relative);
    if !fs.is_file(&absolute) {
        return Err(PackagingError::ManifestNotFound(relative.to_path_buf()));
    }
    let content = fs
        .read_to_string(&absolute)
        .map_err(|_| PackagingError::ManifestNotFound(relative.to_path_buf()))?;

    let manifest = parse_manifest(relative, &content)?;
    debug!(
        manifest = %relative.display(),
        requirements = manifest.requirements.len(),
        includes = manifest.includes.len(),
        "Parsed requirements manifest"
    );

    let includes = manifest.includes.clone();
    loaded.push(manifest);

    stack.push(relative.to_path_buf());
    for include in includes {
        load_recursive(fs, context_root, &include, stack, loaded)?;
    }
    stack.pop();

    Ok(())
}
