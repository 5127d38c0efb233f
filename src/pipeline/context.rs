//! Build context inspection
//!
//! Checks what the image build will find in the context before any build
//! tool runs: the selected manifest and its includes, the entrypoint script
//! and the log directory the runtime stage re-owns after copying the tree.

use super::runtime::{relative_to_workdir, SourceTree};
use crate::error::PackagingError;
use crate::fs::FileSystem;
use crate::manifest::{self, ManifestAnalysis, ManifestVariant, RequirementsManifest};
use crate::output::PackagingRecipe;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Non-fatal observation about a build context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextWarning {
    pub check: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextReport {
    pub root: PathBuf,
    pub manifest: PathBuf,
    pub manifests: Vec<RequirementsManifest>,
    pub analysis: ManifestAnalysis,
    #[serde(skip)]
    pub source: SourceTree,
    pub warnings: Vec<ContextWarning>,
}

pub struct BuildContext<'a> {
    fs: &'a dyn FileSystem,
    root: PathBuf,
}

impl<'a> BuildContext<'a> {
    pub fn new(fs: &'a dyn FileSystem, root: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            root: root.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Inspect the context for one manifest variant; hard failures are
    /// `PackagingError`s, everything else lands in the report's warnings
    pub fn inspect(&self, recipe: &PackagingRecipe, variant: &ManifestVariant) -> Result<ContextReport> {
        let manifest_path = manifest::parser::normalize(Path::new(
            variant.path(&recipe.builder.requirements),
        ));
        let manifests = manifest::load_manifest_tree(self.fs, &self.root, &manifest_path)?;
        let analysis = manifest::analyze(&manifests, &recipe.native_libraries);
        let source = SourceTree::scan(self.fs, &self.root)?;

        for copied in self.copied_manifests(recipe, &manifest_path) {
            if !source.contains(&copied) {
                return Err(PackagingError::ManifestNotFound(copied).into());
            }
        }

        let entrypoint = Path::new(&recipe.launch.server_script);
        if !source.contains(entrypoint) {
            return Err(PackagingError::MissingEntrypoint(recipe.launch.server_script.clone()).into());
        }

        if let Some(log_rel) = relative_to_workdir(&recipe.runtime.log_dir.path, &recipe.runtime.workdir) {
            if !source.has_directory(&log_rel) {
                return Err(PackagingError::MissingLogDirectory(log_rel.display().to_string()).into());
            }
        }

        let warnings = self.collect_warnings(recipe, variant, &manifest_path, &manifests, &analysis);
        for w in &warnings {
            warn!(check = %w.check, "{}", w.message);
        }
        debug!(
            manifests = manifests.len(),
            distributions = analysis.distributions.len(),
            files = source.files.len(),
            "Build context inspected"
        );

        Ok(ContextReport {
            root: self.root.clone(),
            manifest: manifest_path,
            manifests,
            analysis,
            source,
            warnings,
        })
    }

    /// Manifests the builder stage copies for this selection
    fn copied_manifests(&self, recipe: &PackagingRecipe, selected: &Path) -> Vec<PathBuf> {
        let production = manifest::parser::normalize(Path::new(&recipe.builder.requirements.production));
        if production == selected {
            vec![production]
        } else {
            vec![production, selected.to_path_buf()]
        }
    }

    fn collect_warnings(
        &self,
        recipe: &PackagingRecipe,
        variant: &ManifestVariant,
        selected: &Path,
        manifests: &[RequirementsManifest],
        analysis: &ManifestAnalysis,
    ) -> Vec<ContextWarning> {
        let mut warnings = Vec::new();
        let copied = self.copied_manifests(recipe, selected);

        for m in manifests {
            for include in &m.includes {
                if !copied.contains(include) {
                    warnings.push(ContextWarning {
                        check: "ManifestIncludes".to_string(),
                        message: format!(
                            "{} includes {}, which the builder stage does not copy",
                            m.path.display(),
                            include.display()
                        ),
                    });
                }
            }
        }

        for unmapped in &analysis.unmapped_native {
            warnings.push(ContextWarning {
                check: "NativeLibraries".to_string(),
                message: format!(
                    "Dependency needs a native library missing from the mapping: {}",
                    unmapped
                ),
            });
        }

        if *variant == ManifestVariant::Production && analysis.has_test_tooling() {
            warnings.push(ContextWarning {
                check: "TestTooling".to_string(),
                message: format!(
                    "Production manifest installs test tooling: {}",
                    analysis.test_tooling.join(", ")
                ),
            });
        }

        if !analysis.unpinned.is_empty() {
            warnings.push(ContextWarning {
                check: "PinnedRequirements".to_string(),
                message: format!("Unpinned requirements: {}", analysis.unpinned.join(", ")),
            });
        }

        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MockFileSystem;

    fn spiderfoot_context() -> MockFileSystem {
        let fs = MockFileSystem::new();
        fs.add_file("sf.py", "");
        fs.add_file("sfcli.py", "");
        fs.add_file("log/.gitkeep", "");
        fs.add_file("requirements.txt", "cherrypy==18.6.0\nlxml==4.6.2\n");
        fs.add_file(
            "test/requirements.txt",
            "-r ../requirements.txt\npytest==6.2.2\nflake8==3.8.4\n",
        );
        fs
    }

    fn downcast(err: anyhow::Error) -> PackagingError {
        err.downcast::<PackagingError>().unwrap()
    }

    #[test]
    fn test_production_context_is_clean() {
        let fs = spiderfoot_context();
        let report = BuildContext::new(&fs, "/mock")
            .inspect(&PackagingRecipe::default(), &ManifestVariant::Production)
            .unwrap();
        assert_eq!(report.manifest, PathBuf::from("requirements.txt"));
        assert!(report.warnings.is_empty(), "{:?}", report.warnings);
        assert!(report.analysis.native_libraries.contains(&"libxml2".to_string()));
    }

    #[test]
    fn test_test_variant_reports_tooling_without_warning() {
        let fs = spiderfoot_context();
        let report = BuildContext::new(&fs, "/mock")
            .inspect(&PackagingRecipe::default(), &ManifestVariant::Test)
            .unwrap();
        assert_eq!(report.manifests.len(), 2);
        assert_eq!(report.analysis.test_tooling, vec!["flake8", "pytest"]);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_missing_log_directory_fails() {
        let fs = MockFileSystem::new();
        fs.add_file("sf.py", "");
        fs.add_file("requirements.txt", "six\n");
        let err = BuildContext::new(&fs, "/mock")
            .inspect(&PackagingRecipe::default(), &ManifestVariant::Production)
            .unwrap_err();
        assert!(matches!(downcast(err), PackagingError::MissingLogDirectory(_)));
    }

    #[test]
    fn test_empty_log_directory_is_enough() {
        let fs = MockFileSystem::new();
        fs.add_file("sf.py", "");
        fs.add_file("requirements.txt", "six\n");
        fs.add_dir("log");
        assert!(BuildContext::new(&fs, "/mock")
            .inspect(&PackagingRecipe::default(), &ManifestVariant::Production)
            .is_ok());
    }

    #[test]
    fn test_ignored_log_directory_fails() {
        let fs = spiderfoot_context();
        fs.add_file(".dockerignore", "log\n");
        let err = BuildContext::new(&fs, "/mock")
            .inspect(&PackagingRecipe::default(), &ManifestVariant::Production)
            .unwrap_err();
        assert!(matches!(downcast(err), PackagingError::MissingLogDirectory(_)));
    }

    #[test]
    fn test_nested_log_directory_does_not_count() {
        let fs = MockFileSystem::new();
        fs.add_file("sf.py", "");
        fs.add_file("requirements.txt", "six\n");
        fs.add_file("modules/log/.keep", "");
        let err = BuildContext::new(&fs, "/mock")
            .inspect(&PackagingRecipe::default(), &ManifestVariant::Production)
            .unwrap_err();
        assert!(matches!(downcast(err), PackagingError::MissingLogDirectory(_)));
    }

    #[test]
    fn test_missing_entrypoint_fails() {
        let fs = MockFileSystem::new();
        fs.add_file("requirements.txt", "six\n");
        fs.add_dir("log");
        let err = BuildContext::new(&fs, "/mock")
            .inspect(&PackagingRecipe::default(), &ManifestVariant::Production)
            .unwrap_err();
        assert!(matches!(downcast(err), PackagingError::MissingEntrypoint(_)));
    }

    #[test]
    fn test_ignored_manifest_fails() {
        let fs = spiderfoot_context();
        fs.add_file(".dockerignore", "test\n");
        let err = BuildContext::new(&fs, "/mock")
            .inspect(&PackagingRecipe::default(), &ManifestVariant::Test)
            .unwrap_err();
        match downcast(err) {
            PackagingError::ManifestNotFound(path) => {
                assert_eq!(path, PathBuf::from("test/requirements.txt"))
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_tooling_in_production_warns() {
        let fs = spiderfoot_context();
        fs.add_file("requirements.txt", "cherrypy==18.6.0\npytest==6.2.2\n");
        let report = BuildContext::new(&fs, "/mock")
            .inspect(&PackagingRecipe::default(), &ManifestVariant::Production)
            .unwrap();
        assert!(report.warnings.iter().any(|w| w.check == "TestTooling"));
    }

    #[test]
    fn test_uncopied_include_warns() {
        let fs = spiderfoot_context();
        fs.add_file("ci/requirements.txt", "-r extra.txt\nsix==1.15.0\n");
        fs.add_file("ci/extra.txt", "idna==2.10\n");
        let report = BuildContext::new(&fs, "/mock")
            .inspect(
                &PackagingRecipe::default(),
                &ManifestVariant::Custom("ci/requirements.txt".to_string()),
            )
            .unwrap();
        assert!(report.warnings.iter().any(|w| w.check == "ManifestIncludes"));
    }
}
