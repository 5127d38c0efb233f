//! What a manifest implies for the builder: native libraries and test tooling

use super::parser::RequirementsManifest;
use crate::stack::native::{normalize_distribution, NativeLibrary};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Distributions that only belong in a test/development environment
const TEST_TOOLING: &[&str] = &[
    "pytest",
    "pytest-cov",
    "pytest-xdist",
    "pytest-mock",
    "coverage",
    "flake8",
    "pylint",
    "mypy",
    "tox",
    "black",
    "isort",
    "pre-commit",
    "bandit",
    "pydocstyle",
    "darglint",
];

/// Distributions known to ship C extensions that link a system library
/// missing from the default catalogue
const KNOWN_NATIVE: &[(&str, &str)] = &[
    ("psycopg2", "libpq-dev"),
    ("mysqlclient", "mariadb-dev"),
    ("python-ldap", "openldap-dev"),
    ("pycurl", "curl-dev"),
    ("python-magic", "libmagic"),
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestAnalysis {
    /// Every distribution named across the manifest and its includes
    pub distributions: Vec<String>,
    /// Catalogue libraries the dependency set compiles against
    pub native_libraries: Vec<String>,
    /// Test/lint tooling present (only expected in the test manifest)
    pub test_tooling: Vec<String>,
    /// Native build requirements not covered by the library catalogue
    pub unmapped_native: Vec<String>,
    /// Requirements without an exact pin
    pub unpinned: Vec<String>,
}

impl ManifestAnalysis {
    pub fn has_test_tooling(&self) -> bool {
        !self.test_tooling.is_empty()
    }
}

fn is_test_tool(distribution: &str) -> bool {
    TEST_TOOLING.contains(&distribution)
        || distribution.starts_with("pytest-")
        || distribution.starts_with("flake8-")
}

/// Analyze a manifest together with everything it includes
pub fn analyze(manifests: &[RequirementsManifest], libraries: &[NativeLibrary]) -> ManifestAnalysis {
    let mut distributions = BTreeSet::new();
    let mut unpinned = BTreeSet::new();

    for manifest in manifests {
        for requirement in &manifest.requirements {
            let name = normalize_distribution(&requirement.name);
            if !requirement.is_pinned() {
                unpinned.insert(name.clone());
            }
            distributions.insert(name);
        }
    }

    let native_libraries: BTreeSet<String> = libraries
        .iter()
        .filter(|lib| distributions.iter().any(|d| lib.is_needed_by(d)))
        .map(|lib| lib.name.clone())
        .collect();

    let unmapped_native: BTreeSet<String> = KNOWN_NATIVE
        .iter()
        .filter(|(dist, _)| distributions.contains(*dist))
        .filter(|(_, package)| {
            !libraries
                .iter()
                .any(|lib| lib.dev_package == *package || lib.runtime_package == *package)
        })
        .map(|(dist, package)| format!("{} ({})", dist, package))
        .collect();

    let test_tooling = distributions
        .iter()
        .filter(|d| is_test_tool(d))
        .cloned()
        .collect();

    ManifestAnalysis {
        distributions: distributions.into_iter().collect(),
        native_libraries: native_libraries.into_iter().collect(),
        test_tooling,
        unmapped_native: unmapped_native.into_iter().collect(),
        unpinned: unpinned.into_iter().collect(),
    }
}
