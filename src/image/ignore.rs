//! `.dockerignore` rendering and matching
//!
//! The runtime stage copies the build context opaquely, so anything not
//! excluded here lands in the final image.
//!
//! Matching follows the Docker builder rather than git: only the file at the
//! context root is read, every pattern is relative to that root (`env` never
//! matches `modules/env`), and a trailing slash does not restrict a pattern
//! to directories.

use anyhow::{Context, Result};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::path::Path;

/// Name of the ignore file read from the context root
pub const IGNORE_FILE: &str = ".dockerignore";

/// Entries excluded from every build context
const STANDARD_EXCLUDES: &[&str] = &[
    ".git",
    ".github",
    ".gitignore",
    ".dockerignore",
    ".vscode",
    ".idea",
    "*.swp",
    "*.swo",
    "*~",
    ".DS_Store",
    "**/__pycache__",
    "**/*.pyc",
    "**/*.pyo",
    ".pytest_cache",
    ".mypy_cache",
    ".coverage",
    "htmlcov",
    ".tox",
    "venv",
    ".venv",
    "env",
    "Dockerfile*",
];

/// Render the ignore file; `keep` paths are re-included after every exclude
pub fn render(keep: &[&str], extra: &[String]) -> String {
    let mut lines = vec!["# Generated by reconpack".to_string()];
    lines.extend(STANDARD_EXCLUDES.iter().map(|p| p.to_string()));
    for pattern in extra {
        let pattern = pattern.trim();
        if !pattern.is_empty() && !lines.iter().any(|l| l == pattern) {
            lines.push(pattern.to_string());
        }
    }
    for path in keep {
        lines.push(format!("!{}", path.trim_start_matches('/')));
    }
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// Patterns from an existing ignore file: comments and blank lines dropped
pub fn parse_patterns(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Compiled `.dockerignore` patterns for one build context
#[derive(Debug, Clone)]
pub struct ContextIgnore {
    matcher: Gitignore,
}

impl ContextIgnore {
    /// Excludes nothing
    pub fn empty() -> Self {
        Self {
            matcher: Gitignore::empty(),
        }
    }

    pub fn from_patterns(root: &Path, content: &str) -> Result<Self> {
        let mut builder = GitignoreBuilder::new(root);
        for pattern in parse_patterns(content) {
            if let Some(line) = anchor_pattern(&pattern) {
                builder
                    .add_line(None, &line)
                    .with_context(|| format!("Invalid ignore pattern '{}'", pattern))?;
            }
        }
        let matcher = builder.build().context("Failed to compile ignore patterns")?;
        Ok(Self { matcher })
    }

    /// True when `relative` (or one of its parent directories) is excluded
    pub fn is_excluded(&self, relative: &Path, is_dir: bool) -> bool {
        if relative.as_os_str().is_empty() || relative.has_root() {
            return false;
        }
        self.matcher
            .matched_path_or_any_parents(relative, is_dir)
            .is_ignore()
    }

    /// Whether any `!` pattern can re-include entries below an excluded directory
    pub fn has_exceptions(&self) -> bool {
        self.matcher.num_whitelists() > 0
    }
}

/// Rewrite a Docker pattern as a root-anchored gitignore line
fn anchor_pattern(pattern: &str) -> Option<String> {
    let (negated, body) = match pattern.strip_prefix('!') {
        Some(rest) => (true, rest.trim()),
        None => (false, pattern),
    };
    let mut body = body;
    while let Some(rest) = body.strip_prefix("./") {
        body = rest;
    }
    let body = body.trim_start_matches('/').trim_end_matches('/');
    if body.is_empty() || body == "." {
        return None;
    }
    Some(format!("{}/{}", if negated { "!" } else { "" }, body))
}
