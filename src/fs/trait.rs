//! FileSystem trait definition

use crate::image::ignore::{ContextIgnore, IGNORE_FILE};
use anyhow::Result;
use std::path::{Path, PathBuf};

/// Kind of entry found in a build context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// One entry that survives the ignore rules, relative to the context root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextEntry {
    pub path: PathBuf,
    pub kind: EntryKind,
}

/// Read-only view of a build context
pub trait FileSystem: Send + Sync {
    fn exists(&self, path: &Path) -> bool;

    fn is_dir(&self, path: &Path) -> bool;

    fn is_file(&self, path: &Path) -> bool;

    fn read_to_string(&self, path: &Path) -> Result<String>;

    /// Every file and directory under `root` that `ignore` does not exclude,
    /// sorted by path. The root itself is not listed.
    fn walk(&self, root: &Path, ignore: &ContextIgnore) -> Result<Vec<ContextEntry>>;

    /// Patterns from `<root>/.dockerignore`; nested ignore files are not read
    fn load_ignore(&self, root: &Path) -> Result<ContextIgnore> {
        let path = root.join(IGNORE_FILE);
        if !self.is_file(&path) {
            return Ok(ContextIgnore::empty());
        }
        ContextIgnore::from_patterns(root, &self.read_to_string(&path)?)
    }

    fn kind(&self, path: &Path) -> Option<EntryKind> {
        if self.is_file(path) {
            Some(EntryKind::File)
        } else if self.is_dir(path) {
            Some(EntryKind::Directory)
        } else {
            None
        }
    }
}
