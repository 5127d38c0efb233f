use super::{ContextEntry, EntryKind, FileSystem};
use crate::image::ignore::ContextIgnore;
use anyhow::{Context, Result};
use ignore::WalkBuilder;
use std::fs;
use std::path::{Path, PathBuf};

pub struct RealFileSystem;

impl RealFileSystem {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RealFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystem for RealFileSystem {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).context(format!("Failed to read file {:?}", path))
    }

    fn walk(&self, root: &Path, ignore: &ContextIgnore) -> Result<Vec<ContextEntry>> {
        let mut builder = WalkBuilder::new(root);
        builder
            .hidden(false)
            .ignore(false)
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .parents(false)
            .follow_links(false);
        if !ignore.has_exceptions() {
            let prune = ignore.clone();
            let base = root.to_path_buf();
            builder.filter_entry(move |entry| match entry.path().strip_prefix(&base) {
                Ok(relative) => {
                    let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
                    !prune.is_excluded(relative, is_dir)
                }
                Err(_) => true,
            });
        }

        let mut entries = Vec::new();
        for entry in builder.build() {
            let entry = entry.context(format!("Failed to walk build context {:?}", root))?;
            let kind = match entry.file_type() {
                Some(t) if t.is_dir() => EntryKind::Directory,
                // symlinks are archived as links, never followed
                Some(t) if t.is_file() || t.is_symlink() => EntryKind::File,
                _ => continue,
            };
            let relative = match entry.path().strip_prefix(root) {
                Ok(relative) if !relative.as_os_str().is_empty() => relative,
                _ => continue,
            };
            if ignore.is_excluded(relative, kind == EntryKind::Directory) {
                continue;
            }
            entries.push(ContextEntry {
                path: relative.to_path_buf(),
                kind,
            });
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }
}
