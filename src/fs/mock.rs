use super::{ContextEntry, EntryKind, FileSystem};
use crate::image::ignore::ContextIgnore;
use anyhow::{anyhow, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// In-memory build context rooted at `/mock` unless told otherwise
pub struct MockFileSystem {
    entries: RwLock<BTreeMap<PathBuf, Option<String>>>,
    root: PathBuf,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::with_root(PathBuf::from("/mock"))
    }

    pub fn with_root(root: PathBuf) -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            root,
        }
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: &str) {
        let path = self.absolute(path.as_ref());
        let mut entries = self.entries.write().unwrap();
        if let Some(parent) = path.parent() {
            Self::add_parents(&mut entries, parent);
        }
        entries.insert(path, Some(content.to_string()));
    }

    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let path = self.absolute(path.as_ref());
        let mut entries = self.entries.write().unwrap();
        Self::add_parents(&mut entries, &path);
    }

    fn absolute(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    fn add_parents(entries: &mut BTreeMap<PathBuf, Option<String>>, path: &Path) {
        let mut current = PathBuf::new();
        for component in path.components() {
            current.push(component);
            entries.entry(current.clone()).or_insert(None);
        }
    }

    fn entry_kind(&self, path: &Path) -> Option<EntryKind> {
        let path = self.absolute(path);
        self.entries.read().unwrap().get(&path).map(|content| match content {
            Some(_) => EntryKind::File,
            None => EntryKind::Directory,
        })
    }
}

impl Default for MockFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystem for MockFileSystem {
    fn exists(&self, path: &Path) -> bool {
        self.entry_kind(path).is_some()
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.entry_kind(path) == Some(EntryKind::Directory)
    }

    fn is_file(&self, path: &Path) -> bool {
        self.entry_kind(path) == Some(EntryKind::File)
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        let path = self.absolute(path);
        let entries = self.entries.read().unwrap();
        match entries.get(&path) {
            Some(Some(content)) => Ok(content.clone()),
            Some(None) => Err(anyhow!("Not a file: {:?}", path)),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn walk(&self, root: &Path, ignore: &ContextIgnore) -> Result<Vec<ContextEntry>> {
        let root = self.absolute(root);
        if !self.is_dir(&root) {
            return Err(anyhow!("Directory not found: {:?}", root));
        }

        let entries = self.entries.read().unwrap();
        let walked = entries
            .iter()
            .filter_map(|(path, content)| {
                let relative = path.strip_prefix(&root).ok()?;
                if relative.as_os_str().is_empty() {
                    return None;
                }
                let kind = match content {
                    Some(_) => EntryKind::File,
                    None => EntryKind::Directory,
                };
                Some(ContextEntry {
                    path: relative.to_path_buf(),
                    kind,
                })
            })
            .filter(|entry| !ignore.is_excluded(&entry.path, entry.kind == EntryKind::Directory))
            .collect();
        Ok(walked)
    }
}
