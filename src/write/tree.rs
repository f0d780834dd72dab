//! Directory-tree writer: one subdirectory per branch, one file per leaf.
//!
//! Also serves as the provider's raw-capture sink, mirroring a climbed tree
//! on disk for diagnostics.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::MetadataError;
use crate::node::MetadataNode;
use crate::write::{DiskStorage, Storage};

/// Writes a metadata tree under `<out_dir>/<prefix>/`.
pub struct TreeWriter {
    out_dir: PathBuf,
    prefix: String,
    storage: Arc<dyn Storage>,
}

impl TreeWriter {
    pub fn new(out_dir: impl Into<PathBuf>, prefix: &str) -> Self {
        Self::with_storage(out_dir, prefix, Arc::new(DiskStorage))
    }

    pub fn with_storage(
        out_dir: impl Into<PathBuf>,
        prefix: &str,
        storage: Arc<dyn Storage>,
    ) -> Self {
        Self {
            out_dir: out_dir.into(),
            prefix: prefix.to_string(),
            storage,
        }
    }

    fn root(&self) -> PathBuf {
        self.out_dir.join(&self.prefix)
    }

    /// Mirror the tree on disk; returns the root written.
    pub fn write_node(&self, node: &MetadataNode) -> Result<PathBuf, MetadataError> {
        let root = self.root();
        self.write_at(&root, node)?;
        Ok(root)
    }

    fn write_at(&self, path: &Path, node: &MetadataNode) -> Result<(), MetadataError> {
        match node {
            MetadataNode::Leaf(value) => {
                self.storage.put(path, value.as_bytes())?;
                Ok(())
            }
            MetadataNode::Branch(children) => {
                for (key, child) in children {
                    self.write_at(&path.join(sanitize(key)), child)?;
                }
                Ok(())
            }
        }
    }

    /// Read back the subtree at `subpath` (empty for the whole tree).
    pub fn read_node(&self, subpath: &str) -> Result<MetadataNode, MetadataError> {
        let mut base = self.root();
        for seg in subpath.split('/').filter(|s| !s.is_empty()) {
            base = base.join(sanitize(seg));
        }
        self.read_at(&base)
    }

    fn read_at(&self, path: &Path) -> Result<MetadataNode, MetadataError> {
        match self.storage.list(path) {
            Ok(mut names) => {
                names.sort();
                let mut children = IndexMap::new();
                for name in names {
                    children.insert(name.clone(), self.read_at(&path.join(&name))?);
                }
                Ok(MetadataNode::Branch(children))
            }
            Err(_) => {
                let bytes = self.storage.get(path)?;
                let value = String::from_utf8(bytes).map_err(|_| {
                    MetadataError::ParseFailed(format!("{}: not utf-8", path.display()))
                })?;
                Ok(MetadataNode::Leaf(value))
            }
        }
    }
}

/// File-name-safe form of a display key. Display keys may carry `/` from
/// alias entries; path separators and control characters become `_`, and
/// dot-only names are rewritten so a key can never escape the tree root.
fn sanitize(key: &str) -> String {
    let cleaned: String = key
        .chars()
        .map(|c| {
            if c == '/' || c == '\\' || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        "_".to_string()
    } else {
        cleaned
    }
}
