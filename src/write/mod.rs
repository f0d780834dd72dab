//! Metadata persistence: pluggable serializers plus symmetric readers.
//!
//! Every writer persists to `<prefix>.<ext>` in its output directory via an
//! injected [`Storage`], so tests and alternate backends replace the I/O
//! without subclassing anything.

use std::io;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::MetadataError;
use crate::format::FlatMetadata;

pub mod dict;
pub mod json;
pub mod raw;
pub mod script;
pub mod tree;

pub use dict::DictWriter;
pub use json::JsonWriter;
pub use raw::RawWriter;
pub use script::{InterpreterWriter, ShellWriter};
pub use tree::TreeWriter;

/// Byte-level storage behind every writer. `put` is an atomic replace.
pub trait Storage: Send + Sync {
    fn put(&self, path: &Path, bytes: &[u8]) -> io::Result<()>;
    fn get(&self, path: &Path) -> io::Result<Vec<u8>>;
    /// Entry names under a directory; errors when `path` is not one.
    fn list(&self, path: &Path) -> io::Result<Vec<String>>;
}

/// Default storage: real files, written to a temp sibling and renamed into
/// place. Output directories are created as needed.
#[derive(Debug, Default)]
pub struct DiskStorage;

impl Storage for DiskStorage {
    fn put(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, path)
    }

    fn get(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    fn list(&self, path: &Path) -> io::Result<Vec<String>> {
        if !path.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("{} is not a directory", path.display()),
            ));
        }
        let mut names = Vec::new();
        for entry in std::fs::read_dir(path)? {
            names.push(entry?.file_name().to_string_lossy().into_owned());
        }
        Ok(names)
    }
}

/// Serializer over a flat metadata map.
pub trait MetadataWriter {
    /// Persist the metadata; returns the path written.
    fn write(&self, metadata: &FlatMetadata) -> Result<PathBuf, MetadataError>;

    /// Symmetric inverse, where the format supports it.
    fn read(&self) -> Result<FlatMetadata, MetadataError> {
        Err(MetadataError::ReadUnsupported)
    }
}

/// Render a scalar flat-map value as text. Strings render bare; everything
/// else renders as its JSON form.
pub(crate) fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disk_storage_round_trip_and_replace() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deep").join("out.dict");
        let storage = DiskStorage;

        storage.put(&path, b"first").unwrap();
        assert_eq!(storage.get(&path).unwrap(), b"first");

        // Replace, not append.
        storage.put(&path, b"second").unwrap();
        assert_eq!(storage.get(&path).unwrap(), b"second");
    }

    #[test]
    fn test_render_scalar() {
        assert_eq!(render_scalar(&serde_json::json!("plain")), "plain");
        assert_eq!(render_scalar(&serde_json::json!(123)), "123");
        assert_eq!(render_scalar(&serde_json::json!(true)), "true");
    }
}
