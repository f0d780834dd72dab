//! Raw writer: verbatim byte dump, bypassing formatting entirely.

use std::path::PathBuf;
use std::sync::Arc;

use crate::error::MetadataError;
use crate::write::{DiskStorage, Storage};

/// Writes `<prefix>.raw` holding exactly the bytes passed in.
pub struct RawWriter {
    out_dir: PathBuf,
    prefix: String,
    storage: Arc<dyn Storage>,
}

impl RawWriter {
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

    fn path(&self) -> PathBuf {
        self.out_dir.join(format!("{}.raw", self.prefix))
    }

    pub fn write_raw(&self, bytes: &[u8]) -> Result<PathBuf, MetadataError> {
        let path = self.path();
        self.storage.put(&path, bytes)?;
        Ok(path)
    }

    pub fn read_raw(&self) -> Result<Vec<u8>, MetadataError> {
        Ok(self.storage.get(&self.path())?)
    }
}
