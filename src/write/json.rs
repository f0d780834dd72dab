//! JSON writer and reader; the one format with full-fidelity round trips.

use std::path::PathBuf;
use std::sync::Arc;

use crate::error::MetadataError;
use crate::format::FlatMetadata;
use crate::write::{DiskStorage, MetadataWriter, Storage};

/// Writes `<prefix>.json` holding the flat map as a JSON object.
pub struct JsonWriter {
    out_dir: PathBuf,
    prefix: String,
    storage: Arc<dyn Storage>,
}

impl JsonWriter {
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
        self.out_dir.join(format!("{}.json", self.prefix))
    }
}

impl MetadataWriter for JsonWriter {
    fn write(&self, metadata: &FlatMetadata) -> Result<PathBuf, MetadataError> {
        let mut body = serde_json::to_vec_pretty(metadata)?;
        body.push(b'\n');
        let path = self.path();
        self.storage.put(&path, &body)?;
        Ok(path)
    }

    fn read(&self) -> Result<FlatMetadata, MetadataError> {
        let bytes = self.storage.get(&self.path())?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_full_fidelity_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let writer = JsonWriter::new(dir.path(), "metadata");

        let mut metadata = FlatMetadata::new();
        metadata.insert("RS_HOST".into(), json!("web01"));
        metadata.insert("RS_PORT".into(), json!(5432));
        metadata.insert("RS_MULTILINE".into(), json!("a\nb"));
        metadata.insert("RS_BLANK".into(), json!(""));

        writer.write(&metadata).unwrap();
        assert_eq!(writer.read().unwrap(), metadata);
    }

    #[test]
    fn test_writes_prefixed_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let writer = JsonWriter::new(dir.path(), "userdata");
        let path = writer.write(&FlatMetadata::new()).unwrap();
        assert_eq!(path, dir.path().join("userdata.json"));
    }
}
