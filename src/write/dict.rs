//! `KEY=value` dictionary writer and reader.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;

use crate::error::MetadataError;
use crate::format::FlatMetadata;
use crate::write::{render_scalar, DiskStorage, MetadataWriter, Storage};

/// Writes `<prefix>.dict` with one `KEY=value` line per entry. Values with
/// embedded control characters are truncated at the first one, keeping the
/// file line-oriented.
pub struct DictWriter {
    out_dir: PathBuf,
    prefix: String,
    storage: Arc<dyn Storage>,
}

impl DictWriter {
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
        self.out_dir.join(format!("{}.dict", self.prefix))
    }
}

fn first_line(value: &str) -> &str {
    value
        .split(|c: char| c.is_control())
        .next()
        .unwrap_or_default()
}

impl MetadataWriter for DictWriter {
    fn write(&self, metadata: &FlatMetadata) -> Result<PathBuf, MetadataError> {
        let mut body = String::new();
        for (key, value) in metadata {
            body.push_str(key);
            body.push('=');
            body.push_str(first_line(&render_scalar(value)));
            body.push('\n');
        }
        let path = self.path();
        self.storage.put(&path, body.as_bytes())?;
        Ok(path)
    }

    /// Reads the dict back. The format keeps no type information, so every
    /// value comes back as a string: `RS_PORT=5432` reads as `"5432"`, not
    /// `5432`. Only string values round-trip exactly.
    fn read(&self) -> Result<FlatMetadata, MetadataError> {
        let bytes = self.storage.get(&self.path())?;
        let text = String::from_utf8(bytes)
            .map_err(|_| MetadataError::ParseFailed("dict file is not utf-8".into()))?;

        let mut out = FlatMetadata::new();
        for line in text.lines().filter(|l| !l.is_empty()) {
            let (key, value) = line.split_once('=').ok_or_else(|| {
                MetadataError::ParseFailed(format!("dict line without '=': {:?}", line))
            })?;
            out.insert(key.to_string(), Value::String(value.to_string()));
        }
        Ok(out)
    }
}
