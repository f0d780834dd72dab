//! File-backed metadata source.
//!
//! Reads the well-known injected files: one holding newline-delimited
//! `key=value` cloud metadata, one holding the raw user-data blob. The
//! queried path's leading segments select the file.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::MetadataError;
use crate::source::Source;

/// Configuration for a [`FileSource`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Path of the injected cloud-metadata file.
    pub metadata_path: PathBuf,
    /// Path of the injected user-data file, if any.
    pub userdata_path: Option<PathBuf>,
    /// Query-path prefix routed to the user-data file.
    pub userdata_root: String,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            metadata_path: PathBuf::from("/var/cache/instance-metadata/metadata"),
            userdata_path: Some(PathBuf::from("/var/cache/instance-metadata/userdata")),
            userdata_root: "user-data".to_string(),
        }
    }
}

/// Metadata source over one or two local files.
pub struct FileSource {
    config: FileConfig,
    finished: AtomicBool,
}

impl FileSource {
    pub fn new(config: FileConfig) -> Self {
        Self {
            config,
            finished: AtomicBool::new(false),
        }
    }

    fn file_for(&self, path: &str) -> &PathBuf {
        let normalized = path.trim_start_matches('/');
        if let Some(userdata) = &self.config.userdata_path {
            let root = self.config.userdata_root.trim_matches('/');
            if !root.is_empty()
                && (normalized == root || normalized.starts_with(&format!("{}/", root)))
            {
                return userdata;
            }
        }
        &self.config.metadata_path
    }
}

#[async_trait]
impl Source for FileSource {
    async fn query(&self, path: &str) -> Result<String, MetadataError> {
        let file = self.file_for(path);
        let contents = tokio::fs::read_to_string(file).await.map_err(|e| {
            MetadataError::QueryFailed(format!("{}: {}", file.display(), e))
        })?;

        // Present-but-blank means "no metadata", not a failure.
        if contents.trim().is_empty() {
            return Ok(String::new());
        }
        Ok(contents)
    }

    async fn finish(&self) {
        if !self.finished.swap(true, Ordering::SeqCst) {
            tracing::debug!("file source finished");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn config_with(dir: &tempfile::TempDir) -> FileConfig {
        FileConfig {
            metadata_path: dir.path().join("metadata"),
            userdata_path: Some(dir.path().join("userdata")),
            userdata_root: "user-data".to_string(),
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_query_failed() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileSource::new(config_with(&dir));
        let result = source.query("meta-data").await;
        assert!(matches!(result, Err(MetadataError::QueryFailed(_))));
    }

    #[tokio::test]
    async fn test_blank_file_is_empty_result() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with(&dir);
        std::fs::File::create(&config.metadata_path)
            .unwrap()
            .write_all(b" \t\r\n")
            .unwrap();

        let source = FileSource::new(config);
        assert_eq!(source.query("meta-data").await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_routes_userdata_root_to_userdata_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with(&dir);
        std::fs::write(&config.metadata_path, "region=dfw\n").unwrap();
        std::fs::write(config.userdata_path.as_ref().unwrap(), "blob").unwrap();

        let source = FileSource::new(config);
        assert_eq!(source.query("meta-data").await.unwrap(), "region=dfw\n");
        assert_eq!(source.query("user-data").await.unwrap(), "blob");
        assert_eq!(source.query("/user-data/0").await.unwrap(), "blob");
    }

    #[tokio::test]
    async fn test_no_userdata_file_falls_back_to_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_with(&dir);
        config.userdata_path = None;
        std::fs::write(&config.metadata_path, "region=dfw\n").unwrap();

        let source = FileSource::new(config);
        assert_eq!(source.query("user-data").await.unwrap(), "region=dfw\n");
    }
}
