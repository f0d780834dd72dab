//! Sourceable script writers: shell and interpreter flavors.

use std::path::PathBuf;
use std::sync::Arc;

use crate::error::MetadataError;
use crate::format::FlatMetadata;
use crate::write::{render_scalar, DiskStorage, MetadataWriter, Storage};

#[cfg(unix)]
const SHELL_EXTENSION: &str = "sh";
#[cfg(windows)]
const SHELL_EXTENSION: &str = "cmd";

/// Writes `<prefix>.sh` (or `.cmd`) with one environment-variable export
/// per key, quoted for the platform shell.
pub struct ShellWriter {
    out_dir: PathBuf,
    prefix: String,
    storage: Arc<dyn Storage>,
}

impl ShellWriter {
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
        self.out_dir
            .join(format!("{}.{}", self.prefix, SHELL_EXTENSION))
    }
}

fn shell_line(key: &str, value: &str) -> String {
    if cfg!(windows) {
        format!("set {}={}\r\n", key, value)
    } else {
        format!("export {}='{}'\n", key, value.replace('\'', "'\\''"))
    }
}

impl MetadataWriter for ShellWriter {
    fn write(&self, metadata: &FlatMetadata) -> Result<PathBuf, MetadataError> {
        let mut body = String::new();
        if cfg!(unix) {
            body.push_str("#!/bin/sh\n");
        }
        for (key, value) in metadata {
            body.push_str(&shell_line(key, &render_scalar(value)));
        }
        let path = self.path();
        self.storage.put(&path, body.as_bytes())?;
        Ok(path)
    }
}

/// Writes `<prefix>.<ext>` with one environment-variable assignment per key,
/// requireable by a configured interpreter command.
pub struct InterpreterWriter {
    out_dir: PathBuf,
    prefix: String,
    command: String,
    extension: String,
    storage: Arc<dyn Storage>,
}

impl InterpreterWriter {
    /// Writer for the given interpreter, e.g. `("ruby", "rb")`.
    pub fn new(out_dir: impl Into<PathBuf>, prefix: &str, command: &str, extension: &str) -> Self {
        Self::with_storage(out_dir, prefix, command, extension, Arc::new(DiskStorage))
    }

    pub fn with_storage(
        out_dir: impl Into<PathBuf>,
        prefix: &str,
        command: &str,
        extension: &str,
        storage: Arc<dyn Storage>,
    ) -> Self {
        Self {
            out_dir: out_dir.into(),
            prefix: prefix.to_string(),
            command: command.to_string(),
            extension: extension.to_string(),
            storage,
        }
    }

    fn path(&self) -> PathBuf {
        self.out_dir
            .join(format!("{}.{}", self.prefix, self.extension))
    }
}

fn interpreter_quote(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

impl MetadataWriter for InterpreterWriter {
    fn write(&self, metadata: &FlatMetadata) -> Result<PathBuf, MetadataError> {
        let mut body = format!("#!/usr/bin/env {}\n", self.command);
        for (key, value) in metadata {
            body.push_str(&format!(
                "ENV['{}'] = '{}'\n",
                key,
                interpreter_quote(&render_scalar(value))
            ));
        }
        let path = self.path();
        self.storage.put(&path, body.as_bytes())?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> FlatMetadata {
        let mut metadata = FlatMetadata::new();
        metadata.insert("RS_HOST".into(), json!("web01"));
        metadata.insert("RS_MOTD".into(), json!("it's alive"));
        metadata
    }

    #[test]
    #[cfg(unix)]
    fn test_shell_writer_quotes_single_quotes() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ShellWriter::new(dir.path(), "metadata");
        let path = writer.write(&sample()).unwrap();

        assert_eq!(path, dir.path().join("metadata.sh"));
        let body = std::fs::read_to_string(path).unwrap();
        assert!(body.starts_with("#!/bin/sh\n"));
        assert!(body.contains("export RS_HOST='web01'\n"));
        assert!(body.contains("export RS_MOTD='it'\\''s alive'\n"));
    }

    #[test]
    fn test_shell_writer_read_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ShellWriter::new(dir.path(), "metadata");
        assert!(matches!(
            writer.read(),
            Err(MetadataError::ReadUnsupported)
        ));
    }

    #[test]
    fn test_interpreter_writer_emits_env_assignments() {
        let dir = tempfile::tempdir().unwrap();
        let writer = InterpreterWriter::new(dir.path(), "metadata", "ruby", "rb");
        let path = writer.write(&sample()).unwrap();

        assert_eq!(path, dir.path().join("metadata.rb"));
        let body = std::fs::read_to_string(path).unwrap();
        assert!(body.starts_with("#!/usr/bin/env ruby\n"));
        assert!(body.contains("ENV['RS_HOST'] = 'web01'\n"));
        assert!(body.contains("ENV['RS_MOTD'] = 'it\\'s alive'\n"));
    }
}
