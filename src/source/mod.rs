//! Metadata source abstraction and the registry of concrete backends.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::MetadataError;

pub mod cert;
pub mod drive;
pub mod file;
pub mod http;
pub mod selective;

pub use cert::{CertConfig, CertSource};
pub use drive::{DriveConfig, DriveSource};
pub use file::{FileConfig, FileSource};
pub use http::{HttpConfig, HttpSource};
pub use selective::{
    first_non_empty_policy, BuildFuture, SelectPolicy, Selection, SelectiveSource, SourceBuilder,
};

/// Uniform query interface over a concrete metadata backend.
///
/// `query` must be idempotent and safely retryable. A resource that is
/// confirmed absent (clean 404, present-but-blank file) yields `Ok("")`;
/// only an unrecoverable condition is `QueryFailed`.
#[async_trait]
pub trait Source: Send + Sync {
    /// Fetch the raw value at a `/`-joined path.
    async fn query(&self, path: &str) -> Result<String, MetadataError>;

    /// Release any held resources. Calling twice is a no-op.
    async fn finish(&self);
}

/// Discriminant tags for the closed set of backend kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// HTTP metadata service.
    Http,
    /// Local metadata / user-data files.
    File,
    /// Certificate store payload.
    CertStore,
    /// Attached config-drive block device.
    BlockDevice,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            SourceKind::Http => "http",
            SourceKind::File => "file",
            SourceKind::CertStore => "cert-store",
            SourceKind::BlockDevice => "block-device",
        };
        write!(f, "{}", tag)
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "http" => Ok(SourceKind::Http),
            "file" => Ok(SourceKind::File),
            "cert-store" | "cert" => Ok(SourceKind::CertStore),
            "block-device" | "drive" => Ok(SourceKind::BlockDevice),
            _ => Err(format!(
                "unknown source kind: {} (expected http, file, cert-store, or block-device)",
                s
            )),
        }
    }
}

/// Static registry entry mapping a backend kind to its configuration and
/// constructor. Construction happens here and nowhere else, so the set of
/// backends is closed and exhaustively testable.
#[derive(Debug, Clone)]
pub enum SourceSpec {
    Http(HttpConfig),
    File(FileConfig),
    CertStore(CertConfig),
    BlockDevice(DriveConfig),
}

impl SourceSpec {
    pub fn kind(&self) -> SourceKind {
        match self {
            SourceSpec::Http(_) => SourceKind::Http,
            SourceSpec::File(_) => SourceKind::File,
            SourceSpec::CertStore(_) => SourceKind::CertStore,
            SourceSpec::BlockDevice(_) => SourceKind::BlockDevice,
        }
    }

    /// Construct the concrete source this spec describes.
    ///
    /// # Errors
    ///
    /// Returns `QueryFailed` when the backend cannot be brought up at all,
    /// e.g. no configured HTTP host resolves.
    pub async fn build(&self) -> Result<Arc<dyn Source>, MetadataError> {
        match self {
            SourceSpec::Http(config) => {
                Ok(Arc::new(HttpSource::new(config.clone()).await?) as Arc<dyn Source>)
            }
            SourceSpec::File(config) => Ok(Arc::new(FileSource::new(config.clone()))),
            SourceSpec::CertStore(config) => Ok(Arc::new(CertSource::new(config.clone()))),
            SourceSpec::BlockDevice(config) => Ok(Arc::new(DriveSource::new(config.clone()))),
        }
    }
}
