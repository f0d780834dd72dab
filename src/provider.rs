//! Orchestration of one source and one climber into a `build_metadata` call.

use std::sync::Arc;

use crate::climb::TreeClimber;
use crate::error::MetadataError;
use crate::node::MetadataNode;
use crate::source::Source;
use crate::write::TreeWriter;

/// Drives a [`TreeClimber`] against a [`Source`] from a configured root
/// path. Two providers (cloud metadata, user metadata) typically share one
/// source by `Arc` but use different roots and climber policies.
pub struct MetadataProvider {
    source: Arc<dyn Source>,
    climber: TreeClimber,
    root_path: String,
    raw_capture: Option<TreeWriter>,
}

impl MetadataProvider {
    pub fn new(source: Arc<dyn Source>, climber: TreeClimber, root_path: &str) -> Self {
        Self {
            source,
            climber,
            root_path: root_path.to_string(),
            raw_capture: None,
        }
    }

    /// Mirror the unprocessed tree through this sink, one file per path,
    /// purely for diagnostics.
    pub fn with_raw_capture(mut self, sink: TreeWriter) -> Self {
        self.raw_capture = Some(sink);
        self
    }

    pub fn root_path(&self) -> &str {
        &self.root_path
    }

    /// Climb the configured root into a metadata tree.
    ///
    /// # Errors
    ///
    /// Propagates the source's `QueryFailed` untouched; retries, if any,
    /// belong to the source. Raw-capture failures are logged and never
    /// affect the returned tree.
    pub async fn build_metadata(&self) -> Result<MetadataNode, MetadataError> {
        let tree = self.climber.climb(self.source.as_ref(), &self.root_path).await?;

        if let Some(sink) = &self.raw_capture {
            if let Err(e) = sink.write_node(&tree) {
                tracing::warn!(root = %self.root_path, error = %e, "raw metadata capture failed");
            }
        }

        Ok(tree)
    }

    /// Finish the underlying source. Safe to call even when the source is
    /// shared; sources guard their own double-finish.
    pub async fn finish(&self) {
        self.source.finish().await;
    }
}
