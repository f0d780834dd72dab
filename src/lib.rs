//! Instance-metadata acquisition pipeline.
//!
//! Discovers structured instance metadata (network addresses, instance
//! identifiers, user-supplied configuration blobs) from whatever mechanism
//! the platform exposes: an HTTP metadata service, injected files, a
//! certificate store, an attached config-drive volume, or several of these
//! chained in priority order. The result is re-serialized for later boot
//! stages.
//!
//! # Pipeline
//!
//! A [`Source`] answers path queries against one backend; a
//! [`SelectiveSource`] chains several under a merge policy; a
//! [`TreeClimber`] turns the hierarchical namespace into a
//! [`MetadataNode`] tree; a [`MetadataProvider`] drives one climb per
//! configured root; a [`MetadataFormatter`] flattens the tree into a
//! prefixed key/value namespace; writers persist it.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use instance_metadata::{
//!     DefaultPolicy, HttpConfig, MetadataError, MetadataFormatter, MetadataProvider,
//!     SelectiveSource, SourceSpec, TreeClimber,
//! };
//! use instance_metadata::write::{JsonWriter, MetadataWriter};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), MetadataError> {
//!     let source = Arc::new(SelectiveSource::from_specs(vec![SourceSpec::Http(
//!         HttpConfig::default(),
//!     )]));
//!     let provider = MetadataProvider::new(
//!         source,
//!         TreeClimber::new(Box::new(DefaultPolicy)),
//!         "latest/meta-data",
//!     );
//!
//!     let tree = provider.build_metadata().await?;
//!     let flat = MetadataFormatter::new("RS_").format_node(&tree);
//!     JsonWriter::new("/var/lib/instance-metadata", "metadata").write(&flat)?;
//!     provider.finish().await;
//!     Ok(())
//! }
//! ```

mod climb;
mod error;
mod format;
mod node;
mod provider;
pub mod source;
pub mod write;

pub use climb::{ClimbPolicy, DefaultPolicy, LeafPolicy, TreeClimber};
pub use error::MetadataError;
pub use format::{FlatMetadata, MetadataFormatter};
pub use node::{join_path, MetadataNode};
pub use provider::MetadataProvider;
pub use source::{
    CertConfig, CertSource, DriveConfig, DriveSource, FileConfig, FileSource, HttpConfig,
    HttpSource, Selection, SelectiveSource, Source, SourceKind, SourceSpec,
};
