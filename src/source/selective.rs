//! Selective (composite) metadata source.
//!
//! Chains an ordered list of backends behind the [`Source`] interface.
//! Backends are built lazily. A later entry is never constructed if an
//! earlier one already satisfied the selection policy. The policy sees
//! each per-path result and decides whether to keep going and what the
//! merged value is so far.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;

use crate::error::MetadataError;
use crate::source::{Source, SourceKind, SourceSpec};

/// Future returned by a deferred source constructor.
pub type BuildFuture = Pin<Box<dyn Future<Output = Result<Arc<dyn Source>, MetadataError>> + Send>>;

/// Deferred source constructor, run at most once on first need.
pub type SourceBuilder = Box<dyn Fn() -> BuildFuture + Send + Sync>;

/// Decision returned by a selection policy after each backend's result.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    /// Keep querying later backends?
    pub proceed: bool,
    /// The merged result so far.
    pub merged: String,
}

/// Selection policy: `(path, source kind, this result, merged so far)` to a
/// [`Selection`]. A `QueryFailed` from one backend arrives as the `Err` arm
/// and must not abort the chain unless the policy says so.
pub type SelectPolicy = Box<
    dyn Fn(&str, SourceKind, Result<&str, &MetadataError>, &str) -> Selection + Send + Sync,
>;

/// Stop at the first backend returning a non-empty (after trimming) result;
/// errors and empty results fall through with the merged value unchanged.
pub fn first_non_empty_policy() -> SelectPolicy {
    Box::new(|_path, _kind, result, merged| match result {
        Ok(raw) if !raw.trim().is_empty() => Selection {
            proceed: false,
            merged: raw.to_string(),
        },
        _ => Selection {
            proceed: true,
            merged: merged.to_string(),
        },
    })
}

struct Entry {
    kind: SourceKind,
    builder: SourceBuilder,
    built: OnceCell<Arc<dyn Source>>,
}

/// Composite source trying each backend in order under a selection policy.
pub struct SelectiveSource {
    entries: Vec<Entry>,
    policy: SelectPolicy,
    finished: AtomicBool,
}

impl SelectiveSource {
    /// Empty chain with the default first-non-empty policy.
    pub fn new() -> Self {
        Self::with_policy(first_non_empty_policy())
    }

    /// Empty chain with a caller-supplied policy.
    pub fn with_policy(policy: SelectPolicy) -> Self {
        Self {
            entries: Vec::new(),
            policy,
            finished: AtomicBool::new(false),
        }
    }

    /// Chain over registry specs with the default policy.
    pub fn from_specs(specs: Vec<SourceSpec>) -> Self {
        let mut chain = Self::new();
        for spec in specs {
            chain.push_spec(spec);
        }
        chain
    }

    /// Append a backend described by a registry spec.
    pub fn push_spec(&mut self, spec: SourceSpec) {
        let kind = spec.kind();
        self.push_builder(
            kind,
            Box::new(move || {
                let spec = spec.clone();
                Box::pin(async move { spec.build().await })
            }),
        );
    }

    /// Append a backend with an explicit deferred constructor.
    pub fn push_builder(&mut self, kind: SourceKind, builder: SourceBuilder) {
        self.entries.push(Entry {
            kind,
            builder,
            built: OnceCell::new(),
        });
    }

    /// Append an already-constructed backend (test doubles, shared sources).
    pub fn push_source(&mut self, kind: SourceKind, source: Arc<dyn Source>) {
        self.entries.push(Entry {
            kind,
            builder: Box::new(|| {
                Box::pin(async { Err(MetadataError::QueryFailed("source consumed".into())) })
            }),
            built: OnceCell::new_with(Some(source)),
        });
    }
}

impl Default for SelectiveSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Source for SelectiveSource {
    async fn query(&self, path: &str) -> Result<String, MetadataError> {
        let mut merged = String::new();

        for entry in &self.entries {
            let outcome = match entry.built.get_or_try_init(|| (entry.builder)()).await {
                Ok(source) => source.query(path).await,
                Err(e) => {
                    tracing::warn!(kind = %entry.kind, error = %e, "backend construction failed");
                    Err(e)
                }
            };
            if let Err(e) = &outcome {
                tracing::debug!(path = %path, kind = %entry.kind, error = %e, "backend result discarded");
            }

            let decision = (self.policy)(
                path,
                entry.kind,
                outcome.as_ref().map(String::as_str),
                &merged,
            );
            merged = decision.merged;
            if !decision.proceed {
                tracing::debug!(path = %path, kind = %entry.kind, "selection policy satisfied");
                return Ok(merged);
            }
        }

        Ok(merged)
    }

    async fn finish(&self) {
        if self.finished.swap(true, Ordering::SeqCst) {
            return;
        }
        for entry in &self.entries {
            if let Some(source) = entry.built.get() {
                source.finish().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    /// Fixed-response test double; `None` means every query fails.
    struct StaticSource {
        value: Option<String>,
        queries: AtomicUsize,
        finishes: AtomicUsize,
    }

    impl StaticSource {
        fn new(value: Option<&str>) -> Arc<Self> {
            Arc::new(Self {
                value: value.map(String::from),
                queries: AtomicUsize::new(0),
                finishes: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Source for StaticSource {
        async fn query(&self, _path: &str) -> Result<String, MetadataError> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            match &self.value {
                Some(v) => Ok(v.clone()),
                None => Err(MetadataError::QueryFailed("static failure".into())),
            }
        }

        async fn finish(&self) {
            self.finishes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn counting_builder(
        value: Option<&'static str>,
        count: Arc<AtomicUsize>,
    ) -> SourceBuilder {
        Box::new(move || {
            let count = count.clone();
            Box::pin(async move {
                count.fetch_add(1, Ordering::SeqCst);
                Ok(StaticSource::new(value) as Arc<dyn Source>)
            })
        })
    }

    #[tokio::test]
    async fn test_stops_at_first_non_empty() {
        let built_a = Arc::new(AtomicUsize::new(0));
        let built_b = Arc::new(AtomicUsize::new(0));

        let mut chain = SelectiveSource::new();
        chain.push_builder(SourceKind::Http, counting_builder(Some("value-a"), built_a.clone()));
        chain.push_builder(SourceKind::File, counting_builder(Some("value-b"), built_b.clone()));

        assert_eq!(chain.query("meta-data").await.unwrap(), "value-a");
        assert_eq!(built_a.load(Ordering::SeqCst), 1);
        // The second backend was never constructed.
        assert_eq!(built_b.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_builder_runs_once_across_queries() {
        let built = Arc::new(AtomicUsize::new(0));
        let mut chain = SelectiveSource::new();
        chain.push_builder(SourceKind::Http, counting_builder(Some("v"), built.clone()));

        chain.query("a").await.unwrap();
        chain.query("b").await.unwrap();
        assert_eq!(built.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_query_failed_falls_through() {
        let mut chain = SelectiveSource::new();
        chain.push_source(SourceKind::Http, StaticSource::new(None));
        chain.push_source(SourceKind::File, StaticSource::new(Some("fallback")));

        assert_eq!(chain.query("meta-data").await.unwrap(), "fallback");
    }

    #[tokio::test]
    async fn test_empty_falls_through() {
        let mut chain = SelectiveSource::new();
        chain.push_source(SourceKind::Http, StaticSource::new(Some("  \n")));
        chain.push_source(SourceKind::File, StaticSource::new(Some("real")));

        assert_eq!(chain.query("meta-data").await.unwrap(), "real");
    }

    #[tokio::test]
    async fn test_exhausted_chain_is_empty_success() {
        let mut chain = SelectiveSource::new();
        chain.push_source(SourceKind::Http, StaticSource::new(None));
        chain.push_source(SourceKind::File, StaticSource::new(Some("")));

        assert_eq!(chain.query("meta-data").await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_custom_merge_policy() {
        // Keep merging key=value fragments until one contains the required
        // key, then stop.
        let policy: SelectPolicy = Box::new(|_path, _kind, result, merged| {
            let mut merged = merged.to_string();
            if let Ok(raw) = result {
                if !raw.is_empty() {
                    if !merged.is_empty() {
                        merged.push('\n');
                    }
                    merged.push_str(raw);
                }
            }
            let proceed = !merged.contains("region=");
            Selection { proceed, merged }
        });

        let mut chain = SelectiveSource::with_policy(policy);
        chain.push_source(SourceKind::CertStore, StaticSource::new(Some("host=web01")));
        chain.push_source(SourceKind::File, StaticSource::new(Some("region=dfw")));
        chain.push_source(SourceKind::Http, StaticSource::new(Some("unreached=1")));

        assert_eq!(
            chain.query("meta-data").await.unwrap(),
            "host=web01\nregion=dfw"
        );
    }

    #[tokio::test]
    async fn test_finish_is_idempotent_and_only_touches_built() {
        let first = StaticSource::new(Some("v"));
        let built_b = Arc::new(AtomicUsize::new(0));

        let mut chain = SelectiveSource::new();
        chain.push_source(SourceKind::Http, first.clone());
        chain.push_builder(SourceKind::File, counting_builder(Some("x"), built_b.clone()));

        chain.query("meta-data").await.unwrap();
        chain.finish().await;
        chain.finish().await;

        assert_eq!(first.finishes.load(Ordering::SeqCst), 1);
        assert_eq!(built_b.load(Ordering::SeqCst), 0);
    }
}
