//! Backend-agnostic tree climbing.
//!
//! [`TreeClimber`] turns a root path plus a [`Source`] into a nested
//! [`MetadataNode`], deciding branch-vs-leaf and child enumeration through
//! an injected [`ClimbPolicy`]. Climbing is strictly depth-first and
//! sequential: metadata services are rate-sensitive and some backends care
//! about directory-vs-leaf query ordering.

use std::future::Future;
use std::pin::Pin;

use indexmap::IndexMap;

use crate::error::MetadataError;
use crate::node::{join_path, MetadataNode};
use crate::source::Source;

/// Branch/leaf policy bound to a climber instance.
pub trait ClimbPolicy: Send + Sync {
    /// Does the raw value at `path` denote a branch?
    fn has_children(&self, path: &str, raw: &str) -> bool;

    /// Child entry names from a branch's raw value.
    fn list_children(&self, path: &str, raw: &str) -> Vec<String>;

    /// Build a leaf from a raw value.
    fn make_leaf(&self, raw: &str) -> MetadataNode {
        MetadataNode::Leaf(raw.to_string())
    }
}

/// Default policy for hierarchical HTTP-style namespaces. A single entry
/// token with a trailing `/`, or a multi-line listing where every line is an
/// entry token, is a branch. `=` only appears in entries in the `idx=alias/`
/// listing form; a bare `key=value` line is file data, never a listing, so
/// injected cloud-metadata files climb as a single leaf instead of being
/// re-listed forever. Anything else is a leaf.
#[derive(Debug, Default)]
pub struct DefaultPolicy;

fn entry_token(token: &str) -> bool {
    !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
}

fn looks_like_entry(line: &str) -> bool {
    let token = line.trim_end_matches('/');
    match token.split_once('=') {
        // Alias entries always carry the trailing slash.
        Some((index, alias)) => line.ends_with('/') && entry_token(index) && entry_token(alias),
        None => entry_token(token),
    }
}

impl ClimbPolicy for DefaultPolicy {
    fn has_children(&self, _path: &str, raw: &str) -> bool {
        let lines: Vec<&str> = raw.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
        match lines.as_slice() {
            [] => false,
            [only] => only.ends_with('/') && looks_like_entry(only),
            many => many.iter().all(|l| looks_like_entry(l)),
        }
    }

    fn list_children(&self, _path: &str, raw: &str) -> Vec<String> {
        raw.lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect()
    }
}

/// Policy for flat, non-hierarchical domains (user data): everything is a
/// single leaf.
#[derive(Debug, Default)]
pub struct LeafPolicy;

impl ClimbPolicy for LeafPolicy {
    fn has_children(&self, _path: &str, _raw: &str) -> bool {
        false
    }

    fn list_children(&self, _path: &str, _raw: &str) -> Vec<String> {
        Vec::new()
    }
}

/// Recursive-descent climber over a [`Source`].
pub struct TreeClimber {
    policy: Box<dyn ClimbPolicy>,
}

impl TreeClimber {
    pub fn new(policy: Box<dyn ClimbPolicy>) -> Self {
        Self { policy }
    }

    /// Climb the namespace rooted at `path`.
    ///
    /// An empty root query yields an empty branch. No metadata available is
    /// a valid terminal state, not a source failure.
    ///
    /// # Errors
    ///
    /// Propagates `QueryFailed`/`ParseFailed` from the source untouched.
    pub async fn climb(
        &self,
        source: &dyn Source,
        path: &str,
    ) -> Result<MetadataNode, MetadataError> {
        let raw = source.query(path).await?;
        if raw.trim().is_empty() {
            return Ok(MetadataNode::empty());
        }
        self.descend(source, path, raw).await
    }

    fn descend<'a>(
        &'a self,
        source: &'a dyn Source,
        path: &'a str,
        raw: String,
    ) -> Pin<Box<dyn Future<Output = Result<MetadataNode, MetadataError>> + Send + 'a>> {
        Box::pin(async move {
            if !self.policy.has_children(path, &raw) {
                return Ok(self.policy.make_leaf(&raw));
            }

            let mut children = IndexMap::new();
            for entry in self.policy.list_children(path, &raw) {
                let name = entry.trim_end_matches('/');
                if name.is_empty() {
                    continue;
                }
                // An entry may carry a disambiguating alias after `=`
                // (index plus human-readable name). Navigate with the
                // index; keep the full name as the display key.
                let (nav, display) = match name.split_once('=') {
                    Some((index, alias)) => {
                        (index.to_string(), format!("{}/{}", index, alias))
                    }
                    None => (name.to_string(), name.to_string()),
                };

                let child_path = join_path(path, &nav);
                let child_raw = source.query(&child_path).await?;
                let child = self.descend(source, &child_path, child_raw).await?;
                children.insert(display, child);
            }
            Ok(MetadataNode::Branch(children))
        })
    }
}
