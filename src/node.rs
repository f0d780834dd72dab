//! The canonical in-memory metadata tree and the wire-shape parsers that
//! normalize backend payloads into it.

use indexmap::IndexMap;
use serde_json::Value;

/// A node in the metadata tree produced by climbing a source.
///
/// Leaf values are raw, unescaped strings exactly as the source returned
/// them; any trimming is the source's responsibility.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataNode {
    /// Terminal value.
    Leaf(String),
    /// Named children, in discovery order.
    Branch(IndexMap<String, MetadataNode>),
}

impl MetadataNode {
    /// An empty branch, the canonical "no metadata available" value.
    pub fn empty() -> Self {
        MetadataNode::Branch(IndexMap::new())
    }

    /// Whether this node carries no leaf text and no child keys.
    pub fn is_empty(&self) -> bool {
        match self {
            MetadataNode::Leaf(s) => s.is_empty(),
            MetadataNode::Branch(children) => children.is_empty(),
        }
    }

    /// Look up a child by `/`-joined path. Returns `None` on a leaf or a
    /// missing key.
    pub fn get(&self, path: &str) -> Option<&MetadataNode> {
        let mut node = self;
        for seg in path.split('/').filter(|s| !s.is_empty()) {
            match node {
                MetadataNode::Branch(children) => node = children.get(seg)?,
                MetadataNode::Leaf(_) => return None,
            }
        }
        Some(node)
    }

    /// Parse an ampersand-delimited `key=value&key=value` blob (flat
    /// user-data shape) into a branch of leaves.
    pub fn from_query_string(raw: &str) -> Self {
        let mut children = IndexMap::new();
        for pair in raw.split('&').filter(|p| !p.trim().is_empty()) {
            let (key, value) = match pair.split_once('=') {
                Some((k, v)) => (k, v),
                None => (pair, ""),
            };
            children.insert(key.to_string(), MetadataNode::Leaf(value.to_string()));
        }
        MetadataNode::Branch(children)
    }

    /// Parse a newline-delimited `key=value` file body (cloud-metadata file
    /// shape) into a branch of leaves. Lines without `=` are skipped.
    pub fn from_kv_lines(raw: &str) -> Self {
        let mut children = IndexMap::new();
        for line in raw.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if let Some((key, value)) = line.split_once('=') {
                children.insert(key.to_string(), MetadataNode::Leaf(value.to_string()));
            }
        }
        MetadataNode::Branch(children)
    }

    /// Convert to a JSON value for formatting.
    ///
    /// A leaf whose text is itself a JSON array or object is parsed
    /// structurally (user-data blobs are frequently JSON); every other leaf
    /// stays a string.
    pub fn to_value(&self) -> Value {
        match self {
            MetadataNode::Leaf(s) => {
                let trimmed = s.trim_start();
                if trimmed.starts_with('[') || trimmed.starts_with('{') {
                    if let Ok(parsed) = serde_json::from_str::<Value>(s) {
                        return parsed;
                    }
                }
                Value::String(s.clone())
            }
            MetadataNode::Branch(children) => {
                let mut map = serde_json::Map::new();
                for (key, child) in children {
                    map.insert(key.clone(), child.to_value());
                }
                Value::Object(map)
            }
        }
    }
}

/// Join a base path and a segment with a single `/`.
pub fn join_path(base: &str, seg: &str) -> String {
    let base = base.trim_end_matches('/');
    if base.is_empty() {
        seg.to_string()
    } else {
        format!("{}/{}", base, seg)
    }
}
