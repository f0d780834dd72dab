//! Flattening of nested metadata into a prefixed environment-style
//! namespace.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use serde_json::Value;

use crate::node::MetadataNode;

/// Flat, single-level metadata: normalized key to scalar JSON value.
pub type FlatMetadata = IndexMap<String, Value>;

/// Flattens a nested mapping into `PREFIX_PATH_SEGMENTS = value` entries.
///
/// Path segments are upper-cased with non-alphanumeric characters normalized
/// to `_` and joined with `_`. Sequences emit one entry per index
/// (`_0`, `_1`, …). Empty collections are skipped; empty string leaves are
/// kept, so "present but empty" stays distinguishable from "absent".
#[derive(Debug, Clone)]
pub struct MetadataFormatter {
    default_prefix: String,
    recognized_prefixes: BTreeSet<String>,
}

impl MetadataFormatter {
    /// Formatter with a default prefix, which is also the sole recognized
    /// prefix.
    pub fn new(default_prefix: &str) -> Self {
        let mut recognized = BTreeSet::new();
        recognized.insert(default_prefix.to_string());
        Self {
            default_prefix: default_prefix.to_string(),
            recognized_prefixes: recognized,
        }
    }

    /// Extend the recognized-prefix set. A key already carrying a
    /// recognized prefix is emitted unprefixed, so re-exported values are
    /// not double-prefixed.
    pub fn recognize_prefix(mut self, prefix: &str) -> Self {
        self.recognized_prefixes.insert(prefix.to_string());
        self
    }

    /// Flatten a nested JSON value.
    pub fn format(&self, value: &Value) -> FlatMetadata {
        let mut out = FlatMetadata::new();
        self.walk("", value, &mut out);
        out
    }

    /// Flatten a climbed metadata tree.
    pub fn format_node(&self, node: &MetadataNode) -> FlatMetadata {
        self.format(&node.to_value())
    }

    fn walk(&self, key: &str, value: &Value, out: &mut FlatMetadata) {
        match value {
            Value::Object(map) => {
                for (child_key, child) in map {
                    self.walk(&join_key(key, &normalize_segment(child_key)), child, out);
                }
            }
            Value::Array(items) => {
                for (index, item) in items.iter().enumerate() {
                    self.walk(&format!("{}_{}", key, index), item, out);
                }
            }
            scalar => {
                out.insert(self.apply_prefix(key), scalar.clone());
            }
        }
    }

    fn apply_prefix(&self, key: &str) -> String {
        if self.recognized_prefixes.iter().any(|p| key.starts_with(p.as_str())) {
            key.to_string()
        } else {
            format!("{}{}", self.default_prefix, key)
        }
    }
}

/// Uppercase a path segment, normalizing non-alphanumerics to `_`.
fn normalize_segment(seg: &str) -> String {
    seg.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

fn join_key(base: &str, seg: &str) -> String {
    if base.is_empty() {
        seg.to_string()
    } else {
        format!("{}_{}", base, seg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reference_flattening() {
        let input = json!({
            "ABC": ["easy", 123],
            "simple": "do re mi",
            "abc_123": {"baby": ["you", "me", "girl"]}
        });
        let flat = MetadataFormatter::new("RS_").format(&input);

        let expected: Vec<(&str, Value)> = vec![
            ("RS_ABC_0", json!("easy")),
            ("RS_ABC_1", json!(123)),
            ("RS_SIMPLE", json!("do re mi")),
            ("RS_ABC_123_BABY_0", json!("you")),
            ("RS_ABC_123_BABY_1", json!("me")),
            ("RS_ABC_123_BABY_2", json!("girl")),
        ];
        assert_eq!(flat.len(), expected.len());
        for (key, value) in expected {
            assert_eq!(flat.get(key), Some(&value), "key {}", key);
        }
    }

    #[test]
    fn test_empty_collections_skipped_empty_strings_kept() {
        let input = json!({
            "nothing": {},
            "nobody": [],
            "blank": ""
        });
        let flat = MetadataFormatter::new("RS_").format(&input);
        assert_eq!(flat.len(), 1);
        assert_eq!(flat.get("RS_BLANK"), Some(&json!("")));
    }

    #[test]
    fn test_recognized_prefix_not_doubled() {
        let input = json!({"RS_EXPORTED": "v", "plain": "w"});
        let flat = MetadataFormatter::new("RS_").format(&input);
        assert_eq!(flat.get("RS_EXPORTED"), Some(&json!("v")));
        assert_eq!(flat.get("RS_PLAIN"), Some(&json!("w")));
    }

    #[test]
    fn test_foreign_recognized_prefix() {
        let input = json!({"EC2_REGION": "dfw", "host": "web01"});
        let flat = MetadataFormatter::new("RS_").recognize_prefix("EC2_").format(&input);
        assert_eq!(flat.get("EC2_REGION"), Some(&json!("dfw")));
        assert_eq!(flat.get("RS_HOST"), Some(&json!("web01")));
    }

    #[test]
    fn test_alias_display_key_normalization() {
        let input = json!({"public-keys": {"0/windows_image_build_key": "ssh-rsa AAAA"}});
        let flat = MetadataFormatter::new("RS_").format(&input);
        assert_eq!(
            flat.get("RS_PUBLIC_KEYS_0_WINDOWS_IMAGE_BUILD_KEY"),
            Some(&json!("ssh-rsa AAAA"))
        );
    }

    #[test]
    fn test_format_node_flattens_tree() {
        let tree = MetadataNode::from_query_string("host=web01&region=dfw");
        let flat = MetadataFormatter::new("RS_").format_node(&tree);
        assert_eq!(flat.get("RS_HOST"), Some(&json!("web01")));
        assert_eq!(flat.get("RS_REGION"), Some(&json!("dfw")));
    }
}
