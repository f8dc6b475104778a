//! Explicit record deduplication.
//!
//! Harvests do not deduplicate unless asked to. When they are, the policy
//! decides what identifies a record.

use std::collections::HashSet;

use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// What makes two records "the same".
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupPolicy {
    /// Keep every record, duplicates included.
    #[default]
    None,
    /// Records with equal values at this top-level field are duplicates.
    /// Records without the field are always kept.
    ByKey(String),
    /// Records with identical JSON content are duplicates.
    ByContent,
}

impl DedupPolicy {
    pub fn deduplicator(&self) -> Deduplicator {
        Deduplicator {
            policy: self.clone(),
            seen: HashSet::new(),
        }
    }
}

/// Seen-set for one harvest.
#[derive(Debug, Clone)]
pub struct Deduplicator {
    policy: DedupPolicy,
    seen: HashSet<String>,
}

impl Deduplicator {
    /// Returns true if `record` should be kept, remembering it.
    pub fn admit(&mut self, record: &Value) -> bool {
        match self.key(record) {
            Some(key) => self.seen.insert(key),
            None => true,
        }
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    fn key(&self, record: &Value) -> Option<String> {
        match &self.policy {
            DedupPolicy::None => None,
            // JSON rendering keeps "7" and 7 apart.
            DedupPolicy::ByKey(field) => record.get(field).map(Value::to_string),
            DedupPolicy::ByContent => Some(content_hash(record)),
        }
    }
}

/// SHA-256 of the canonical compact JSON rendering (object keys sorted), hex-encoded.
pub fn content_hash(record: &Value) -> String {
    let mut canonical = String::new();
    write_canonical(record, &mut canonical);

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_none_admits_everything() {
        let mut d = DedupPolicy::None.deduplicator();
        assert!(d.admit(&json!({"id": 1})));
        assert!(d.admit(&json!({"id": 1})));
        assert_eq!(d.seen_count(), 0);
    }

    #[test]
    fn test_by_key_string_and_number_ids() {
        let mut d = DedupPolicy::ByKey("id".to_string()).deduplicator();
        assert!(d.admit(&json!({"id": "7"})));
        assert!(!d.admit(&json!({"id": "7", "text": "changed"})));
        assert!(d.admit(&json!({"id": 8})));
        assert!(!d.admit(&json!({"id": 8})));
    }

    #[test]
    fn test_by_key_distinguishes_value_types() {
        let mut d = DedupPolicy::ByKey("id".to_string()).deduplicator();
        assert!(d.admit(&json!({"id": "7"})));
        assert!(d.admit(&json!({"id": 7})));
        assert!(!d.admit(&json!({"id": 7})));
        assert_eq!(d.seen_count(), 2);
    }

    #[test]
    fn test_by_key_missing_field_admitted() {
        let mut d = DedupPolicy::ByKey("id".to_string()).deduplicator();
        assert!(d.admit(&json!({"text": "x"})));
        assert!(d.admit(&json!({"text": "x"})));
    }

    #[test]
    fn test_by_content() {
        let mut d = DedupPolicy::ByContent.deduplicator();
        assert!(d.admit(&json!({"a": 1, "b": 2})));
        assert!(!d.admit(&json!({"b": 2, "a": 1})));
        assert!(d.admit(&json!({"a": 1, "b": 3})));
    }

    #[test]
    fn test_content_hash_is_hex_sha256() {
        let h = content_hash(&json!({}));
        assert_eq!(h.len(), 64);
        assert_eq!(
            h,
            "44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a"
        );
    }
}
