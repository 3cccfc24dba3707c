//! Index key derivation strategies.

use std::fmt::Debug;

use super::Value;

/// Derives the index key for a field value.
///
/// The same indexer is used to maintain a field's index and to search it, so a
/// lookup matches exactly the rows whose stored value maps to the same key.
/// Returning `None` leaves the value out of the index.
pub trait FieldIndexer: Send + Sync + Debug {
    fn key(&self, value: &Value) -> Option<String>;
}

/// Default indexer: the value's normalized string. Nulls are not indexed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizedIndexer;

impl FieldIndexer for NormalizedIndexer {
    fn key(&self, value: &Value) -> Option<String> {
        match value {
            Value::Null => None,
            other => Some(other.normalized()),
        }
    }
}

/// Indexes strings case-insensitively (e.g. e-mail addresses).
#[derive(Debug, Clone, Copy, Default)]
pub struct CaseInsensitiveIndexer;

impl FieldIndexer for CaseInsensitiveIndexer {
    fn key(&self, value: &Value) -> Option<String> {
        NormalizedIndexer.key(value).map(|k| k.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_indexer_skips_null() {
        assert_eq!(NormalizedIndexer.key(&Value::Null), None);
        assert_eq!(NormalizedIndexer.key(&Value::Int(7)), Some("7".to_string()));
    }

    #[test]
    fn test_case_insensitive_indexer() {
        let a = CaseInsensitiveIndexer.key(&Value::from("Alice@Example.com"));
        let b = CaseInsensitiveIndexer.key(&Value::from("alice@example.COM"));
        assert_eq!(a, b);
    }
}
