//! Document store boundary.
//!
//! The correlator needs exactly two primitives from storage: an atomic
//! find-and-update returning the prior document, and an unconditional insert.
//! Documents are JSON objects; versioned stores keep a `_chain` sub-document
//! with `valid_from` / `valid_to` block numbers, and the active version of a
//! record is the one whose `valid_to` is `null`.

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::error::IndexerError;

/// A stored document.
pub type Document = Map<String, Value>;

/// Sub-document holding the validity range of a versioned document.
pub const CHAIN_FIELD: &str = "_chain";
/// Dotted path of the active-version marker.
pub const VALID_TO_PATH: &str = "_chain.valid_to";

/// Storage collaborator used by the correlator.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Called before the first write of a block. Versioned stores use it to
    /// stamp `_chain.valid_from`.
    async fn begin_block(&self, _block_number: u64) -> Result<(), IndexerError> {
        Ok(())
    }

    /// Atomically apply `update` to the first document in `collection`
    /// matching `filter`, returning the document as it was before the update.
    /// Returns `None` and writes nothing when no document matches.
    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: &Document,
        update: &Document,
    ) -> Result<Option<Document>, IndexerError>;

    /// Insert a new document.
    async fn insert_one(&self, collection: &str, document: Document) -> Result<(), IndexerError>;

    /// Discard every write made after `after_block`. Non-versioned stores
    /// cannot do this and keep the default no-op.
    async fn invalidate(&self, _after_block: u64) -> Result<(), IndexerError> {
        Ok(())
    }

    /// Drop every stored document (used when the indexer restarts from scratch).
    async fn reset(&self) -> Result<(), IndexerError> {
        Ok(())
    }
}

// ─── Filter / update helpers ─────────────────────────────────────────────────

/// Filter selecting the active version of the domain record for `domain`.
pub fn active_domain_filter(domain: &str) -> Document {
    let mut filter = Document::new();
    filter.insert("domain".into(), Value::String(domain.to_string()));
    filter.insert(VALID_TO_PATH.into(), Value::Null);
    filter
}

/// Build a `{"$set": fields}` update.
pub fn set_update(fields: Document) -> Document {
    let mut update = Document::new();
    update.insert("$set".into(), Value::Object(fields));
    update
}

/// Resolve a dotted path such as `"_chain.valid_to"`.
pub fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Equality match on every filter entry. A `null` filter value also matches a
/// missing field.
pub fn matches_filter(doc: &Document, filter: &Document) -> bool {
    filter.iter().all(|(path, expected)| match lookup(doc, path) {
        Some(actual) => actual == expected,
        None => expected.is_null(),
    })
}

/// Apply an update document. Only `$set` with top-level fields is supported.
pub fn apply_update(doc: &mut Document, update: &Document) -> Result<(), IndexerError> {
    for (operator, fields) in update {
        match (operator.as_str(), fields) {
            ("$set", Value::Object(fields)) => {
                for (key, value) in fields {
                    doc.insert(key.clone(), value.clone());
                }
            }
            (op, _) => {
                return Err(IndexerError::Storage(format!(
                    "unsupported update operator '{op}'"
                )))
            }
        }
    }
    Ok(())
}

// ─── Version helpers ─────────────────────────────────────────────────────────

/// Mark `doc` as the active version starting at `block_number`.
pub fn open_version(doc: &mut Document, block_number: u64) {
    doc.insert(
        CHAIN_FIELD.into(),
        json!({ "valid_from": block_number, "valid_to": null }),
    );
}

/// Close the validity range of `doc` at `block_number`.
pub fn close_version(doc: &mut Document, block_number: u64) {
    match doc.get_mut(CHAIN_FIELD).and_then(Value::as_object_mut) {
        Some(chain) => {
            chain.insert("valid_to".into(), json!(block_number));
        }
        None => {
            doc.insert(
                CHAIN_FIELD.into(),
                json!({ "valid_from": null, "valid_to": block_number }),
            );
        }
    }
}

/// Block at which this version became valid.
pub fn valid_from(doc: &Document) -> Option<u64> {
    lookup(doc, "_chain.valid_from").and_then(Value::as_u64)
}

/// Block at which this version stopped being valid, `None` while active.
pub fn valid_to(doc: &Document) -> Option<u64> {
    lookup(doc, VALID_TO_PATH).and_then(Value::as_u64)
}
