//! In-memory storage backend.
//!
//! Keeps versioned documents and checkpoints in RAM. Every write closes the
//! previous version of a document and opens a new one stamped with the
//! current block, so the data survives a `rollback_after` the same way a
//! persistent store would. All data is lost when the process exits.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use salesindex_core::checkpoint::{Checkpoint, CheckpointStore};
use salesindex_core::error::IndexerError;
use salesindex_core::store::{
    apply_update, close_version, matches_filter, open_version, valid_from, valid_to, Document,
    DocumentStore,
};

/// In-memory document + checkpoint storage.
#[derive(Default)]
pub struct InMemoryStorage {
    collections: Mutex<HashMap<String, Vec<Document>>>,
    checkpoints: Mutex<HashMap<String, Checkpoint>>,
    current_block: AtomicU64,
}

fn guard<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored version in `collection`, oldest first.
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        guard(&self.collections)
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    /// Only the active versions in `collection`.
    pub fn active_documents(&self, collection: &str) -> Vec<Document> {
        self.documents(collection)
            .into_iter()
            .filter(|d| valid_to(d).is_none())
            .collect()
    }

    /// Undo every write made after `block_number` (reorg recovery).
    ///
    /// Versions opened later are deleted; versions closed later become active again.
    pub fn rollback_after(&self, block_number: u64) {
        let mut collections = guard(&self.collections);
        for docs in collections.values_mut() {
            docs.retain(|d| valid_from(d).map_or(true, |from| from <= block_number));
            for doc in docs.iter_mut() {
                if valid_to(doc).is_some_and(|to| to > block_number) {
                    if let Some(chain) = doc
                        .get_mut(salesindex_core::store::CHAIN_FIELD)
                        .and_then(serde_json::Value::as_object_mut)
                    {
                        chain.insert("valid_to".into(), serde_json::Value::Null);
                    }
                }
            }
        }
    }
}

#[async_trait]
impl DocumentStore for InMemoryStorage {
    async fn begin_block(&self, block_number: u64) -> Result<(), IndexerError> {
        self.current_block.store(block_number, Ordering::SeqCst);
        Ok(())
    }

    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: &Document,
        update: &Document,
    ) -> Result<Option<Document>, IndexerError> {
        let block = self.current_block.load(Ordering::SeqCst);
        let mut collections = guard(&self.collections);
        let docs = collections.entry(collection.to_string()).or_default();

        let Some(index) = docs.iter().position(|d| matches_filter(d, filter)) else {
            return Ok(None);
        };
        let prior = docs[index].clone();

        let mut next = prior.clone();
        apply_update(&mut next, update)?;
        open_version(&mut next, block);

        if valid_from(&prior) == Some(block) {
            // same block: overwrite instead of stacking versions
            docs[index] = next;
        } else {
            close_version(&mut docs[index], block);
            docs.push(next);
        }
        Ok(Some(prior))
    }

    async fn insert_one(&self, collection: &str, mut document: Document) -> Result<(), IndexerError> {
        open_version(&mut document, self.current_block.load(Ordering::SeqCst));
        guard(&self.collections)
            .entry(collection.to_string())
            .or_default()
            .push(document);
        Ok(())
    }

    async fn invalidate(&self, after_block: u64) -> Result<(), IndexerError> {
        self.rollback_after(after_block);
        Ok(())
    }

    async fn reset(&self) -> Result<(), IndexerError> {
        guard(&self.collections).clear();
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for InMemoryStorage {
    async fn load(
        &self,
        network: &str,
        indexer_id: &str,
    ) -> Result<Option<Checkpoint>, IndexerError> {
        let key = format!("{network}:{indexer_id}");
        Ok(guard(&self.checkpoints).get(&key).cloned())
    }

    async fn save(&self, checkpoint: Checkpoint) -> Result<(), IndexerError> {
        let key = format!("{}:{}", checkpoint.network, checkpoint.indexer_id);
        guard(&self.checkpoints).insert(key, checkpoint);
        Ok(())
    }

    async fn delete(&self, network: &str, indexer_id: &str) -> Result<(), IndexerError> {
        let key = format!("{network}:{indexer_id}");
        guard(&self.checkpoints).remove(&key);
        Ok(())
    }
}
