//! Stream position persistence.
//!
//! The correlator itself keeps no position. The index loop records the last
//! fully processed block here so a restarted process resumes right after it
//! instead of replaying from `starting_block`.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::IndexerError;
use crate::types::BlockHeader;

/// Last fully processed block of one indexer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Network slug (e.g. `"starknet-mainnet"`).
    pub network: String,
    pub indexer_id: String,
    pub block_number: u64,
    pub block_hash: String,
    /// Unix timestamp of when this checkpoint was saved.
    pub updated_at: i64,
}

/// Storage for checkpoints, implemented by every storage backend.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn load(&self, network: &str, indexer_id: &str)
        -> Result<Option<Checkpoint>, IndexerError>;

    /// Save (upsert) a checkpoint.
    async fn save(&self, checkpoint: Checkpoint) -> Result<(), IndexerError>;

    async fn delete(&self, network: &str, indexer_id: &str) -> Result<(), IndexerError>;
}

/// Checkpoint reads and interval-based writes for one indexer.
pub struct CheckpointManager {
    store: Arc<dyn CheckpointStore>,
    network: String,
    indexer_id: String,
    save_interval: u64,
    /// Blocks recorded since the last save.
    pending: u64,
    last: Option<BlockHeader>,
}

impl CheckpointManager {
    pub fn new(
        store: Arc<dyn CheckpointStore>,
        network: impl Into<String>,
        indexer_id: impl Into<String>,
        save_interval: u64,
    ) -> Self {
        Self {
            store,
            network: network.into(),
            indexer_id: indexer_id.into(),
            save_interval: save_interval.max(1),
            pending: 0,
            last: None,
        }
    }

    pub async fn load(&self) -> Result<Option<Checkpoint>, IndexerError> {
        self.store.load(&self.network, &self.indexer_id).await
    }

    /// First block to process: right after the checkpoint, or `starting_block`.
    pub async fn resume_from(&self, starting_block: u64) -> Result<u64, IndexerError> {
        Ok(match self.load().await? {
            Some(cp) => {
                tracing::info!(block = cp.block_number, hash = %cp.block_hash, "resuming from checkpoint");
                (cp.block_number + 1).max(starting_block)
            }
            None => starting_block,
        })
    }

    /// Forget the saved position.
    pub async fn reset(&mut self) -> Result<(), IndexerError> {
        self.pending = 0;
        self.last = None;
        self.store.delete(&self.network, &self.indexer_id).await
    }

    /// Note a processed block and save every `save_interval` blocks.
    pub async fn record(&mut self, header: &BlockHeader) -> Result<(), IndexerError> {
        self.last = Some(header.clone());
        self.pending += 1;
        if self.pending >= self.save_interval {
            self.flush().await?;
        }
        Ok(())
    }

    /// Save the most recently recorded block, if not saved yet.
    pub async fn flush(&mut self) -> Result<(), IndexerError> {
        if self.pending == 0 {
            return Ok(());
        }
        let Some(header) = &self.last else {
            return Ok(());
        };
        let cp = Checkpoint {
            network: self.network.clone(),
            indexer_id: self.indexer_id.clone(),
            block_number: header.number,
            block_hash: header.hash.clone(),
            updated_at: chrono::Utc::now().timestamp(),
        };
        self.store.save(cp).await?;
        self.pending = 0;
        Ok(())
    }
}
