//! The index loop: pulls blocks from a source, routes their events and
//! checkpoints progress.
//!
//! # Startup
//! 1. `reset_state` → drop stored documents and the checkpoint.
//! 2. Resume right after the checkpoint, or at `starting_block`.
//! 3. Invalidate writes past the resume point (blocks processed but never
//!    checkpointed are replayed).
//!
//! # Per block
//! `begin_block` → dispatch every event → record checkpoint.
//!
//! The loop ends when the source is exhausted.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use salesindex_core::checkpoint::CheckpointManager;
use salesindex_core::config::StreamSettings;
use salesindex_core::context::SaleContext;
use salesindex_core::error::IndexerError;
use salesindex_core::router::EventRouter;
use salesindex_core::store::DocumentStore;

use crate::source::BlockSource;

/// Loop settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopConfig {
    /// Unique name for this indexer (used for checkpoint keys).
    pub indexer_id: String,
    /// Network slug (e.g. `"starknet-mainnet"`).
    pub network: String,
    /// First block to index.
    pub starting_block: u64,
    /// Drop stored state before starting.
    pub reset_state: bool,
    /// How often to save a checkpoint (every N blocks).
    pub checkpoint_interval: u64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            indexer_id: "sales".into(),
            network: "starknet-mainnet".into(),
            starting_block: 0,
            reset_state: false,
            checkpoint_interval: 1,
        }
    }
}

impl From<&StreamSettings> for LoopConfig {
    fn from(s: &StreamSettings) -> Self {
        Self {
            indexer_id: s.indexer_id.clone(),
            network: s.network.clone(),
            starting_block: s.starting_block,
            reset_state: s.reset_state,
            checkpoint_interval: s.checkpoint_interval,
        }
    }
}

/// Runtime state of the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexerState {
    /// Not yet started.
    Idle,
    /// Consuming blocks.
    Indexing,
    /// Source exhausted, checkpoint flushed.
    Stopped,
    /// Aborted by an error.
    Error,
}

impl std::fmt::Display for IndexerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Indexing => write!(f, "indexing"),
            Self::Stopped => write!(f, "stopped"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Totals for one run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoopSummary {
    /// First block the run accepted.
    pub resumed_from: u64,
    pub blocks: u64,
    /// Blocks at or before the checkpoint that were ignored.
    pub replayed: u64,
    pub events: u64,
    pub skipped_events: u64,
    pub sales: u64,
    pub last_block: Option<u64>,
}

/// The core index loop.
pub struct IndexLoop<S: BlockSource> {
    config: LoopConfig,
    source: S,
    router: EventRouter,
    store: Arc<dyn DocumentStore>,
    checkpoint: CheckpointManager,
    ctx: SaleContext,
    state: IndexerState,
}

impl<S: BlockSource> IndexLoop<S> {
    pub fn new(
        config: LoopConfig,
        source: S,
        router: EventRouter,
        store: Arc<dyn DocumentStore>,
        checkpoint: CheckpointManager,
    ) -> Self {
        Self {
            config,
            source,
            router,
            store,
            checkpoint,
            ctx: SaleContext::new(),
            state: IndexerState::Idle,
        }
    }

    pub fn state(&self) -> IndexerState {
        self.state
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// Run until the source is exhausted or an error aborts the loop.
    pub async fn run(&mut self) -> Result<LoopSummary, IndexerError> {
        self.state = IndexerState::Indexing;
        match self.drive().await {
            Ok(summary) => {
                self.state = IndexerState::Stopped;
                Ok(summary)
            }
            Err(e) => {
                self.state = IndexerState::Error;
                Err(e)
            }
        }
    }

    async fn drive(&mut self) -> Result<LoopSummary, IndexerError> {
        if self.config.reset_state {
            tracing::warn!(indexer = %self.config.indexer_id, "resetting stored state");
            self.store.reset().await?;
            self.checkpoint.reset().await?;
        }

        let next = self.checkpoint.resume_from(self.config.starting_block).await?;
        if let Some(after) = next.checked_sub(1) {
            self.store.invalidate(after).await?;
        }

        tracing::info!(
            indexer = %self.config.indexer_id,
            network = %self.config.network,
            from = next,
            "starting index loop"
        );

        let mut summary = LoopSummary {
            resumed_from: next,
            ..Default::default()
        };

        while let Some(block) = self.source.next_block().await? {
            let number = block.header.number;
            if number < next {
                tracing::debug!(block = number, "already indexed, skipping");
                summary.replayed += 1;
                continue;
            }

            self.store.begin_block(number).await?;
            let report = self.router.process_block(&block, &mut self.ctx).await?;
            self.checkpoint.record(&block.header).await?;

            summary.blocks += 1;
            summary.events += report.dispatched as u64;
            summary.skipped_events += report.skipped as u64;
            summary.sales += report.sales.len() as u64;
            summary.last_block = Some(number);

            tracing::debug!(
                block = number,
                dispatched = report.dispatched,
                skipped = report.skipped,
                sales = report.sales.len(),
                "block processed"
            );
        }

        self.checkpoint.flush().await?;
        tracing::info!(
            blocks = summary.blocks,
            sales = summary.sales,
            last = ?summary.last_block,
            "stream exhausted"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::VecSource;
    use salesindex_core::selector::selector;
    use salesindex_core::store::{valid_from, Document};
    use salesindex_core::types::{Block, BlockHeader, Felt, StarknetEvent};
    use salesindex_core::{CheckpointStore, ContractAddresses, TracingAlerter};
    use salesindex_storage::InMemoryStorage;

    const T0: i64 = 1_700_000_000;
    const YEAR: u64 = 365 * 86_400;

    fn contracts() -> ContractAddresses {
        ContractAddresses {
            naming: Felt::from(0x11u64),
            eth: Felt::from(0x22u64),
            renewal: Felt::from(0x33u64),
            referral: Felt::from(0x44u64),
        }
    }

    fn update(label: u64, expiry: u64) -> StarknetEvent {
        StarknetEvent {
            from_address: contracts().naming,
            keys: vec![selector("starknet_id_update")],
            data: vec![
                Felt::from(1u64),
                Felt::from(label),
                Felt::from(0xb0bu64),
                Felt::from(expiry),
            ],
            tx_hash: String::new(),
        }
    }

    fn block(number: u64, events: Vec<StarknetEvent>) -> Block {
        Block {
            header: BlockHeader {
                number,
                hash: format!("0x{number:x}"),
                timestamp: T0 + number as i64,
            },
            events,
        }
    }

    fn make_loop(
        storage: &Arc<InMemoryStorage>,
        config: LoopConfig,
        blocks: Vec<Block>,
    ) -> IndexLoop<VecSource> {
        let router = EventRouter::new(&contracts(), storage.clone(), Arc::new(TracingAlerter));
        let checkpoint = CheckpointManager::new(
            storage.clone(),
            &config.network,
            &config.indexer_id,
            config.checkpoint_interval,
        );
        IndexLoop::new(config, VecSource::new(blocks), router, storage.clone(), checkpoint)
    }

    fn expiries(storage: &InMemoryStorage) -> Vec<(Option<u64>, serde_json::Value)> {
        storage
            .active_documents("domains")
            .iter()
            .map(|d: &Document| (valid_from(d), d["expiry"].clone()))
            .collect()
    }

    #[tokio::test]
    async fn processes_blocks_and_checkpoints() {
        let storage = Arc::new(InMemoryStorage::new());
        let config = LoopConfig {
            starting_block: 10,
            ..Default::default()
        };
        let mut index = make_loop(
            &storage,
            config,
            vec![
                block(10, vec![update(38, T0 as u64 + YEAR)]),
                block(11, vec![]),
                block(12, vec![update(38, T0 as u64 + 2 * YEAR)]),
            ],
        );

        let summary = index.run().await.unwrap();
        assert_eq!(index.state(), IndexerState::Stopped);
        assert_eq!(summary.blocks, 3);
        assert_eq!(summary.sales, 2);
        assert_eq!(summary.last_block, Some(12));

        let sales = storage.active_documents("sales");
        assert_eq!(sales[0]["type"], "purchase");
        assert_eq!(sales[1]["type"], "renewal");
        assert_eq!(sales[1]["duration"], YEAR as i64);
        assert_eq!(expiries(&storage), vec![(Some(12), serde_json::json!(T0 as u64 + 2 * YEAR))]);

        let cp = storage.load("starknet-mainnet", "sales").await.unwrap().unwrap();
        assert_eq!(cp.block_number, 12);
    }

    #[tokio::test]
    async fn restart_skips_indexed_blocks() {
        let storage = Arc::new(InMemoryStorage::new());
        let blocks = vec![
            block(1, vec![update(38, T0 as u64 + YEAR)]),
            block(2, vec![update(38, T0 as u64 + 2 * YEAR)]),
        ];

        make_loop(&storage, LoopConfig::default(), blocks.clone())
            .run()
            .await
            .unwrap();

        let mut again = make_loop(&storage, LoopConfig::default(), blocks);
        let summary = again.run().await.unwrap();
        assert_eq!(summary.resumed_from, 3);
        assert_eq!(summary.replayed, 2);
        assert_eq!(summary.blocks, 0);
        assert_eq!(storage.active_documents("sales").len(), 2);
    }

    #[tokio::test]
    async fn uncheckpointed_blocks_are_replayed_cleanly() {
        let storage = Arc::new(InMemoryStorage::new());
        let config = LoopConfig {
            starting_block: 1,
            ..Default::default()
        };
        let blocks = vec![
            block(1, vec![update(38, T0 as u64 + YEAR)]),
            block(2, vec![update(38, T0 as u64 + 2 * YEAR)]),
        ];

        // first run writes both blocks but its checkpoint lands elsewhere
        let router = EventRouter::new(&contracts(), storage.clone(), Arc::new(TracingAlerter));
        let elsewhere = CheckpointManager::new(
            Arc::new(InMemoryStorage::new()),
            "starknet-mainnet",
            "sales",
            1,
        );
        IndexLoop::new(
            config.clone(),
            VecSource::new(blocks.clone()),
            router,
            storage.clone(),
            elsewhere,
        )
        .run()
        .await
        .unwrap();
        assert_eq!(storage.active_documents("sales").len(), 2);

        // second run starts over and discards the first run's writes
        make_loop(&storage, config, blocks).run().await.unwrap();
        let sales = storage.active_documents("sales");
        assert_eq!(sales.len(), 2);
        assert_eq!(sales[0]["type"], "purchase");
        assert_eq!(storage.active_documents("domains").len(), 1);
    }

    #[tokio::test]
    async fn reset_state_starts_from_scratch() {
        let storage = Arc::new(InMemoryStorage::new());
        let blocks = vec![block(1, vec![update(38, T0 as u64 + YEAR)])];
        make_loop(&storage, LoopConfig::default(), blocks.clone())
            .run()
            .await
            .unwrap();

        let config = LoopConfig {
            reset_state: true,
            ..Default::default()
        };
        let summary = make_loop(&storage, config, blocks).run().await.unwrap();
        assert_eq!(summary.resumed_from, 0);
        assert_eq!(summary.blocks, 1);
        assert_eq!(storage.active_documents("sales").len(), 1);
        assert_eq!(storage.active_documents("sales")[0]["type"], "purchase");
    }

    #[tokio::test]
    async fn storage_failure_sets_error_state() {
        struct Broken;

        #[async_trait::async_trait]
        impl DocumentStore for Broken {
            async fn find_one_and_update(
                &self,
                _: &str,
                _: &Document,
                _: &Document,
            ) -> Result<Option<Document>, IndexerError> {
                Err(IndexerError::Storage("connection lost".into()))
            }

            async fn insert_one(&self, _: &str, _: Document) -> Result<(), IndexerError> {
                Ok(())
            }
        }

        let store: Arc<dyn DocumentStore> = Arc::new(Broken);
        let checkpoints = Arc::new(InMemoryStorage::new());
        let router = EventRouter::new(&contracts(), store.clone(), Arc::new(TracingAlerter));
        let mut index = IndexLoop::new(
            LoopConfig::default(),
            VecSource::new(vec![block(1, vec![update(38, T0 as u64)])]),
            router,
            store,
            CheckpointManager::new(checkpoints, "starknet-mainnet", "sales", 1),
        );

        let err = index.run().await.unwrap_err();
        assert_eq!(err.kind(), "Storage");
        assert_eq!(index.state(), IndexerState::Error);
    }
}
