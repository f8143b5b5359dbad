//! Fluent builder API for wiring an index loop.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use salesindex_core::IndexerConfig;
//! use salesindex_storage::InMemoryStorage;
//! use salesindex_stream::{IndexerBuilder, VecSource};
//!
//! # fn example(config: &IndexerConfig) -> Result<(), Box<dyn std::error::Error>> {
//! let index = IndexerBuilder::from_config(config)
//!     .checkpoint_interval(50)
//!     .storage(Arc::new(InMemoryStorage::new()))
//!     .build(VecSource::default())?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use salesindex_core::alert::{Alerter, TracingAlerter};
use salesindex_core::checkpoint::{CheckpointManager, CheckpointStore};
use salesindex_core::config::{ContractAddresses, IndexerConfig};
use salesindex_core::error::IndexerError;
use salesindex_core::router::{subscription, EventRouter};
use salesindex_core::store::DocumentStore;
use salesindex_core::types::EventFilter;

use crate::index_loop::{IndexLoop, LoopConfig};
use crate::source::BlockSource;

/// Fluent builder for [`IndexLoop`].
#[derive(Default)]
pub struct IndexerBuilder {
    config: LoopConfig,
    contracts: Option<ContractAddresses>,
    documents: Option<Arc<dyn DocumentStore>>,
    checkpoints: Option<Arc<dyn CheckpointStore>>,
    alerter: Option<Arc<dyn Alerter>>,
}

impl IndexerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a loaded config file (contracts plus `[apibara]` settings).
    pub fn from_config(config: &IndexerConfig) -> Self {
        Self {
            config: LoopConfig::from(&config.apibara),
            contracts: Some(config.contracts),
            ..Self::default()
        }
    }

    /// Set the indexer ID (used for checkpoint keys).
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.config.indexer_id = id.into();
        self
    }

    /// Set the network slug.
    pub fn network(mut self, network: impl Into<String>) -> Self {
        self.config.network = network.into();
        self
    }

    /// Set the start block.
    pub fn starting_block(mut self, block: u64) -> Self {
        self.config.starting_block = block;
        self
    }

    pub fn reset_state(mut self, reset: bool) -> Self {
        self.config.reset_state = reset;
        self
    }

    /// Set checkpoint save interval (every N blocks).
    pub fn checkpoint_interval(mut self, n: u64) -> Self {
        self.config.checkpoint_interval = n;
        self
    }

    pub fn contracts(mut self, contracts: ContractAddresses) -> Self {
        self.contracts = Some(contracts);
        self
    }

    /// Use one backend for both documents and checkpoints.
    pub fn storage<T>(mut self, storage: Arc<T>) -> Self
    where
        T: DocumentStore + CheckpointStore + 'static,
    {
        self.documents = Some(storage.clone() as Arc<dyn DocumentStore>);
        self.checkpoints = Some(storage as Arc<dyn CheckpointStore>);
        self
    }

    pub fn documents(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.documents = Some(store);
        self
    }

    pub fn checkpoints(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoints = Some(store);
        self
    }

    /// Sink for sale notifications. Defaults to [`TracingAlerter`].
    pub fn alerter(mut self, alerter: Arc<dyn Alerter>) -> Self {
        self.alerter = Some(alerter);
        self
    }

    /// Build the `LoopConfig`.
    pub fn build_config(&self) -> LoopConfig {
        self.config.clone()
    }

    /// Stream subscription for the configured contracts.
    pub fn filter(&self) -> Result<EventFilter, IndexerError> {
        let contracts = self.require_contracts()?;
        Ok(subscription(&contracts, self.config.starting_block))
    }

    /// Wire the router and checkpoint manager around `source`.
    pub fn build<S: BlockSource>(self, source: S) -> Result<IndexLoop<S>, IndexerError> {
        let contracts = self.require_contracts()?;
        let documents = self
            .documents
            .ok_or_else(|| IndexerError::Config("no document store configured".into()))?;
        let checkpoints = self
            .checkpoints
            .ok_or_else(|| IndexerError::Config("no checkpoint store configured".into()))?;
        let alerter = self
            .alerter
            .unwrap_or_else(|| Arc::new(TracingAlerter) as Arc<dyn Alerter>);

        let router = EventRouter::new(&contracts, documents.clone(), alerter);
        let checkpoint = CheckpointManager::new(
            checkpoints,
            &self.config.network,
            &self.config.indexer_id,
            self.config.checkpoint_interval,
        );
        Ok(IndexLoop::new(self.config, source, router, documents, checkpoint))
    }

    fn require_contracts(&self) -> Result<ContractAddresses, IndexerError> {
        self.contracts
            .ok_or_else(|| IndexerError::Config("contract addresses not set".into()))
    }
}
