//! salesindex-core — turns Starknet naming, payment, renewal and referral
//! events into domain and sale records.
//!
//! # Architecture
//!
//! ```text
//! Block ─→ EventRouter ──(address, selector)──→ Correlator
//!                                                 ├── SaleContext   (in-flight attribution)
//!                                                 ├── codec::decode (felt → label)
//!                                                 └── DocumentStore (domains / sales)
//! ```

pub mod alert;
pub mod checkpoint;
pub mod codec;
pub mod config;
pub mod context;
pub mod correlator;
pub mod error;
pub mod records;
pub mod router;
pub mod selector;
pub mod store;
pub mod types;

pub use alert::{Alerter, TracingAlerter};
pub use checkpoint::{Checkpoint, CheckpointManager, CheckpointStore};
pub use codec::{decode, decode_domain};
pub use config::{ContractAddresses, IndexerConfig, LogConfig};
pub use context::SaleContext;
pub use correlator::Correlator;
pub use error::IndexerError;
pub use records::{DomainRecord, SaleRecord, SaleType};
pub use router::{BlockReport, EventKind, EventRouter, Route};
pub use store::{Document, DocumentStore};
pub use types::{Block, BlockHeader, EventFilter, Felt, StarknetEvent};
