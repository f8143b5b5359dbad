//! salesindex-stream — block sources, the index loop and the builder API.

pub mod builder;
pub mod index_loop;
pub mod source;

pub use builder::IndexerBuilder;
pub use index_loop::{IndexLoop, IndexerState, LoopConfig, LoopSummary};
pub use source::{BlockSource, JsonLinesSource, VecSource};
