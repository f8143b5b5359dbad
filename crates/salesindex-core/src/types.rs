//! Shared types for the indexing pipeline.

use alloy_primitives::U256;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A Starknet field element. Felts are below 2^252, so a `U256` holds any of them.
pub type Felt = U256;

// ─── Felt helpers ─────────────────────────────────────────────────────────────

/// Join a Cairo `u256` split into two 128-bit limbs: `low + high * 2^128`.
///
/// Bits of `high` above 128 fall off the top.
pub fn u256_from_halves(low: Felt, high: Felt) -> Felt {
    (high << 128usize).wrapping_add(low)
}

/// Convert a felt holding a unix timestamp to `i64`, saturating at `i64::MAX`.
pub fn felt_to_i64(value: Felt) -> i64 {
    if value > U256::from(i64::MAX as u64) {
        i64::MAX
    } else {
        value.as_limbs()[0] as i64
    }
}

/// Lossy conversion of a felt to `f64`, used for human-readable amounts.
pub fn felt_to_f64(value: Felt) -> f64 {
    value
        .as_limbs()
        .iter()
        .rev()
        .fold(0.0, |acc, &limb| acc * 18_446_744_073_709_551_616.0 + limb as f64)
}

// ─── Blocks and events ────────────────────────────────────────────────────────

/// Header fields of a block the handlers care about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Block number.
    pub number: u64,
    /// Block hash (`0x…`).
    pub hash: String,
    /// Unix timestamp of the block (seconds since epoch).
    pub timestamp: i64,
}

impl BlockHeader {
    /// The block timestamp as a UTC datetime.
    pub fn datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.timestamp, 0).unwrap_or_default()
    }
}

/// A raw Starknet event as delivered by the stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StarknetEvent {
    /// Contract that emitted the event.
    pub from_address: Felt,
    /// Event keys; `keys[0]` is the event selector.
    pub keys: Vec<Felt>,
    /// Event payload.
    pub data: Vec<Felt>,
    /// Hash of the transaction that emitted the event.
    #[serde(default)]
    pub tx_hash: String,
}

impl StarknetEvent {
    /// The event selector, if the event has any keys.
    pub fn selector(&self) -> Option<Felt> {
        self.keys.first().copied()
    }
}

/// One block of filtered events, in the order the stream delivered them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    #[serde(default)]
    pub events: Vec<StarknetEvent>,
}

// ─── EventFilter ─────────────────────────────────────────────────────────────

/// One `(contract, selector)` pair the indexer subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSelector {
    pub from_address: Felt,
    pub key: Felt,
}

/// Static subscription handed to the stream collaborator at startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventFilter {
    /// Events to deliver; an event matches when both address and `keys[0]` match.
    pub events: Vec<EventSelector>,
    /// First block to deliver (inclusive).
    pub from_block: u64,
}

impl EventFilter {
    /// Add a `(contract, selector)` pair.
    pub fn with_event(mut self, from_address: Felt, key: Felt) -> Self {
        self.events.push(EventSelector { from_address, key });
        self
    }

    /// Set the start block.
    pub fn from_block(mut self, block: u64) -> Self {
        self.from_block = block;
        self
    }

    /// Returns `true` if `event` matches one of the subscribed pairs.
    pub fn matches(&self, event: &StarknetEvent) -> bool {
        let Some(key) = event.selector() else {
            return false;
        };
        self.events
            .iter()
            .any(|s| s.from_address == event.from_address && s.key == key)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
