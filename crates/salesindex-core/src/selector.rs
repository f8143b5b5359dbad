//! Starknet selectors.

use alloy_primitives::{keccak256, U256};

use crate::types::Felt;

/// `starknet_keccak`: keccak-256 truncated to its low 250 bits.
pub fn starknet_keccak(data: &[u8]) -> Felt {
    let mask = U256::MAX >> 6usize;
    U256::from_be_bytes(keccak256(data).0) & mask
}

/// Selector of an event or entry point, computed from its name.
pub fn selector(name: &str) -> Felt {
    starknet_keccak(name.as_bytes())
}
