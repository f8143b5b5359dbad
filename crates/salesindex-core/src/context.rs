//! In-flight sale attribution.

use crate::types::Felt;

/// Facts observed before the domain update that closes a sale.
///
/// Owned by exactly one block-processing run and passed by `&mut` into every
/// handler. Never shared between concurrent runs and never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaleContext {
    /// Amount of the last payment sent to the naming contract.
    pub last_amount: Felt,
    /// Payer of that payment.
    pub last_buyer: Felt,
    /// Set once a renewal contract event was seen.
    pub auto_renew: bool,
    /// Commission paid to the referrer.
    pub sponsor_commission: Felt,
    /// Referrer address, zero when there is none.
    pub sponsor_address: Felt,
}

impl SaleContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Back to the zero state.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Returns `true` if no contributing event has been recorded.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_clears_everything() {
        let mut ctx = SaleContext {
            last_amount: Felt::from(10u64),
            last_buyer: Felt::from(1u64),
            auto_renew: true,
            sponsor_commission: Felt::from(2u64),
            sponsor_address: Felt::from(3u64),
        };
        assert!(!ctx.is_empty());
        ctx.reset();
        assert!(ctx.is_empty());
        assert_eq!(ctx, SaleContext::new());
    }
}
