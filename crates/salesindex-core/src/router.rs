//! Event routing: maps `(contract, selector)` to one of the four handlers and
//! dispatches a block's events strictly in delivery order.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::alert::Alerter;
use crate::config::ContractAddresses;
use crate::context::SaleContext;
use crate::correlator::Correlator;
use crate::error::IndexerError;
use crate::records::SaleRecord;
use crate::selector::selector;
use crate::store::DocumentStore;
use crate::types::{Block, EventFilter, Felt, StarknetEvent};

/// The events the indexer reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// `on_commission` on the referral contract.
    Referral,
    /// `domain_renewed` on the renewal contract.
    AutoRenew,
    /// `Transfer` on the payment token.
    FundsSent,
    /// `starknet_id_update` on the naming contract.
    DomainUpdate,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        Self::Referral,
        Self::AutoRenew,
        Self::FundsSent,
        Self::DomainUpdate,
    ];

    /// Cairo event name, hashed into the selector.
    pub fn event_name(self) -> &'static str {
        match self {
            Self::Referral => "on_commission",
            Self::AutoRenew => "domain_renewed",
            Self::FundsSent => "Transfer",
            Self::DomainUpdate => "starknet_id_update",
        }
    }

    /// Contract expected to emit this event.
    pub fn contract(self, contracts: &ContractAddresses) -> Felt {
        match self {
            Self::Referral => contracts.referral,
            Self::AutoRenew => contracts.renewal,
            Self::FundsSent => contracts.eth,
            Self::DomainUpdate => contracts.naming,
        }
    }
}

/// The four `(contract, selector)` pairs, in [`EventKind::ALL`] order.
pub fn subscription(contracts: &ContractAddresses, from_block: u64) -> EventFilter {
    EventKind::ALL
        .into_iter()
        .fold(EventFilter::default().from_block(from_block), |f, kind| {
            f.with_event(kind.contract(contracts), selector(kind.event_name()))
        })
}

/// Outcome of looking an event up in the signature map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Handler(EventKind),
    Unrecognized,
}

/// Per-block processing summary.
#[derive(Debug, Default, Clone)]
pub struct BlockReport {
    pub block_number: u64,
    /// Events routed to a handler.
    pub dispatched: usize,
    /// Unrecognized or malformed events.
    pub skipped: usize,
    /// Sales written during the block, in order.
    pub sales: Vec<SaleRecord>,
}

/// Signature map plus the handlers it dispatches to.
pub struct EventRouter {
    contracts: ContractAddresses,
    routes: HashMap<(Felt, Felt), EventKind>,
    correlator: Correlator,
}

impl EventRouter {
    /// Resolve the four `(contract, event name)` pairs into selectors.
    pub fn new(
        contracts: &ContractAddresses,
        store: Arc<dyn DocumentStore>,
        alerter: Arc<dyn Alerter>,
    ) -> Self {
        let routes = EventKind::ALL
            .into_iter()
            .map(|kind| ((kind.contract(contracts), selector(kind.event_name())), kind))
            .collect();
        Self {
            contracts: *contracts,
            routes,
            correlator: Correlator::new(store, alerter, contracts.naming),
        }
    }

    /// The stream subscription matching this router, starting at `from_block`.
    pub fn filter(&self, from_block: u64) -> EventFilter {
        subscription(&self.contracts, from_block)
    }

    pub fn route(&self, event: &StarknetEvent) -> Route {
        event
            .selector()
            .and_then(|key| self.routes.get(&(event.from_address, key)))
            .map_or(Route::Unrecognized, |&kind| Route::Handler(kind))
    }

    /// Dispatch every event of `block` in order, awaiting each handler before
    /// the next. Storage errors abort the block.
    pub async fn process_block(
        &self,
        block: &Block,
        ctx: &mut SaleContext,
    ) -> Result<BlockReport, IndexerError> {
        let mut report = BlockReport {
            block_number: block.header.number,
            ..Default::default()
        };

        for event in &block.events {
            let kind = match self.route(event) {
                Route::Handler(kind) => kind,
                Route::Unrecognized => {
                    debug!(
                        block = block.header.number,
                        tx = %event.tx_hash,
                        from = %event.from_address,
                        "no handler for event"
                    );
                    report.skipped += 1;
                    continue;
                }
            };

            match self
                .correlator
                .handle(kind, &event.data, &block.header, ctx)
                .await
            {
                Ok(sale) => {
                    report.dispatched += 1;
                    report.sales.extend(sale);
                }
                Err(e) if e.is_malformed() => {
                    warn!(block = block.header.number, tx = %event.tx_hash, error = %e, "skipping event");
                    report.skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(report)
    }
}
