//! Sale correlator: the four event handlers.
//!
//! Referral, renewal and payment events only record facts in the
//! [`SaleContext`]. The domain update that closes the transaction reads those
//! facts back, upserts the domain record, classifies the sale and writes it.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info};

use crate::alert::Alerter;
use crate::codec::decode_domain;
use crate::context::SaleContext;
use crate::error::IndexerError;
use crate::records::{
    to_document, DomainRecord, SaleRecord, SaleType, DOMAINS_COLLECTION, SALES_COLLECTION,
};
use crate::router::EventKind;
use crate::store::{active_domain_filter, set_update, DocumentStore};
use crate::types::{felt_to_i64, u256_from_halves, BlockHeader, Felt};

/// Applies events to a [`SaleContext`] and the document store.
pub struct Correlator {
    store: Arc<dyn DocumentStore>,
    alerter: Arc<dyn Alerter>,
    naming_contract: Felt,
}

/// Read `data[index]` or report which field is missing.
fn field(kind: EventKind, data: &[Felt], index: usize) -> Result<Felt, IndexerError> {
    data.get(index).copied().ok_or_else(|| IndexerError::MalformedEvent {
        event: kind.event_name().to_string(),
        reason: format!("expected at least {} data felts, got {}", index + 1, data.len()),
    })
}

impl Correlator {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        alerter: Arc<dyn Alerter>,
        naming_contract: Felt,
    ) -> Self {
        Self {
            store,
            alerter,
            naming_contract,
        }
    }

    /// Run the handler for `kind`. Returns the sale when one was written.
    pub async fn handle(
        &self,
        kind: EventKind,
        data: &[Felt],
        header: &BlockHeader,
        ctx: &mut SaleContext,
    ) -> Result<Option<SaleRecord>, IndexerError> {
        match kind {
            EventKind::Referral => self.on_referral(ctx, data).map(|_| None),
            EventKind::AutoRenew => {
                self.on_auto_renew(ctx, data);
                Ok(None)
            }
            EventKind::FundsSent => self.on_funds_sent(ctx, data).map(|_| None),
            EventKind::DomainUpdate => self.on_domain_update(ctx, data, header).await,
        }
    }

    /// `on_commission(…, amount.low, amount.high, sponsor)`.
    pub fn on_referral(&self, ctx: &mut SaleContext, data: &[Felt]) -> Result<(), IndexerError> {
        let kind = EventKind::Referral;
        let low = field(kind, data, 1)?;
        let high = field(kind, data, 2)?;
        let sponsor = field(kind, data, 3)?;
        ctx.sponsor_commission = u256_from_halves(low, high);
        ctx.sponsor_address = sponsor;
        Ok(())
    }

    pub fn on_auto_renew(&self, ctx: &mut SaleContext, _data: &[Felt]) {
        ctx.auto_renew = true;
    }

    /// `Transfer(from, to, amount.low, amount.high)`; only payments to the
    /// naming contract count.
    pub fn on_funds_sent(&self, ctx: &mut SaleContext, data: &[Felt]) -> Result<(), IndexerError> {
        let kind = EventKind::FundsSent;
        let to = field(kind, data, 1)?;
        if to != self.naming_contract {
            return Ok(());
        }
        let from = field(kind, data, 0)?;
        let low = field(kind, data, 2)?;
        let high = field(kind, data, 3)?;
        ctx.last_buyer = from;
        ctx.last_amount = u256_from_halves(low, high);
        Ok(())
    }

    /// `starknet_id_update(domain_len, domain…, owner, expiry)`.
    ///
    /// Multi-label domains are dropped without touching the context.
    pub async fn on_domain_update(
        &self,
        ctx: &mut SaleContext,
        data: &[Felt],
        header: &BlockHeader,
    ) -> Result<Option<SaleRecord>, IndexerError> {
        let kind = EventKind::DomainUpdate;
        let arr_len = field(kind, data, 0)?;
        if arr_len != Felt::from(1u64) {
            debug!(%arr_len, block = header.number, "skipping multi-label domain update");
            return Ok(None);
        }

        let domain = decode_domain(&[field(kind, data, 1)?]);
        let owner = field(kind, data, 2)?;
        let expiry = felt_to_i64(field(kind, data, 3)?);

        let mut fields = crate::store::Document::new();
        fields.insert("domain".into(), Value::String(domain.clone()));
        fields.insert("expiry".into(), json!(expiry));

        let existing = self
            .store
            .find_one_and_update(
                DOMAINS_COLLECTION,
                &active_domain_filter(&domain),
                &set_update(fields),
            )
            .await?;

        let (sale_type, duration) = match existing {
            Some(prior) => {
                let prior_expiry = prior.get("expiry").and_then(Value::as_i64).ok_or_else(|| {
                    IndexerError::Storage(format!("domain document '{domain}' has no expiry"))
                })?;
                (SaleType::Renewal, expiry.saturating_sub(prior_expiry))
            }
            None => {
                let record = DomainRecord {
                    domain: domain.clone(),
                    expiry,
                    creation_date: header.datetime(),
                };
                self.store
                    .insert_one(DOMAINS_COLLECTION, to_document(&record)?)
                    .await?;
                (SaleType::Purchase, expiry.saturating_sub(header.timestamp))
            }
        };

        let sale = SaleRecord {
            domain,
            sale_type,
            price: ctx.last_amount,
            timestamp: header.timestamp,
            duration,
            auto: ctx.auto_renew,
            sponsor: ctx.sponsor_address,
            sponsor_comm: ctx.sponsor_commission,
        };
        self.store
            .insert_one(SALES_COLLECTION, to_document(&sale)?)
            .await?;
        ctx.reset();

        let days = sale.duration_days();
        let eth = sale.price_eth();
        info!(
            sale_type = %sale.sale_type,
            domain = %sale.domain,
            %owner,
            days,
            eth,
            block = header.number,
            "sale indexed"
        );
        // float formatting keeps the ".0" of whole values
        self.alerter.info(&format!(
            "{}: {}, {:?}d for {:?} eth",
            sale.sale_type, sale.domain, days, eth
        ));

        Ok(Some(sale))
    }
}
