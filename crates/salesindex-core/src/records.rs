//! Durable records written by the correlator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::IndexerError;
use crate::store::Document;
use crate::types::{felt_to_f64, Felt};

/// Collection holding one active [`DomainRecord`] per label.
pub const DOMAINS_COLLECTION: &str = "domains";
/// Collection holding [`SaleRecord`]s.
pub const SALES_COLLECTION: &str = "sales";

const SECONDS_PER_DAY: f64 = 86_400.0;
const WEI_PER_ETH: f64 = 1e18;

/// Ownership state of a domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainRecord {
    /// Full domain, e.g. `"ben.stark"`.
    pub domain: String,
    /// Expiry timestamp (seconds).
    pub expiry: i64,
    /// Timestamp of the block in which the domain was first seen.
    pub creation_date: DateTime<Utc>,
}

/// Whether a sale bought a fresh domain or extended an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaleType {
    Purchase,
    Renewal,
}

impl std::fmt::Display for SaleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Purchase => write!(f, "purchase"),
            Self::Renewal => write!(f, "renewal"),
        }
    }
}

/// One classified sale. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleRecord {
    pub domain: String,
    #[serde(rename = "type")]
    pub sale_type: SaleType,
    #[serde(with = "decimal")]
    pub price: Felt,
    /// Block timestamp (seconds).
    pub timestamp: i64,
    /// Seconds bought. Negative when on-chain expiry went backwards.
    pub duration: i64,
    pub auto: bool,
    pub sponsor: Felt,
    #[serde(with = "decimal")]
    pub sponsor_comm: Felt,
}

impl SaleRecord {
    pub fn duration_days(&self) -> f64 {
        self.duration as f64 / SECONDS_PER_DAY
    }

    pub fn price_eth(&self) -> f64 {
        felt_to_f64(self.price) / WEI_PER_ETH
    }
}

/// Serialize a record into a store document.
pub fn to_document<T: Serialize>(record: &T) -> Result<Document, IndexerError> {
    match serde_json::to_value(record) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(other) => Err(IndexerError::Other(format!(
            "record serialized to non-object JSON: {other}"
        ))),
        Err(e) => Err(IndexerError::Other(e.to_string())),
    }
}

/// Amounts are stored as decimal strings; JSON numbers cannot hold 256 bits.
mod decimal {
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};
    use std::str::FromStr;

    use crate::types::Felt;

    pub fn serialize<S: Serializer>(value: &Felt, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Felt, D::Error> {
        let raw = String::deserialize(d)?;
        Felt::from_str(&raw).map_err(D::Error::custom)
    }
}
