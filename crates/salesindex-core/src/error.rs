//! Error types for the sales indexing pipeline.

use thiserror::Error;

/// Errors that can occur while indexing.
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Malformed '{event}' event: {reason}")]
    MalformedEvent { event: String, reason: String },

    #[error("Config error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl IndexerError {
    /// Returns `true` if the error only concerns a single event's payload.
    ///
    /// The router skips such events instead of aborting the block.
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::MalformedEvent { .. })
    }

    /// The variant name, without any payload.
    ///
    /// Alerts sent off-host carry only this, never the message itself.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Stream(_) => "Stream",
            Self::Storage(_) => "Storage",
            Self::MalformedEvent { .. } => "MalformedEvent",
            Self::Config(_) => "Config",
            Self::Other(_) => "Other",
        }
    }
}
