//! Alerting boundary.

/// Fire-and-forget sink for operator-facing messages.
pub trait Alerter: Send + Sync {
    fn info(&self, message: &str);
    fn warning(&self, message: &str);
}

/// Alerter that only writes to the local `tracing` subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAlerter;

impl Alerter for TracingAlerter {
    fn info(&self, message: &str) {
        tracing::info!(target: "alert", "{message}");
    }

    fn warning(&self, message: &str) {
        tracing::warn!(target: "alert", "{message}");
    }
}
