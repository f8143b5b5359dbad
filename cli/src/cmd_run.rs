//! `salesindex run`: the supervised index loop.
//!
//! Storage is opened once. Each attempt reloads the config, builds a fresh
//! router, source and sale context, and resumes from the last checkpoint.
//! A failed attempt is logged in full locally, only its error kind goes to
//! the alerter, and the next attempt starts after an exponential backoff.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::{error, info, warn};

use salesindex_core::{
    Alerter, CheckpointStore, DocumentStore, IndexerConfig, IndexerError, TracingAlerter,
};
use salesindex_storage::InMemoryStorage;
use salesindex_stream::{IndexerBuilder, JsonLinesSource, LoopSummary};

use crate::watchtower::WatchtowerAlerter;

/// Document and checkpoint halves of one storage backend.
#[derive(Clone)]
struct Backend {
    documents: Arc<dyn DocumentStore>,
    checkpoints: Arc<dyn CheckpointStore>,
}

impl Backend {
    fn new<T: DocumentStore + CheckpointStore + 'static>(storage: Arc<T>) -> Self {
        Self {
            documents: storage.clone(),
            checkpoints: storage,
        }
    }
}

async fn open_storage(connection_string: &str) -> Result<Backend> {
    if connection_string == "memory" {
        warn!("using in-memory storage; nothing survives a process restart");
        return Ok(Backend::new(Arc::new(InMemoryStorage::new())));
    }
    if connection_string.starts_with("sqlite:") {
        return open_sqlite(connection_string).await;
    }
    bail!("unsupported connection string '{connection_string}' (expected 'memory' or 'sqlite:…')")
}

#[cfg(feature = "sqlite")]
async fn open_sqlite(url: &str) -> Result<Backend> {
    let storage = salesindex_storage::SqliteStorage::open(url)
        .await
        .with_context(|| format!("opening {url}"))?;
    Ok(Backend::new(Arc::new(storage)))
}

#[cfg(not(feature = "sqlite"))]
async fn open_sqlite(url: &str) -> Result<Backend> {
    bail!("{url}: this binary was built without the `sqlite` feature")
}

fn make_alerter(config: &IndexerConfig) -> Arc<dyn Alerter> {
    match &config.watchtower {
        Some(settings) => match WatchtowerAlerter::new(settings.clone()) {
            Ok(alerter) => Arc::new(alerter),
            Err(e) => {
                warn!(error = %e, "watchtower client unavailable, alerting locally");
                Arc::new(TracingAlerter)
            }
        },
        None => Arc::new(TracingAlerter),
    }
}

/// Delay before restart number `retry` (0-based): 500ms doubling, capped at 32s.
pub fn restart_delay(retry: u32) -> Duration {
    Duration::from_millis(500 * 2u64.pow(retry.min(6)))
}

async fn attempt(
    config: &IndexerConfig,
    backend: &Backend,
    alerter: Arc<dyn Alerter>,
    reset_state: bool,
) -> Result<LoopSummary, IndexerError> {
    let builder = IndexerBuilder::from_config(config)
        .reset_state(reset_state)
        .documents(backend.documents.clone())
        .checkpoints(backend.checkpoints.clone())
        .alerter(alerter);

    let source = JsonLinesSource::open(&config.apibara.apibara_stream)
        .await?
        .with_filter(builder.filter()?);
    let mut index = builder.build(source)?;
    index.run().await
}

/// Run until the stream is exhausted, restarting after every failure.
///
/// `max_restarts` bounds the number of restarts; `None` retries forever.
pub async fn run(
    mut config: IndexerConfig,
    config_path: &Path,
    template_path: &Path,
    max_restarts: Option<u32>,
) -> Result<()> {
    let backend = open_storage(&config.apibara.connection_string).await?;
    if !config.apibara.token.is_empty() {
        info!(stream = %config.apibara.apibara_stream, "stream token set; not used by file replay");
    }

    // reset applies to the first attempt only, restarts resume
    let mut reset_state = config.apibara.reset_state;
    let mut retry = 0u32;

    loop {
        let alerter = make_alerter(&config);
        alerter.info("starting sales indexer");

        match attempt(&config, &backend, alerter.clone(), reset_state).await {
            Ok(summary) => {
                info!(
                    blocks = summary.blocks,
                    sales = summary.sales,
                    last_block = ?summary.last_block,
                    "indexer finished"
                );
                return Ok(());
            }
            Err(e) => {
                error!(error = %e, kind = e.kind(), "indexer failed");
                alerter.warning(&format!("warning: {} detected, restarting", e.kind()));

                if max_restarts.is_some_and(|max| retry >= max) {
                    return Err(e).context("restart limit reached");
                }
            }
        }

        let delay = restart_delay(retry);
        warn!(retry, delay_ms = delay.as_millis() as u64, "restarting");
        tokio::time::sleep(delay).await;
        retry += 1;
        reset_state = false;

        match IndexerConfig::load(config_path, template_path) {
            Ok(fresh) => config = fresh,
            Err(e) => warn!(error = %e, "config reload failed, keeping previous config"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_doubles_then_caps() {
        assert_eq!(restart_delay(0), Duration::from_millis(500));
        assert_eq!(restart_delay(1), Duration::from_millis(1_000));
        assert_eq!(restart_delay(6), Duration::from_millis(32_000));
        assert_eq!(restart_delay(40), Duration::from_millis(32_000));
    }

    #[tokio::test]
    async fn unknown_connection_string_is_rejected() {
        assert!(open_storage("mongodb://localhost:27017").await.is_err());
        assert!(open_storage("memory").await.is_ok());
    }

    const CONFIG: &str = r#"
        [contracts]
        naming = "0x11"
        eth = "0x22"
        renewal = "0x33"
        referral = "0x44"

        [apibara]
        indexer_id = "sales"
        connection_string = "memory"
        apibara_stream = "STREAM"
    "#;

    #[tokio::test]
    async fn missing_stream_exhausts_restarts() {
        let dir = std::env::temp_dir().join("salesindex-run-test");
        let path = dir.join("config.toml");
        let stream = dir.join("absent.jsonl");
        let config = IndexerConfig::from_toml_str(
            &CONFIG.replace("STREAM", &stream.display().to_string()),
        )
        .unwrap();

        let err = run(config, &path, &path, Some(0)).await.unwrap_err();
        assert!(format!("{err:#}").contains("restart limit reached"));
    }
}
