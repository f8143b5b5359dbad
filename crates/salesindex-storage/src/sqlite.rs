//! SQLite storage backend.
//!
//! Persists versioned documents and checkpoints to a single SQLite file.
//! Each document row carries its JSON body plus the `valid_from` / `valid_to`
//! block range mirrored out of `_chain`, so rollbacks are plain SQL. The
//! document's `domain` is mirrored into an indexed `key` column so a domain
//! update touches one row, not the whole collection.
//!
//! # Usage
//! ```rust,no_run
//! use salesindex_storage::sqlite::SqliteStorage;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteStorage::open("./sales.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteStorage::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use salesindex_core::checkpoint::{Checkpoint, CheckpointStore};
use salesindex_core::error::IndexerError;
use salesindex_core::records::DOMAINS_COLLECTION;
use salesindex_core::store::{
    apply_update, close_version, lookup, matches_filter, open_version, valid_from, Document,
    DocumentStore, VALID_TO_PATH,
};

/// Top-level field mirrored into the `key` column.
const KEY_FIELD: &str = "domain";

fn storage_err(e: impl std::fmt::Display) -> IndexerError {
    IndexerError::Storage(e.to_string())
}

/// The `key` column value of a document or filter.
fn document_key(doc: &Document) -> Option<&str> {
    lookup(doc, KEY_FIELD).and_then(serde_json::Value::as_str)
}

/// SQLite-backed document + checkpoint storage.
pub struct SqliteStorage {
    pool: SqlitePool,
    current_block: AtomicU64,
}

impl SqliteStorage {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./sales.db"`) or a full
    /// SQLite URL (`"sqlite:./sales.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, IndexerError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let pool = SqlitePool::connect(&url).await.map_err(storage_err)?;
        Self::with_pool(pool).await
    }

    /// Open an in-memory SQLite database.
    ///
    /// All data is lost when the pool is dropped.
    pub async fn in_memory() -> Result<Self, IndexerError> {
        // every connection to :memory: is a separate database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(storage_err)?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self, IndexerError> {
        let storage = Self {
            pool,
            current_block: AtomicU64::new(0),
        };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Create tables and enable WAL mode.
    async fn init_schema(&self) -> Result<(), IndexerError> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS checkpoints (
                network      TEXT    NOT NULL,
                indexer_id   TEXT    NOT NULL,
                block_number INTEGER NOT NULL,
                block_hash   TEXT    NOT NULL,
                updated_at   INTEGER NOT NULL,
                PRIMARY KEY (network, indexer_id)
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS documents (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                collection TEXT    NOT NULL,
                body       TEXT    NOT NULL,
                valid_from INTEGER NOT NULL,
                valid_to   INTEGER,
                key        TEXT
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        self.add_key_column().await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_documents_active
             ON documents (collection, valid_to);",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_documents_key
             ON documents (collection, key, valid_to);",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        // at most one active version per domain
        sqlx::query(&format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_documents_active_domain
             ON documents (collection, key)
             WHERE valid_to IS NULL AND collection = '{DOMAINS_COLLECTION}';"
        ))
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(())
    }

    /// Add and backfill `key` on databases created before the column existed.
    async fn add_key_column(&self) -> Result<(), IndexerError> {
        let columns = sqlx::query("PRAGMA table_info(documents);")
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;
        if columns.iter().any(|c| c.get::<String, _>("name") == "key") {
            return Ok(());
        }

        sqlx::query("ALTER TABLE documents ADD COLUMN key TEXT;")
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        let filled = sqlx::query(&format!(
            "UPDATE documents SET key = json_extract(body, '$.{KEY_FIELD}');"
        ))
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        debug!(rows = filled.rows_affected(), "backfilled document keys");
        Ok(())
    }

    // ─── Queries ─────────────────────────────────────────────────────────────────

    /// Every stored version in `collection`, oldest first.
    pub async fn documents(&self, collection: &str) -> Result<Vec<Document>, IndexerError> {
        let rows = sqlx::query("SELECT body FROM documents WHERE collection = ? ORDER BY id")
            .bind(collection)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;
        rows.iter().map(|r| parse_body(r.get("body"))).collect()
    }

    /// Only the active versions in `collection`.
    pub async fn active_documents(&self, collection: &str) -> Result<Vec<Document>, IndexerError> {
        let rows = sqlx::query(
            "SELECT body FROM documents
             WHERE collection = ? AND valid_to IS NULL ORDER BY id",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;
        rows.iter().map(|r| parse_body(r.get("body"))).collect()
    }

    // ─── Reorg recovery ──────────────────────────────────────────────────────────

    /// Undo every write made after `block_number`.
    ///
    /// Versions opened later are deleted; versions closed later become active again.
    pub async fn rollback_after(&self, block_number: u64) -> Result<(), IndexerError> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;

        sqlx::query("DELETE FROM documents WHERE valid_from > ?")
            .bind(block_number as i64)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;

        let reopened = sqlx::query("SELECT id, body FROM documents WHERE valid_to > ?")
            .bind(block_number as i64)
            .fetch_all(&mut *tx)
            .await
            .map_err(storage_err)?;

        for row in &reopened {
            let mut doc = parse_body(row.get("body"))?;
            if let Some(chain) = doc
                .get_mut(salesindex_core::store::CHAIN_FIELD)
                .and_then(serde_json::Value::as_object_mut)
            {
                chain.insert("valid_to".into(), serde_json::Value::Null);
            }
            sqlx::query("UPDATE documents SET body = ?, valid_to = NULL WHERE id = ?")
                .bind(encode_body(&doc)?)
                .bind(row.get::<i64, _>("id"))
                .execute(&mut *tx)
                .await
                .map_err(storage_err)?;
        }

        tx.commit().await.map_err(storage_err)?;
        debug!(block_number, reopened = reopened.len(), "rolled back storage");
        Ok(())
    }
}

fn parse_body(body: String) -> Result<Document, IndexerError> {
    serde_json::from_str(&body).map_err(storage_err)
}

fn encode_body(doc: &Document) -> Result<String, IndexerError> {
    serde_json::to_string(doc).map_err(storage_err)
}

// ─── DocumentStore impl ──────────────────────────────────────────────────────

#[async_trait]
impl DocumentStore for SqliteStorage {
    async fn begin_block(&self, block_number: u64) -> Result<(), IndexerError> {
        self.current_block.store(block_number, Ordering::SeqCst);
        Ok(())
    }

    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: &Document,
        update: &Document,
    ) -> Result<Option<Document>, IndexerError> {
        let block = self.current_block.load(Ordering::SeqCst);
        let active_only = filter.get(VALID_TO_PATH).is_some_and(|v| v.is_null());
        let key = document_key(filter);
        let sql = match (key.is_some(), active_only) {
            (true, true) => {
                "SELECT id, body FROM documents
                 WHERE collection = ? AND key = ? AND valid_to IS NULL ORDER BY id"
            }
            (true, false) => "SELECT id, body FROM documents WHERE collection = ? AND key = ? ORDER BY id",
            (false, true) => {
                "SELECT id, body FROM documents WHERE collection = ? AND valid_to IS NULL ORDER BY id"
            }
            (false, false) => "SELECT id, body FROM documents WHERE collection = ? ORDER BY id",
        };

        let mut query = sqlx::query(sql).bind(collection);
        if let Some(key) = key {
            query = query.bind(key);
        }

        let mut tx = self.pool.begin().await.map_err(storage_err)?;
        let rows = query.fetch_all(&mut *tx).await.map_err(storage_err)?;

        let mut found = None;
        for row in &rows {
            let doc = parse_body(row.get("body"))?;
            if matches_filter(&doc, filter) {
                found = Some((row.get::<i64, _>("id"), doc));
                break;
            }
        }
        let Some((id, prior)) = found else {
            return Ok(None);
        };

        let mut next = prior.clone();
        apply_update(&mut next, update)?;
        open_version(&mut next, block);

        if valid_from(&prior) == Some(block) {
            sqlx::query("UPDATE documents SET body = ?, key = ? WHERE id = ?")
                .bind(encode_body(&next)?)
                .bind(document_key(&next))
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(storage_err)?;
        } else {
            let mut closed = prior.clone();
            close_version(&mut closed, block);
            sqlx::query("UPDATE documents SET body = ?, valid_to = ? WHERE id = ?")
                .bind(encode_body(&closed)?)
                .bind(block as i64)
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(storage_err)?;
            sqlx::query(
                "INSERT INTO documents (collection, body, valid_from, valid_to, key)
                 VALUES (?, ?, ?, NULL, ?)",
            )
            .bind(collection)
            .bind(encode_body(&next)?)
            .bind(block as i64)
            .bind(document_key(&next))
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;
        }

        tx.commit().await.map_err(storage_err)?;
        debug!(collection, block, "document updated");
        Ok(Some(prior))
    }

    async fn insert_one(&self, collection: &str, mut document: Document) -> Result<(), IndexerError> {
        let block = self.current_block.load(Ordering::SeqCst);
        open_version(&mut document, block);

        sqlx::query(
            "INSERT INTO documents (collection, body, valid_from, valid_to, key)
             VALUES (?, ?, ?, NULL, ?)",
        )
        .bind(collection)
        .bind(encode_body(&document)?)
        .bind(block as i64)
        .bind(document_key(&document))
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        debug!(
            collection,
            block,
            domain = ?document_key(&document),
            "document inserted"
        );
        Ok(())
    }

    async fn invalidate(&self, after_block: u64) -> Result<(), IndexerError> {
        self.rollback_after(after_block).await
    }

    async fn reset(&self) -> Result<(), IndexerError> {
        sqlx::query("DELETE FROM documents")
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }
}

// ─── CheckpointStore impl ────────────────────────────────────────────────────

#[async_trait]
impl CheckpointStore for SqliteStorage {
    async fn load(
        &self,
        network: &str,
        indexer_id: &str,
    ) -> Result<Option<Checkpoint>, IndexerError> {
        let row = sqlx::query(
            "SELECT network, indexer_id, block_number, block_hash, updated_at
             FROM checkpoints WHERE network = ? AND indexer_id = ?",
        )
        .bind(network)
        .bind(indexer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(row.map(|r| Checkpoint {
            network: r.get("network"),
            indexer_id: r.get("indexer_id"),
            block_number: r.get::<i64, _>("block_number") as u64,
            block_hash: r.get("block_hash"),
            updated_at: r.get("updated_at"),
        }))
    }

    async fn save(&self, checkpoint: Checkpoint) -> Result<(), IndexerError> {
        sqlx::query(
            "INSERT OR REPLACE INTO checkpoints
             (network, indexer_id, block_number, block_hash, updated_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&checkpoint.network)
        .bind(&checkpoint.indexer_id)
        .bind(checkpoint.block_number as i64)
        .bind(&checkpoint.block_hash)
        .bind(checkpoint.updated_at)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        debug!(
            network = %checkpoint.network,
            indexer_id = %checkpoint.indexer_id,
            block = checkpoint.block_number,
            "checkpoint saved"
        );
        Ok(())
    }

    async fn delete(&self, network: &str, indexer_id: &str) -> Result<(), IndexerError> {
        sqlx::query("DELETE FROM checkpoints WHERE network = ? AND indexer_id = ?")
            .bind(network)
            .bind(indexer_id)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use salesindex_core::store::{active_domain_filter, set_update, valid_to};
    use serde_json::json;

    fn doc(v: serde_json::Value) -> Document {
        v.as_object().cloned().unwrap()
    }

    async fn seeded() -> SqliteStorage {
        let store = SqliteStorage::in_memory().await.unwrap();
        store.begin_block(100).await.unwrap();
        store
            .insert_one("domains", doc(json!({"domain": "ben.stark", "expiry": 10})))
            .await
            .unwrap();
        store
    }

    async fn bump(store: &SqliteStorage, expiry: i64) -> Option<Document> {
        store
            .find_one_and_update(
                "domains",
                &active_domain_filter("ben.stark"),
                &set_update(doc(json!({"domain": "ben.stark", "expiry": expiry}))),
            )
            .await
            .unwrap()
    }

    // ── CheckpointStore ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn checkpoint_roundtrip() {
        let store = SqliteStorage::in_memory().await.unwrap();

        let cp = Checkpoint {
            network: "starknet-mainnet".into(),
            indexer_id: "sales".into(),
            block_number: 1_000,
            block_hash: "0xabcdef".into(),
            updated_at: 1_700_000_000,
        };

        store.save(cp.clone()).await.unwrap();

        let loaded = store.load("starknet-mainnet", "sales").await.unwrap().unwrap();
        assert_eq!(loaded, cp);
    }

    #[tokio::test]
    async fn checkpoint_upsert_and_delete() {
        let store = SqliteStorage::in_memory().await.unwrap();
        for (number, hash) in [(100, "0xold"), (200, "0xnew")] {
            store
                .save(Checkpoint {
                    network: "starknet-mainnet".into(),
                    indexer_id: "sales".into(),
                    block_number: number,
                    block_hash: hash.into(),
                    updated_at: 0,
                })
                .await
                .unwrap();
        }

        let loaded = store.load("starknet-mainnet", "sales").await.unwrap().unwrap();
        assert_eq!(loaded.block_number, 200);
        assert_eq!(loaded.block_hash, "0xnew");

        store.delete("starknet-mainnet", "sales").await.unwrap();
        assert!(store.load("starknet-mainnet", "sales").await.unwrap().is_none());
    }

    // ── DocumentStore ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn missing_domain_returns_none() {
        let store = SqliteStorage::in_memory().await.unwrap();
        assert!(bump(&store, 20).await.is_none());
        assert!(store.documents("domains").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_versions_the_document() {
        let store = seeded().await;
        store.begin_block(105).await.unwrap();

        let prior = bump(&store, 20).await.unwrap();
        assert_eq!(prior["expiry"], 10);

        let all = store.documents("domains").await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(valid_to(&all[0]), Some(105));

        let active = store.active_documents("domains").await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0]["expiry"], 20);
    }

    #[tokio::test]
    async fn same_block_update_overwrites() {
        let store = seeded().await;
        bump(&store, 30).await.unwrap();
        let all = store.documents("domains").await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0]["expiry"], 30);
    }

    #[tokio::test]
    async fn rollback_reopens_closed_versions() {
        let store = seeded().await;
        store.begin_block(110).await.unwrap();
        bump(&store, 99).await.unwrap();
        store
            .insert_one("sales", doc(json!({"domain": "ben.stark", "type": "renewal"})))
            .await
            .unwrap();

        store.rollback_after(105).await.unwrap();

        let active = store.active_documents("domains").await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0]["expiry"], 10);
        assert!(valid_to(&active[0]).is_none());
        assert!(store.documents("sales").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_finds_domain_among_many_labels() {
        let store = SqliteStorage::in_memory().await.unwrap();
        store.begin_block(90).await.unwrap();
        for i in 0..2_000 {
            let label = format!("domain-{i}.stark");
            store
                .insert_one("domains", doc(json!({"domain": label, "expiry": i})))
                .await
                .unwrap();
        }
        store
            .insert_one("domains", doc(json!({"domain": "ben.stark", "expiry": 10})))
            .await
            .unwrap();
        store.begin_block(100).await.unwrap();

        let absent = store
            .find_one_and_update(
                "domains",
                &active_domain_filter("absent.stark"),
                &set_update(doc(json!({"domain": "absent.stark", "expiry": 1}))),
            )
            .await
            .unwrap();
        assert!(absent.is_none());

        let prior = bump(&store, 20).await.unwrap();
        assert_eq!(prior["domain"], "ben.stark");
        assert_eq!(prior["expiry"], 10);

        let active = store.active_documents("domains").await.unwrap();
        assert_eq!(active.len(), 2_001);
        let ben: Vec<_> = active.iter().filter(|d| d["domain"] == "ben.stark").collect();
        assert_eq!(ben.len(), 1);
        assert_eq!(ben[0]["expiry"], 20);
        assert!(active.iter().any(|d| d["domain"] == "domain-1999.stark" && d["expiry"] == 1_999));
    }

    #[tokio::test]
    async fn domain_lookup_searches_the_key_index() {
        let store = seeded().await;
        let plan = sqlx::query(
            "EXPLAIN QUERY PLAN SELECT id, body FROM documents
             WHERE collection = ? AND key = ? AND valid_to IS NULL ORDER BY id",
        )
        .bind("domains")
        .bind("ben.stark")
        .fetch_all(&store.pool)
        .await
        .unwrap();

        let details: Vec<String> = plan.iter().map(|r| r.get::<String, _>("detail")).collect();
        assert!(
            details.iter().any(|d| d.starts_with("SEARCH") && d.contains("key=?")),
            "unexpected plan: {details:?}"
        );
    }

    #[tokio::test]
    async fn second_active_domain_version_is_rejected() {
        let store = seeded().await;
        let err = store
            .insert_one("domains", doc(json!({"domain": "ben.stark", "expiry": 11})))
            .await
            .unwrap_err();
        assert!(matches!(err, IndexerError::Storage(_)));

        // sales share a domain freely
        for _ in 0..2 {
            store
                .insert_one("sales", doc(json!({"domain": "ben.stark", "type": "renewal"})))
                .await
                .unwrap();
        }
        assert_eq!(store.active_documents("sales").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn key_column_is_backfilled_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.db");
        let url = format!("sqlite:{}?mode=rwc", path.display());

        let pool = SqlitePool::connect(&url).await.unwrap();
        sqlx::query(
            "CREATE TABLE documents (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                collection TEXT    NOT NULL,
                body       TEXT    NOT NULL,
                valid_from INTEGER NOT NULL,
                valid_to   INTEGER
            );",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query("INSERT INTO documents (collection, body, valid_from) VALUES ('domains', ?, 100)")
            .bind(r#"{"domain":"ben.stark","expiry":10,"_chain":{"valid_from":100,"valid_to":null}}"#)
            .execute(&pool)
            .await
            .unwrap();
        pool.close().await;

        let store = SqliteStorage::open(&url).await.unwrap();
        store.begin_block(105).await.unwrap();
        let prior = bump(&store, 20).await.unwrap();
        assert_eq!(prior["expiry"], 10);
    }

    #[tokio::test]
    async fn reset_keeps_checkpoints() {
        let store = seeded().await;
        store
            .save(Checkpoint {
                network: "starknet-mainnet".into(),
                indexer_id: "sales".into(),
                block_number: 100,
                block_hash: "0x64".into(),
                updated_at: 0,
            })
            .await
            .unwrap();

        store.reset().await.unwrap();
        assert!(store.documents("domains").await.unwrap().is_empty());
        assert!(store.load("starknet-mainnet", "sales").await.unwrap().is_some());
    }
}
