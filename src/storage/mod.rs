//! Persistence layer.
//!
//! Append-only log of observed and executed transactions in SQLite.
//! Rows are never updated; `delete_all` exists for maintenance resets only.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::types::{RecordKind, SniperError, StoredRecord, TransactionRecord};

/// Default database file.
pub const DEFAULT_DATABASE_PATH: &str = "database.db";

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS transactions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        blockNumber INTEGER,
        txAmount TEXT,
        txHash TEXT,
        tokenAddress TEXT,
        type TEXT CHECK (type IN ('info', 'buy', 'sell'))
    )
"#;

/// Where transaction records go.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Append a row. No dedup: callers must not insert the same hash+tag twice.
    /// Returns the new row id.
    async fn insert(&self, record: &TransactionRecord) -> Result<i64>;

    /// Remove every row. Returns the number of rows deleted.
    async fn delete_all(&self) -> Result<u64>;

    /// Newest rows first.
    async fn recent(&self, limit: u32) -> Result<Vec<StoredRecord>>;

    async fn count(&self) -> Result<u64>;
}

// ---------------------------------------------------------------------------
// SQLite
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database file and make sure the table exists.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open database {}", path.display()))?;

        sqlx::query(CREATE_TABLE)
            .execute(&pool)
            .await
            .context("Failed to create transactions table")?;

        info!(path = %path.display(), "Transaction store ready");
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn row_to_record(row: &SqliteRow) -> Result<StoredRecord> {
        let kind: String = row.try_get("type")?;
        let block_number: i64 = row.try_get("blockNumber")?;
        Ok(StoredRecord {
            id: row.try_get("id")?,
            record: TransactionRecord {
                block_number: u64::try_from(block_number)
                    .map_err(|_| SniperError::Storage(format!("negative block number {block_number}")))?,
                tx_amount: row.try_get("txAmount")?,
                tx_hash: row.try_get("txHash")?,
                token_address: row.try_get("tokenAddress")?,
                kind: kind.parse::<RecordKind>()?,
            },
        })
    }
}

#[async_trait]
impl TransactionStore for SqliteStore {
    async fn insert(&self, record: &TransactionRecord) -> Result<i64> {
        let block_number = i64::try_from(record.block_number)
            .map_err(|_| SniperError::Storage(format!("block number {} out of range", record.block_number)))?;

        let result = sqlx::query(
            "INSERT INTO transactions (blockNumber, txAmount, txHash, tokenAddress, type)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(block_number)
        .bind(&record.tx_amount)
        .bind(&record.tx_hash)
        .bind(record.token_address.as_deref())
        .bind(record.kind.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| SniperError::Storage(e.to_string()))?;

        let id = result.last_insert_rowid();
        debug!(id, tx = %record.tx_hash, kind = %record.kind, "Record inserted");
        Ok(id)
    }

    async fn delete_all(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM transactions")
            .execute(&self.pool)
            .await
            .map_err(|e| SniperError::Storage(e.to_string()))?;
        let deleted = result.rows_affected();
        warn!(deleted, "All transaction records deleted");
        Ok(deleted)
    }

    async fn recent(&self, limit: u32) -> Result<Vec<StoredRecord>> {
        let rows = sqlx::query(
            "SELECT id, blockNumber, txAmount, txHash, tokenAddress, type
             FROM transactions ORDER BY id DESC LIMIT ?1",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SniperError::Storage(e.to_string()))?;

        rows.iter().map(Self::row_to_record).collect()
    }

    async fn count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM transactions")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| SniperError::Storage(e.to_string()))?;
        Ok(count.max(0) as u64)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
