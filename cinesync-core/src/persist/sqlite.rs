use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cinesync_model::{
    BrokenLinkEntry, ErrorKind, ProcessingRecord, ProcessingStage,
    RecordError, SweepId, SymlinkRecord,
};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use tracing::info;
use uuid::Uuid;

use super::{PersistenceError, RecordStore, Result, WriteOp};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS processing_records (
        source_path   TEXT PRIMARY KEY NOT NULL,
        stage         TEXT NOT NULL,
        error_kind    TEXT,
        error_message TEXT,
        retry_count   INTEGER NOT NULL DEFAULT 0,
        identity      TEXT,
        resolved      TEXT,
        link_path     TEXT,
        created_at    TEXT NOT NULL,
        updated_at    TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_processing_records_stage ON processing_records (stage)",
    r#"
    CREATE TABLE IF NOT EXISTS symlink_records (
        link_path        TEXT PRIMARY KEY NOT NULL,
        target_path      TEXT NOT NULL,
        source_path      TEXT NOT NULL,
        created_at       TEXT NOT NULL,
        last_verified_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_symlink_records_source ON symlink_records (source_path)",
    r#"
    CREATE TABLE IF NOT EXISTS broken_link_audit (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        sweep_id         TEXT NOT NULL,
        link_path        TEXT NOT NULL,
        target           TEXT NOT NULL,
        sweep_started_at TEXT NOT NULL,
        detected_at      TEXT NOT NULL
    )
    "#,
];

/// SQLite-backed store.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteStore")
            .field("pool_size", &self.pool.size())
            .field("idle_connections", &self.pool.num_idle())
            .finish()
    }
}

impl SqliteStore {
    /// Open (creating if needed) the database at `url` and ensure the
    /// schema exists.
    pub async fn open(url: &str) -> Result<Self> {
        let in_memory = url.contains(":memory:");
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(if in_memory {
                SqliteJournalMode::Memory
            } else {
                SqliteJournalMode::Wal
            })
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        // every connection to :memory: would see its own empty database
        let max_connections = if in_memory { 1 } else { 4 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        info!(target: "cinesync::persist", url, "record store ready");
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

fn path_text(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn record_from_row(row: &SqliteRow) -> Result<ProcessingRecord> {
    let source: String = row.try_get("source_path")?;
    let stage: String = row.try_get("stage")?;
    let stage = ProcessingStage::from_str(&stage)
        .map_err(|e| PersistenceError::corrupt(&source, e))?;

    let error_kind: Option<String> = row.try_get("error_kind")?;
    let last_error = match error_kind {
        Some(kind) => {
            let kind = ErrorKind::from_str(&kind)
                .map_err(|e| PersistenceError::corrupt(&source, e))?;
            let message: Option<String> = row.try_get("error_message")?;
            Some(RecordError::new(kind, message.unwrap_or_default()))
        }
        None => None,
    };

    let identity: Option<String> = row.try_get("identity")?;
    let resolved: Option<String> = row.try_get("resolved")?;
    let link_path: Option<String> = row.try_get("link_path")?;
    let retry_count: i64 = row.try_get("retry_count")?;

    Ok(ProcessingRecord {
        stage,
        last_error,
        retry_count: u32::try_from(retry_count).unwrap_or(u32::MAX),
        identity: identity.as_deref().map(serde_json::from_str).transpose()?,
        resolved: resolved.as_deref().map(serde_json::from_str).transpose()?,
        link_path: link_path.map(PathBuf::from),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        source_path: PathBuf::from(source),
    })
}

fn link_from_row(row: &SqliteRow) -> Result<SymlinkRecord> {
    let link: String = row.try_get("link_path")?;
    let target: String = row.try_get("target_path")?;
    let source: String = row.try_get("source_path")?;
    Ok(SymlinkRecord {
        link_path: PathBuf::from(link),
        target_path: PathBuf::from(target),
        source_path: PathBuf::from(source),
        created_at: row.try_get("created_at")?,
        last_verified_at: row.try_get("last_verified_at")?,
    })
}

fn audit_from_row(row: &SqliteRow) -> Result<BrokenLinkEntry> {
    let sweep: String = row.try_get("sweep_id")?;
    let sweep_id = Uuid::parse_str(&sweep)
        .map(SweepId)
        .map_err(|e| PersistenceError::corrupt(&sweep, e))?;
    let link: String = row.try_get("link_path")?;
    let target: String = row.try_get("target")?;
    let sweep_started_at: DateTime<Utc> = row.try_get("sweep_started_at")?;
    let detected_at: DateTime<Utc> = row.try_get("detected_at")?;
    Ok(BrokenLinkEntry {
        sweep_id,
        link_path: PathBuf::from(link),
        target: PathBuf::from(target),
        sweep_started_at,
        detected_at,
    })
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn apply(&self, ops: &[WriteOp]) -> Result<()> {
        if ops.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for op in ops {
            match op {
                WriteOp::UpsertRecord(record) => {
                    let identity = record
                        .identity
                        .as_ref()
                        .map(serde_json::to_string)
                        .transpose()?;
                    let resolved = record
                        .resolved
                        .as_ref()
                        .map(serde_json::to_string)
                        .transpose()?;
                    sqlx::query(
                        r#"
                        INSERT INTO processing_records (
                            source_path, stage, error_kind, error_message, retry_count,
                            identity, resolved, link_path, created_at, updated_at
                        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                        ON CONFLICT (source_path) DO UPDATE SET
                            stage = excluded.stage,
                            error_kind = excluded.error_kind,
                            error_message = excluded.error_message,
                            retry_count = excluded.retry_count,
                            identity = excluded.identity,
                            resolved = excluded.resolved,
                            link_path = excluded.link_path,
                            updated_at = excluded.updated_at
                        "#,
                    )
                    .bind(path_text(&record.source_path))
                    .bind(record.stage.as_str())
                    .bind(record.last_error.as_ref().map(|e| e.kind.as_str()))
                    .bind(record.last_error.as_ref().map(|e| e.message.as_str()))
                    .bind(i64::from(record.retry_count))
                    .bind(identity)
                    .bind(resolved)
                    .bind(record.link_path.as_deref().map(path_text))
                    .bind(record.created_at)
                    .bind(record.updated_at)
                    .execute(&mut *tx)
                    .await?;
                }
                WriteOp::UpsertLink(link) => {
                    sqlx::query(
                        r#"
                        INSERT INTO symlink_records (
                            link_path, target_path, source_path, created_at, last_verified_at
                        ) VALUES (?, ?, ?, ?, ?)
                        ON CONFLICT (link_path) DO UPDATE SET
                            target_path = excluded.target_path,
                            source_path = excluded.source_path,
                            last_verified_at = excluded.last_verified_at
                        "#,
                    )
                    .bind(path_text(&link.link_path))
                    .bind(path_text(&link.target_path))
                    .bind(path_text(&link.source_path))
                    .bind(link.created_at)
                    .bind(link.last_verified_at)
                    .execute(&mut *tx)
                    .await?;
                }
                WriteOp::DeleteLink(path) => {
                    sqlx::query("DELETE FROM symlink_records WHERE link_path = ?")
                        .bind(path_text(path))
                        .execute(&mut *tx)
                        .await?;
                }
                WriteOp::AppendAudit(entry) => {
                    sqlx::query(
                        r#"
                        INSERT INTO broken_link_audit (
                            sweep_id, link_path, target, sweep_started_at, detected_at
                        ) VALUES (?, ?, ?, ?, ?)
                        "#,
                    )
                    .bind(entry.sweep_id.to_string())
                    .bind(path_text(&entry.link_path))
                    .bind(path_text(&entry.target))
                    .bind(entry.sweep_started_at)
                    .bind(entry.detected_at)
                    .execute(&mut *tx)
                    .await?;
                }
            }
        }
        tx.commit().await?;
        Ok(())
    }

    async fn load_record(&self, source: &Path) -> Result<Option<ProcessingRecord>> {
        let row = sqlx::query("SELECT * FROM processing_records WHERE source_path = ?")
            .bind(path_text(source))
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn load_records(
        &self,
        stages: Option<&[ProcessingStage]>,
    ) -> Result<Vec<ProcessingRecord>> {
        let rows = sqlx::query("SELECT * FROM processing_records ORDER BY source_path")
            .fetch_all(&self.pool)
            .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            let record = record_from_row(row)?;
            if stages.is_none_or(|stages| stages.contains(&record.stage)) {
                records.push(record);
            }
        }
        Ok(records)
    }

    async fn load_links(&self) -> Result<Vec<SymlinkRecord>> {
        let rows = sqlx::query("SELECT * FROM symlink_records ORDER BY link_path")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(link_from_row).collect()
    }

    async fn audit_log(&self, limit: usize) -> Result<Vec<BrokenLinkEntry>> {
        let rows = sqlx::query("SELECT * FROM broken_link_audit ORDER BY id DESC LIMIT ?")
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(audit_from_row).collect()
    }
}
