//! Durable backend on SQLite via sqlx.
//!
//! Schema creation is idempotent (`CREATE TABLE IF NOT EXISTS` for every
//! structure) and runs on every boot, so a fresh database file and an
//! existing one go through the same path.

use super::Store;
use crate::model::{EbayLink, LinkUpsert, LogLevel, Run, RunLogEntry, RunStatus};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::instrument;
use uuid::Uuid;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect, apply pragmas and ensure the schema exists.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let normalized = prepare_sqlite_url(database_url);
        let pool = SqlitePool::connect(&normalized).await?;
        // Enable WAL and stricter durability.
        sqlx::query("PRAGMA journal_mode=WAL;").execute(&pool).await?;
        sqlx::query("PRAGMA synchronous=FULL;").execute(&pool).await?;
        sqlx::query("PRAGMA foreign_keys=ON;").execute(&pool).await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        let statements = [
            "CREATE TABLE IF NOT EXISTS shop_tokens (
                shop TEXT PRIMARY KEY,
                access_token TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS processed_events (
                event_id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS sync_runs (
                id TEXT PRIMARY KEY,
                shop TEXT NOT NULL,
                trigger_source TEXT NOT NULL,
                status TEXT NOT NULL,
                summary TEXT NOT NULL,
                started_at TEXT NOT NULL,
                finished_at TEXT
            )",
            "CREATE INDEX IF NOT EXISTS idx_sync_runs_shop_started
                ON sync_runs (shop, started_at DESC)",
            "CREATE TABLE IF NOT EXISTS sync_run_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id TEXT NOT NULL REFERENCES sync_runs(id) ON DELETE CASCADE,
                level TEXT NOT NULL,
                message TEXT NOT NULL,
                meta TEXT,
                created_at TEXT NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_sync_run_logs_run_created
                ON sync_run_logs (run_id, created_at)",
            "CREATE TABLE IF NOT EXISTS ebay_links (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                shop TEXT NOT NULL,
                sku TEXT NOT NULL,
                product_id INTEGER NOT NULL,
                variant_id INTEGER NOT NULL,
                ebay_offer_id TEXT,
                ebay_listing_id TEXT,
                status TEXT NOT NULL,
                last_error TEXT,
                updated_at TEXT NOT NULL,
                UNIQUE (shop, sku)
            )",
        ];
        for stmt in statements {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .context("failed to initialize schema")?;
        }
        Ok(())
    }

    #[cfg(test)]
    pub async fn connect_in_memory() -> Result<Self> {
        Self::connect("sqlite::memory:").await
    }
}

/// If using a file-backed SQLite URL, expand a leading `~/` and ensure the
/// parent directory exists. Leaves in-memory URLs untouched.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") {
        return url.to_string();
    }
    if url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);

    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };

    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = if let Some(rest) = path_part.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            format!("{}/{}", home.trim_end_matches('/'), rest)
        } else {
            path_part.to_string()
        }
    } else {
        path_part.to_string()
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = String::from("sqlite://");
    rebuilt.push_str(&expanded_path);
    if let Some(q) = query_part {
        rebuilt.push('?');
        rebuilt.push_str(q);
    }
    rebuilt
}

fn row_to_run(row: &SqliteRow) -> Result<Run> {
    let id: String = row.get("id");
    let status_str: String = row.get("status");
    let status = RunStatus::parse(&status_str)
        .ok_or_else(|| anyhow!("run {} has unknown status {}", id, status_str))?;
    let summary_str: String = row.get("summary");
    let summary: Value = serde_json::from_str(&summary_str)
        .with_context(|| format!("run {} has invalid summary JSON", id))?;
    Ok(Run {
        id,
        shop: row.get("shop"),
        trigger: row.get("trigger_source"),
        status,
        summary,
        started_at: row.get("started_at"),
        finished_at: row.get("finished_at"),
    })
}

fn row_to_log(row: &SqliteRow) -> Result<RunLogEntry> {
    let id: i64 = row.get("id");
    let level_str: String = row.get("level");
    let level = LogLevel::parse(&level_str)
        .ok_or_else(|| anyhow!("log {} has unknown level {}", id, level_str))?;
    let meta = row
        .try_get::<Option<String>, _>("meta")
        .ok()
        .flatten()
        .map(|m| serde_json::from_str(&m))
        .transpose()
        .with_context(|| format!("log {} has invalid meta JSON", id))?;
    Ok(RunLogEntry {
        id,
        run_id: row.get("run_id"),
        level,
        message: row.get("message"),
        meta,
        created_at: row.get("created_at"),
    })
}

#[async_trait]
impl Store for SqliteStore {
    #[instrument(skip_all)]
    async fn set_token(&self, shop: &str, token: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO shop_tokens (shop, access_token, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(shop) DO UPDATE SET
                access_token = excluded.access_token,
                updated_at = excluded.updated_at",
        )
        .bind(shop)
        .bind(token)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip_all)]
    async fn get_token(&self, shop: &str) -> Result<Option<String>> {
        let token =
            sqlx::query_scalar::<_, String>("SELECT access_token FROM shop_tokens WHERE shop = ?")
                .bind(shop)
                .fetch_optional(&self.pool)
                .await?;
        Ok(token)
    }

    #[instrument(skip_all)]
    async fn mark_processed(&self, event_id: &str) -> Result<()> {
        // Duplicate ids are absorbed; redelivered webhooks hit this path.
        sqlx::query("INSERT OR IGNORE INTO processed_events (event_id, created_at) VALUES (?, ?)")
            .bind(event_id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip_all)]
    async fn is_processed(&self, event_id: &str) -> Result<bool> {
        let seen: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM processed_events WHERE event_id = ?)")
                .bind(event_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(seen)
    }

    #[instrument(skip_all)]
    async fn create_run(&self, shop: &str, trigger: &str, summary: Value) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO sync_runs (id, shop, trigger_source, status, summary, started_at, finished_at)
             VALUES (?, ?, ?, ?, ?, ?, NULL)",
        )
        .bind(&id)
        .bind(shop)
        .bind(trigger)
        .bind(RunStatus::Running.as_str())
        .bind(serde_json::to_string(&summary)?)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    #[instrument(skip_all)]
    async fn add_log(
        &self,
        run_id: &str,
        level: LogLevel,
        message: &str,
        meta: Option<Value>,
    ) -> Result<()> {
        if message.is_empty() {
            return Ok(());
        }
        let meta_str = meta.map(|m| serde_json::to_string(&m)).transpose()?;
        sqlx::query(
            "INSERT INTO sync_run_logs (run_id, level, message, meta, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(run_id)
        .bind(level.as_str())
        .bind(message)
        .bind(meta_str)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip_all)]
    async fn finish_run(&self, run_id: &str, status: RunStatus, summary: Value) -> Result<()> {
        sqlx::query("UPDATE sync_runs SET status = ?, summary = ?, finished_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(serde_json::to_string(&summary)?)
            .bind(Utc::now())
            .bind(run_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip_all)]
    async fn list_runs(&self, shop: &str, limit: i64) -> Result<Vec<Run>> {
        let rows = sqlx::query(
            "SELECT id, shop, trigger_source, status, summary, started_at, finished_at
             FROM sync_runs WHERE shop = ? ORDER BY started_at DESC LIMIT ?",
        )
        .bind(shop)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_run).collect()
    }

    #[instrument(skip_all)]
    async fn get_run_with_logs(
        &self,
        shop: &str,
        run_id: &str,
        log_limit: i64,
    ) -> Result<Option<(Run, Vec<RunLogEntry>)>> {
        let row = sqlx::query(
            "SELECT id, shop, trigger_source, status, summary, started_at, finished_at
             FROM sync_runs WHERE id = ? AND shop = ?",
        )
        .bind(run_id)
        .bind(shop)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let run = row_to_run(&row)?;

        // Most recent entries, presented oldest-first for replay.
        let log_rows = sqlx::query(
            "SELECT id, run_id, level, message, meta, created_at FROM (
                 SELECT id, run_id, level, message, meta, created_at
                 FROM sync_run_logs WHERE run_id = ?
                 ORDER BY created_at DESC, id DESC LIMIT ?
             ) ORDER BY created_at ASC, id ASC",
        )
        .bind(run_id)
        .bind(log_limit)
        .fetch_all(&self.pool)
        .await?;
        let logs = log_rows.iter().map(row_to_log).collect::<Result<Vec<_>>>()?;
        Ok(Some((run, logs)))
    }

    #[instrument(skip_all)]
    async fn upsert_link(&self, link: &LinkUpsert) -> Result<()> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO ebay_links
                (shop, sku, product_id, variant_id, ebay_offer_id, ebay_listing_id,
                 status, last_error, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, COALESCE(?, 'linked'), ?, ?)
             ON CONFLICT(shop, sku) DO UPDATE SET
                product_id = excluded.product_id,
                variant_id = excluded.variant_id,
                ebay_offer_id = COALESCE(?, ebay_links.ebay_offer_id),
                ebay_listing_id = COALESCE(?, ebay_links.ebay_listing_id),
                status = COALESCE(?, ebay_links.status),
                last_error = ?,
                updated_at = ?",
        )
        .bind(&link.shop)
        .bind(&link.sku)
        .bind(link.product_id)
        .bind(link.variant_id)
        .bind(link.ebay_offer_id.as_deref())
        .bind(link.ebay_listing_id.as_deref())
        .bind(link.status.as_deref())
        .bind(link.last_error.as_deref())
        .bind(now)
        .bind(link.ebay_offer_id.as_deref())
        .bind(link.ebay_listing_id.as_deref())
        .bind(link.status.as_deref())
        .bind(link.last_error.as_deref())
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip_all)]
    async fn get_link_by_sku(&self, shop: &str, sku: &str) -> Result<Option<EbayLink>> {
        let row = sqlx::query(
            "SELECT shop, sku, product_id, variant_id, ebay_offer_id, ebay_listing_id,
                    status, last_error, updated_at
             FROM ebay_links WHERE shop = ? AND sku = ?",
        )
        .bind(shop)
        .bind(sku)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|row| row_to_link(&row)))
    }

    #[instrument(skip_all)]
    async fn list_links(&self, shop: &str, limit: i64) -> Result<Vec<EbayLink>> {
        let rows = sqlx::query(
            "SELECT shop, sku, product_id, variant_id, ebay_offer_id, ebay_listing_id,
                    status, last_error, updated_at
             FROM ebay_links WHERE shop = ? ORDER BY updated_at DESC LIMIT ?",
        )
        .bind(shop)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_link).collect())
    }
}

fn row_to_link(row: &SqliteRow) -> EbayLink {
    EbayLink {
        shop: row.get("shop"),
        sku: row.get("sku"),
        product_id: row.get("product_id"),
        variant_id: row.get("variant_id"),
        ebay_offer_id: row.get("ebay_offer_id"),
        ebay_listing_id: row.get("ebay_listing_id"),
        status: row.get("status"),
        last_error: row.get("last_error"),
        updated_at: row.get("updated_at"),
    }
}
