//! Storage layer: one contract, two backends.
//!
//! Every other module talks to [`Store`] and never to a concrete backend.
//! [`connect`] picks the backend once at startup: a configured database URL
//! selects the durable SQLite store, its absence selects the in-process
//! fallback. A configured-but-unreachable database is a startup failure, not
//! a fallback, since silently downgrading would lose state on restart.

use crate::model::{EbayLink, LinkUpsert, LogLevel, Run, RunLogEntry, RunStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Persistence contract shared by the durable and in-memory backends.
///
/// Absence is always a sentinel (`None`), never an error. Duplicate writes to
/// write-once structures are absorbed as successful no-ops.
#[async_trait]
pub trait Store: Send + Sync {
    // Token store: one credential per shop, upsert on re-auth.
    async fn set_token(&self, shop: &str, token: &str) -> Result<()>;
    async fn get_token(&self, shop: &str) -> Result<Option<String>>;

    /// Record an inbound event id. Idempotent: marking the same id twice is a
    /// no-op, not an error. Entries are never evicted; the ledger grows with
    /// webhook volume.
    async fn mark_processed(&self, event_id: &str) -> Result<()>;
    async fn is_processed(&self, event_id: &str) -> Result<bool>;

    /// Create a run in status `running` with the given initial summary and a
    /// fresh collision-free id. The run is visible to queries immediately.
    async fn create_run(&self, shop: &str, trigger: &str, summary: Value) -> Result<String>;

    /// Append one log entry. Empty messages are silently dropped so call
    /// sites can log best-effort without guarding. The run id is not
    /// validated.
    async fn add_log(
        &self,
        run_id: &str,
        level: LogLevel,
        message: &str,
        meta: Option<Value>,
    ) -> Result<()>;

    /// Move a run to a terminal status, replacing the summary wholesale and
    /// stamping `finished_at`. A second finish overwrites the first
    /// (last-write-wins); there is no double-finish guard.
    async fn finish_run(&self, run_id: &str, status: RunStatus, summary: Value) -> Result<()>;

    /// Most recent `limit` runs for a shop, newest first.
    async fn list_runs(&self, shop: &str, limit: i64) -> Result<Vec<Run>>;

    /// Fetch a run with up to `log_limit` of its most recent log entries in
    /// ascending creation order. Requires the shop key: a run id belonging to
    /// a different shop yields `None`, never the record.
    async fn get_run_with_logs(
        &self,
        shop: &str,
        run_id: &str,
        log_limit: i64,
    ) -> Result<Option<(Run, Vec<RunLogEntry>)>>;

    /// Merge-upsert keyed by (shop, sku); see [`LinkUpsert`] for which fields
    /// overwrite unconditionally.
    async fn upsert_link(&self, link: &LinkUpsert) -> Result<()>;
    async fn get_link_by_sku(&self, shop: &str, sku: &str) -> Result<Option<EbayLink>>;

    /// Most recently updated `limit` links for a shop.
    async fn list_links(&self, shop: &str, limit: i64) -> Result<Vec<EbayLink>>;
}

/// Select and initialize the storage backend once at startup.
pub async fn connect(database_url: Option<&str>) -> Result<Arc<dyn Store>> {
    match database_url {
        Some(url) => {
            let store = SqliteStore::connect(url)
                .await
                .with_context(|| format!("failed to open configured database {url}"))?;
            info!(%url, "using durable sqlite store");
            Ok(Arc::new(store))
        }
        None => {
            info!("no database configured; using in-memory store (state is lost on restart)");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
