//! In-process fallback backend.
//!
//! Used when no database URL is configured. Same observable contract as the
//! SQLite store (merge rules, ordering, absence sentinels), but state lives
//! in plain collections and is lost on restart.

use super::Store;
use crate::model::{EbayLink, LinkUpsert, LogLevel, Run, RunLogEntry, RunStatus, ShopToken};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    tokens: HashMap<String, ShopToken>,
    processed: HashSet<String>,
    runs: Vec<Run>,
    logs: HashMap<String, Vec<RunLogEntry>>,
    links: Vec<EbayLink>,
    next_log_id: i64,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn cap(limit: i64) -> usize {
    usize::try_from(limit).unwrap_or(0)
}

#[async_trait]
impl Store for MemoryStore {
    async fn set_token(&self, shop: &str, token: &str) -> Result<()> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        inner.tokens.insert(
            shop.to_string(),
            ShopToken {
                shop: shop.to_string(),
                access_token: token.to_string(),
                updated_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn get_token(&self, shop: &str) -> Result<Option<String>> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        Ok(inner.tokens.get(shop).map(|t| t.access_token.clone()))
    }

    async fn mark_processed(&self, event_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        inner.processed.insert(event_id.to_string());
        Ok(())
    }

    async fn is_processed(&self, event_id: &str) -> Result<bool> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        Ok(inner.processed.contains(event_id))
    }

    async fn create_run(&self, shop: &str, trigger: &str, summary: Value) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        inner.runs.push(Run {
            id: id.clone(),
            shop: shop.to_string(),
            trigger: trigger.to_string(),
            status: RunStatus::Running,
            summary,
            started_at: Utc::now(),
            finished_at: None,
        });
        Ok(id)
    }

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
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        inner.next_log_id += 1;
        let entry = RunLogEntry {
            id: inner.next_log_id,
            run_id: run_id.to_string(),
            level,
            message: message.to_string(),
            meta,
            created_at: Utc::now(),
        };
        inner.logs.entry(run_id.to_string()).or_default().push(entry);
        Ok(())
    }

    async fn finish_run(&self, run_id: &str, status: RunStatus, summary: Value) -> Result<()> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        // Unknown run ids are a no-op, matching an UPDATE that hits no rows.
        if let Some(run) = inner.runs.iter_mut().find(|r| r.id == run_id) {
            run.status = status;
            run.summary = summary;
            run.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn list_runs(&self, shop: &str, limit: i64) -> Result<Vec<Run>> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        Ok(inner
            .runs
            .iter()
            .rev()
            .filter(|r| r.shop == shop)
            .take(cap(limit))
            .cloned()
            .collect())
    }

    async fn get_run_with_logs(
        &self,
        shop: &str,
        run_id: &str,
        log_limit: i64,
    ) -> Result<Option<(Run, Vec<RunLogEntry>)>> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        let Some(run) = inner.runs.iter().find(|r| r.id == run_id && r.shop == shop) else {
            return Ok(None);
        };
        let logs = inner.logs.get(run_id).map(Vec::as_slice).unwrap_or(&[]);
        // Most recent entries, presented oldest-first.
        let skip = logs.len().saturating_sub(cap(log_limit));
        Ok(Some((run.clone(), logs[skip..].to_vec())))
    }

    async fn upsert_link(&self, link: &LinkUpsert) -> Result<()> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        let now = Utc::now();
        if let Some(existing) = inner
            .links
            .iter_mut()
            .find(|l| l.shop == link.shop && l.sku == link.sku)
        {
            existing.product_id = link.product_id;
            existing.variant_id = link.variant_id;
            if let Some(offer) = &link.ebay_offer_id {
                existing.ebay_offer_id = Some(offer.clone());
            }
            if let Some(listing) = &link.ebay_listing_id {
                existing.ebay_listing_id = Some(listing.clone());
            }
            if let Some(status) = &link.status {
                existing.status = status.clone();
            }
            existing.last_error = link.last_error.clone();
            existing.updated_at = now;
        } else {
            inner.links.push(EbayLink {
                shop: link.shop.clone(),
                sku: link.sku.clone(),
                product_id: link.product_id,
                variant_id: link.variant_id,
                ebay_offer_id: link.ebay_offer_id.clone(),
                ebay_listing_id: link.ebay_listing_id.clone(),
                status: link.status.clone().unwrap_or_else(|| "linked".to_string()),
                last_error: link.last_error.clone(),
                updated_at: now,
            });
        }
        Ok(())
    }

    async fn get_link_by_sku(&self, shop: &str, sku: &str) -> Result<Option<EbayLink>> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        Ok(inner
            .links
            .iter()
            .find(|l| l.shop == shop && l.sku == sku)
            .cloned())
    }

    async fn list_links(&self, shop: &str, limit: i64) -> Result<Vec<EbayLink>> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        let mut links: Vec<EbayLink> = inner
            .links
            .iter()
            .filter(|l| l.shop == shop)
            .cloned()
            .collect();
        links.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        links.truncate(cap(limit));
        Ok(links)
    }
}
