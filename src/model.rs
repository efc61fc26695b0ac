use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle state of a sync run. `Running` is the only initial state;
/// `Success` and `Error` are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Success,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(RunStatus::Running),
            "success" => Some(RunStatus::Success),
            "error" => Some(RunStatus::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "info" => Some(LogLevel::Info),
            "warn" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

/// One logical sync/relay operation with its lifecycle and summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub shop: String,
    pub trigger: String,
    pub status: RunStatus,
    pub summary: Value,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// A single step recorded against a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLogEntry {
    pub id: i64,
    pub run_id: String,
    pub level: LogLevel,
    pub message: String,
    pub meta: Option<Value>,
    pub created_at: DateTime<Utc>,
}

/// Stored access credential for one shop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShopToken {
    pub shop: String,
    pub access_token: String,
    pub updated_at: DateTime<Utc>,
}

/// Association between a shop variant (by SKU) and its eBay counterpart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EbayLink {
    pub shop: String,
    pub sku: String,
    pub product_id: i64,
    pub variant_id: i64,
    pub ebay_offer_id: Option<String>,
    pub ebay_listing_id: Option<String>,
    pub status: String,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Field set for a link merge-upsert.
///
/// `product_id` and `variant_id` always overwrite. `ebay_offer_id`,
/// `ebay_listing_id` and `status` overwrite only when `Some`, so a caller
/// that doesn't know the current offer id can't blank it. `last_error`
/// always overwrites, including to `None`, which is how a successful relay
/// clears a stale error.
#[derive(Debug, Clone, Default)]
pub struct LinkUpsert {
    pub shop: String,
    pub sku: String,
    pub product_id: i64,
    pub variant_id: i64,
    pub ebay_offer_id: Option<String>,
    pub ebay_listing_id: Option<String>,
    pub status: Option<String>,
    pub last_error: Option<String>,
}
