//! Configuration loader and validator for the Shopify→eBay bridge.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    #[serde(default)]
    pub database: Database,
    pub shopify: Shopify,
    pub ebay: Ebay,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    /// Interval between cron-triggered full syncs, in seconds.
    pub sync_interval_secs: u64,
    /// Shop domains to sync on the cron trigger. Webhook-triggered syncs are
    /// not limited to this list.
    #[serde(default)]
    pub shops: Vec<String>,
    /// Public callback URL for webhook subscriptions. When absent, webhook
    /// registration at startup is skipped.
    #[serde(default)]
    pub webhook_address: Option<String>,
}

/// Storage settings. `url` absent selects the in-memory fallback store.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Database {
    pub url: Option<String>,
}

/// Shopify Admin API settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Shopify {
    pub api_version: String,
}

/// eBay Sell API settings and listing defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ebay {
    pub api_base: String,
    pub token: String,
    pub marketplace_id: String,
    pub currency: String,
    pub merchant_location_key: String,
    pub fulfillment_policy_id: String,
    pub payment_policy_id: String,
    pub return_policy_id: String,
    pub category_id: String,
}

impl Config {
    /// Effective database URL: `DATABASE_URL` env wins over the config file.
    pub fn database_url(&self) -> Option<String> {
        std::env::var("DATABASE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .or_else(|| self.database.url.clone())
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.sync_interval_secs == 0 {
        return Err(ConfigError::Invalid("app.sync_interval_secs must be > 0"));
    }

    if cfg.shopify.api_version.trim().is_empty() {
        return Err(ConfigError::Invalid("shopify.api_version must be non-empty"));
    }

    if cfg.ebay.api_base.trim().is_empty() {
        return Err(ConfigError::Invalid("ebay.api_base must be non-empty"));
    }
    if cfg.ebay.token.trim().is_empty() {
        return Err(ConfigError::Invalid("ebay.token must be non-empty"));
    }
    if cfg.ebay.marketplace_id.trim().is_empty() {
        return Err(ConfigError::Invalid("ebay.marketplace_id must be non-empty"));
    }
    if cfg.ebay.currency.trim().is_empty() {
        return Err(ConfigError::Invalid("ebay.currency must be non-empty"));
    }
    if cfg.ebay.merchant_location_key.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "ebay.merchant_location_key must be non-empty",
        ));
    }
    if cfg.ebay.fulfillment_policy_id.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "ebay.fulfillment_policy_id must be non-empty",
        ));
    }
    if cfg.ebay.payment_policy_id.trim().is_empty() {
        return Err(ConfigError::Invalid("ebay.payment_policy_id must be non-empty"));
    }
    if cfg.ebay.return_policy_id.trim().is_empty() {
        return Err(ConfigError::Invalid("ebay.return_policy_id must be non-empty"));
    }
    if cfg.ebay.category_id.trim().is_empty() {
        return Err(ConfigError::Invalid("ebay.category_id must be non-empty"));
    }

    Ok(())
}

/// Example YAML document, used by tests and as a starting point for deploys.
pub fn example() -> &'static str {
    r#"app:
  sync_interval_secs: 900
  shops:
    - "demo.myshopify.com"
  webhook_address: "https://bridge.example.com/webhooks/shopify"

database:
  url: "sqlite://./data/bridge.db"

shopify:
  api_version: "2024-01"

ebay:
  api_base: "https://api.ebay.com/"
  token: "YOUR_EBAY_OAUTH_TOKEN"
  marketplace_id: "EBAY_US"
  currency: "USD"
  merchant_location_key: "default"
  fulfillment_policy_id: "FULFILLMENT_POLICY_ID"
  payment_policy_id: "PAYMENT_POLICY_ID"
  return_policy_id: "RETURN_POLICY_ID"
  category_id: "9355"
"#
}
