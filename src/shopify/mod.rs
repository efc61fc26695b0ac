//! Shopify Admin REST client.
//!
//! The OAuth handshake and webhook HMAC verification live at the HTTP edge,
//! outside this crate; this client only performs authenticated Admin API
//! calls with a token the store already holds.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde_json::json;
use std::fmt;
use tracing::{info, warn};

use crate::shopify::model::{ProductsResp, WebhookResp};

pub mod model;

pub use model::{InventoryLevelWebhook, Product, ProductWebhook, Variant};

#[async_trait]
pub trait ShopifyService: Send + Sync {
    /// Fetch the shop's products (first page, up to 250).
    async fn list_products(&self, shop: &str, token: &str) -> Result<Vec<Product>>;

    /// Register a webhook subscription. Registering an already-subscribed
    /// topic is treated as success.
    async fn register_webhook(
        &self,
        shop: &str,
        token: &str,
        topic: &str,
        address: &str,
    ) -> Result<()>;
}

#[derive(Clone)]
pub struct ShopifyClient {
    http: Client,
    api_version: String,
    /// Overrides `https://{shop}/` when set; used by tests with a local server.
    base_url: Option<Url>,
}

impl fmt::Debug for ShopifyClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShopifyClient")
            .field("api_version", &self.api_version)
            .finish_non_exhaustive()
    }
}

impl ShopifyClient {
    pub fn new(api_version: String) -> Self {
        let http = Client::builder()
            .user_agent("shopify-ebay-bridge/0.1")
            .build()
            .expect("reqwest client");
        Self {
            http,
            api_version,
            base_url: None,
        }
    }

    pub fn with_base_url(api_version: String, base_url: Url) -> Self {
        let mut client = Self::new(api_version);
        client.base_url = Some(base_url);
        client
    }

    fn endpoint(&self, shop: &str, path: &str) -> Result<Url> {
        let base = match &self.base_url {
            Some(url) => url.clone(),
            None => Url::parse(&format!("https://{shop}/"))
                .with_context(|| format!("invalid shop domain {shop}"))?,
        };
        base.join(&format!("admin/api/{}/{}", self.api_version, path))
            .context("invalid Shopify endpoint")
    }
}

#[async_trait]
impl ShopifyService for ShopifyClient {
    async fn list_products(&self, shop: &str, token: &str) -> Result<Vec<Product>> {
        let url = self.endpoint(shop, "products.json?limit=250")?;
        let res = self
            .http
            .get(url)
            .header("X-Shopify-Access-Token", token)
            .send()
            .await
            .context("failed to reach Shopify")?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            warn!(%shop, %status, "shopify products fetch failed");
            return Err(anyhow!("shopify error {}: {}", status, body));
        }
        let payload: ProductsResp = res.json().await.context("invalid Shopify products JSON")?;
        Ok(payload.products)
    }

    async fn register_webhook(
        &self,
        shop: &str,
        token: &str,
        topic: &str,
        address: &str,
    ) -> Result<()> {
        let url = self.endpoint(shop, "webhooks.json")?;
        let body = json!({
            "webhook": {
                "topic": topic,
                "address": address,
                "format": "json",
            }
        });
        let res = self
            .http
            .post(url)
            .header("X-Shopify-Access-Token", token)
            .json(&body)
            .send()
            .await
            .context("failed to reach Shopify")?;

        // 422 means the topic is already subscribed for this address.
        if res.status() == StatusCode::UNPROCESSABLE_ENTITY {
            info!(%shop, topic, "webhook already registered");
            return Ok(());
        }
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("shopify webhook error {}: {}", status, body));
        }
        let payload: WebhookResp = res.json().await.context("invalid Shopify webhook JSON")?;
        info!(%shop, topic = %payload.webhook.topic, id = payload.webhook.id, "registered webhook");
        Ok(())
    }
}
