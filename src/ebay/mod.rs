//! eBay Sell Inventory API client.
//!
//! Thin wrapper over the REST calls the relay pipeline needs. Failures carry
//! the response status and body verbatim so the text survives into run logs
//! and summaries unchanged; retries belong to callers, not here.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use std::fmt;

use crate::ebay::model::{CreateOfferResp, InventoryItem, Offer, PublishOfferResp};

pub mod model;

pub use model::{Amount, ListingPolicies, PricingSummary};

#[async_trait]
pub trait EbayService: Send + Sync {
    /// Create or replace the inventory item for a SKU.
    async fn upsert_inventory_item(&self, sku: &str, item: &InventoryItem) -> Result<()>;

    /// Create an offer for a SKU; returns the offer id.
    async fn create_offer(&self, offer: &Offer) -> Result<String>;

    /// Replace an existing offer.
    async fn update_offer(&self, offer_id: &str, offer: &Offer) -> Result<()>;

    /// Publish an offer into a live listing; returns the listing id.
    async fn publish_offer(&self, offer_id: &str) -> Result<String>;
}

#[derive(Clone)]
pub struct EbayClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl fmt::Debug for EbayClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EbayClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl EbayClient {
    pub fn new(api_base: &str, token: String) -> Result<Self> {
        let base_url = Url::parse(api_base).context("invalid eBay API base URL")?;
        let http = Client::builder()
            .user_agent("shopify-ebay-bridge/0.1")
            .build()
            .expect("reqwest client");
        Ok(Self {
            http,
            base_url,
            token,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).context("invalid eBay endpoint")
    }

    async fn check(res: reqwest::Response, what: &str) -> Result<reqwest::Response> {
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("ebay {} error {}: {}", what, status, body));
        }
        Ok(res)
    }
}

#[async_trait]
impl EbayService for EbayClient {
    async fn upsert_inventory_item(&self, sku: &str, item: &InventoryItem) -> Result<()> {
        let url = self.endpoint(&format!("sell/inventory/v1/inventory_item/{sku}"))?;
        let res = self
            .http
            .put(url)
            .bearer_auth(&self.token)
            .header("Content-Language", "en-US")
            .json(item)
            .send()
            .await
            .context("failed to reach eBay")?;
        Self::check(res, "inventory item").await?;
        Ok(())
    }

    async fn create_offer(&self, offer: &Offer) -> Result<String> {
        let url = self.endpoint("sell/inventory/v1/offer")?;
        let res = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .header("Content-Language", "en-US")
            .json(offer)
            .send()
            .await
            .context("failed to reach eBay")?;
        let res = Self::check(res, "offer create").await?;
        let payload: CreateOfferResp = res.json().await.context("invalid eBay offer JSON")?;
        Ok(payload.offer_id)
    }

    async fn update_offer(&self, offer_id: &str, offer: &Offer) -> Result<()> {
        let url = self.endpoint(&format!("sell/inventory/v1/offer/{offer_id}"))?;
        let res = self
            .http
            .put(url)
            .bearer_auth(&self.token)
            .header("Content-Language", "en-US")
            .json(offer)
            .send()
            .await
            .context("failed to reach eBay")?;
        Self::check(res, "offer update").await?;
        Ok(())
    }

    async fn publish_offer(&self, offer_id: &str) -> Result<String> {
        let url = self.endpoint(&format!("sell/inventory/v1/offer/{offer_id}/publish"))?;
        let res = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .send()
            .await
            .context("failed to reach eBay")?;
        let res = Self::check(res, "offer publish").await?;
        let payload: PublishOfferResp = res.json().await.context("invalid eBay publish JSON")?;
        Ok(payload.listing_id)
    }
}
