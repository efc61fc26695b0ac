use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

use shopify_ebay_bridge::config;
use shopify_ebay_bridge::ebay::model::{InventoryItem, Offer};
use shopify_ebay_bridge::ebay::EbayService;
use shopify_ebay_bridge::handlers;
use shopify_ebay_bridge::model::{LogLevel, RunStatus};
use shopify_ebay_bridge::shopify::{Product, ProductWebhook, ShopifyService, Variant};
use shopify_ebay_bridge::store::{MemoryStore, Store};
use shopify_ebay_bridge::sync;

fn listing_config() -> config::Ebay {
    let cfg: config::Config = serde_yaml::from_str(config::example()).unwrap();
    cfg.ebay
}

fn variant(id: i64, product_id: i64, sku: Option<&str>, qty: i64) -> Variant {
    Variant {
        id,
        product_id,
        sku: sku.map(str::to_string),
        price: "19.99".into(),
        inventory_quantity: qty,
    }
}

fn product(id: i64, title: &str, variants: Vec<Variant>) -> Product {
    Product {
        id,
        title: title.into(),
        body_html: None,
        variants,
    }
}

#[derive(Clone, Default)]
struct RecordingEbay {
    fail_skus: Arc<Mutex<HashSet<String>>>,
    inventory_calls: Arc<Mutex<Vec<String>>>,
    offers_created: Arc<Mutex<Vec<Offer>>>,
    offers_updated: Arc<Mutex<Vec<(String, Offer)>>>,
    published: Arc<Mutex<Vec<String>>>,
}

impl RecordingEbay {
    async fn fail_sku(&self, sku: &str) {
        self.fail_skus.lock().await.insert(sku.to_string());
    }

    async fn inventory_calls(&self) -> Vec<String> {
        self.inventory_calls.lock().await.clone()
    }

    async fn offers_created(&self) -> Vec<Offer> {
        self.offers_created.lock().await.clone()
    }

    async fn offers_updated(&self) -> Vec<(String, Offer)> {
        self.offers_updated.lock().await.clone()
    }

    async fn published(&self) -> Vec<String> {
        self.published.lock().await.clone()
    }
}

#[async_trait]
impl EbayService for RecordingEbay {
    async fn upsert_inventory_item(&self, sku: &str, _item: &InventoryItem) -> Result<()> {
        if self.fail_skus.lock().await.contains(sku) {
            return Err(anyhow!("ebay inventory item error 500: internal error"));
        }
        self.inventory_calls.lock().await.push(sku.to_string());
        Ok(())
    }

    async fn create_offer(&self, offer: &Offer) -> Result<String> {
        let mut created = self.offers_created.lock().await;
        created.push(offer.clone());
        Ok(format!("offer-{}", created.len()))
    }

    async fn update_offer(&self, offer_id: &str, offer: &Offer) -> Result<()> {
        self.offers_updated
            .lock()
            .await
            .push((offer_id.to_string(), offer.clone()));
        Ok(())
    }

    async fn publish_offer(&self, offer_id: &str) -> Result<String> {
        self.published.lock().await.push(offer_id.to_string());
        Ok(format!("listing-for-{offer_id}"))
    }
}

#[derive(Clone, Default)]
struct FakeShopify {
    products: Arc<Mutex<Vec<Product>>>,
    fail: Arc<Mutex<bool>>,
}

impl FakeShopify {
    async fn set_products(&self, products: Vec<Product>) {
        *self.products.lock().await = products;
    }

    async fn fail_next(&self) {
        *self.fail.lock().await = true;
    }
}

#[async_trait]
impl ShopifyService for FakeShopify {
    async fn list_products(&self, _shop: &str, _token: &str) -> Result<Vec<Product>> {
        if *self.fail.lock().await {
            return Err(anyhow!("shopify error 503: service unavailable"));
        }
        Ok(self.products.lock().await.clone())
    }

    async fn register_webhook(
        &self,
        _shop: &str,
        _token: &str,
        _topic: &str,
        _address: &str,
    ) -> Result<()> {
        Ok(())
    }
}

fn webhook(id: i64, title: &str, variants: Vec<Variant>) -> ProductWebhook {
    let raw = serde_json::json!({
        "id": id,
        "title": title,
        "variants": variants.iter().map(|v| serde_json::json!({
            "id": v.id,
            "product_id": v.product_id,
            "sku": v.sku.clone(),
            "price": v.price.clone(),
            "inventory_quantity": v.inventory_quantity,
        })).collect::<Vec<_>>(),
    });
    serde_json::from_value(raw).unwrap()
}

#[tokio::test]
async fn product_webhook_publishes_and_records_run() {
    let store = MemoryStore::new();
    let ebay = RecordingEbay::default();
    let listing = listing_config();
    let shop = "demo.myshopify.com";

    let payload = webhook(1, "Widget", vec![variant(11, 1, Some("W-1"), 5)]);
    handlers::handle_product_update(&store, &ebay, &listing, shop, "evt-1", payload)
        .await
        .unwrap();

    assert_eq!(ebay.inventory_calls().await, vec!["W-1"]);
    let created = ebay.offers_created().await;
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].sku, "W-1");
    assert_eq!(created[0].pricing_summary.price.value, "19.99");
    assert_eq!(ebay.published().await, vec!["offer-1"]);

    let runs = store.list_runs(shop, 10).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Success);
    assert_eq!(runs[0].trigger, "webhook");
    assert_eq!(runs[0].summary["synced"], 1);

    let link = store.get_link_by_sku(shop, "W-1").await.unwrap().unwrap();
    assert_eq!(link.ebay_offer_id.as_deref(), Some("offer-1"));
    assert_eq!(link.ebay_listing_id.as_deref(), Some("listing-for-offer-1"));
    assert_eq!(link.status, "published");
    assert_eq!(link.last_error, None);

    assert!(store.is_processed("evt-1").await.unwrap());
}

#[tokio::test]
async fn redelivered_webhook_is_a_no_op() {
    let store = MemoryStore::new();
    let ebay = RecordingEbay::default();
    let listing = listing_config();
    let shop = "demo.myshopify.com";

    let payload = webhook(1, "Widget", vec![variant(11, 1, Some("W-1"), 5)]);
    handlers::handle_product_update(&store, &ebay, &listing, shop, "evt-1", payload.clone())
        .await
        .unwrap();
    handlers::handle_product_update(&store, &ebay, &listing, shop, "evt-1", payload)
        .await
        .unwrap();

    assert_eq!(ebay.inventory_calls().await.len(), 1);
    assert_eq!(ebay.offers_created().await.len(), 1);
    assert_eq!(store.list_runs(shop, 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn second_sync_updates_existing_offer() {
    let store = MemoryStore::new();
    let ebay = RecordingEbay::default();
    let listing = listing_config();
    let shop = "demo.myshopify.com";

    let first = webhook(1, "Widget", vec![variant(11, 1, Some("W-1"), 5)]);
    handlers::handle_product_update(&store, &ebay, &listing, shop, "evt-1", first)
        .await
        .unwrap();

    let second = webhook(1, "Widget v2", vec![variant(11, 1, Some("W-1"), 9)]);
    handlers::handle_product_update(&store, &ebay, &listing, shop, "evt-2", second)
        .await
        .unwrap();

    // One create+publish from the first event, one update from the second.
    assert_eq!(ebay.offers_created().await.len(), 1);
    assert_eq!(ebay.published().await.len(), 1);
    let updated = ebay.offers_updated().await;
    assert_eq!(updated.len(), 1);
    assert_eq!(updated[0].0, "offer-1");
    assert_eq!(updated[0].1.available_quantity, 9);

    let link = store.get_link_by_sku(shop, "W-1").await.unwrap().unwrap();
    assert_eq!(link.ebay_offer_id.as_deref(), Some("offer-1"));
    // The listing id from the first publish survives the update.
    assert_eq!(link.ebay_listing_id.as_deref(), Some("listing-for-offer-1"));
}

#[tokio::test]
async fn relay_failure_finishes_run_with_error() {
    let store = MemoryStore::new();
    let ebay = RecordingEbay::default();
    ebay.fail_sku("BAD-1").await;
    let listing = listing_config();
    let shop = "demo.myshopify.com";

    let payload = webhook(
        1,
        "Widget",
        vec![variant(11, 1, Some("W-1"), 5), variant(12, 1, Some("BAD-1"), 2)],
    );
    handlers::handle_product_update(&store, &ebay, &listing, shop, "evt-1", payload)
        .await
        .unwrap();

    let runs = store.list_runs(shop, 10).await.unwrap();
    assert_eq!(runs[0].status, RunStatus::Error);
    assert_eq!(runs[0].summary["synced"], 1);
    assert_eq!(runs[0].summary["failed"], 1);

    // Failure detail reaches the link registry and the run log verbatim.
    let link = store.get_link_by_sku(shop, "BAD-1").await.unwrap().unwrap();
    let last_error = link.last_error.unwrap();
    assert!(last_error.contains("ebay inventory item error 500"));

    let (_, logs) = store
        .get_run_with_logs(shop, &runs[0].id, 10)
        .await
        .unwrap()
        .unwrap();
    let error_log = logs.iter().find(|l| l.level == LogLevel::Error).unwrap();
    assert!(error_log.message.contains("BAD-1"));
    assert!(error_log.message.contains("internal error"));

    // The event still counts as handled; redelivery would repeat the failure.
    assert!(store.is_processed("evt-1").await.unwrap());
}

#[tokio::test]
async fn variants_without_sku_are_skipped() {
    let store = MemoryStore::new();
    let ebay = RecordingEbay::default();
    let listing = listing_config();
    let shop = "demo.myshopify.com";

    let payload = webhook(1, "Widget", vec![variant(11, 1, None, 5)]);
    handlers::handle_product_update(&store, &ebay, &listing, shop, "evt-1", payload)
        .await
        .unwrap();

    assert!(ebay.inventory_calls().await.is_empty());
    let runs = store.list_runs(shop, 10).await.unwrap();
    assert_eq!(runs[0].status, RunStatus::Success);
    assert_eq!(runs[0].summary["skipped"], 1);
}

#[tokio::test]
async fn cron_sync_covers_all_products() {
    let store = MemoryStore::new();
    let ebay = RecordingEbay::default();
    let shopify = FakeShopify::default();
    let listing = listing_config();
    let shop = "demo.myshopify.com";

    store.set_token(shop, "tok").await.unwrap();
    shopify
        .set_products(vec![
            product(1, "Widget", vec![variant(11, 1, Some("W-1"), 5)]),
            product(2, "Gadget", vec![variant(21, 2, Some("G-1"), 3)]),
        ])
        .await;

    let run_id = sync::run_product_sync(
        &store,
        &shopify,
        &ebay,
        &listing,
        shop,
        "cron",
        serde_json::json!({}),
    )
    .await
    .unwrap();

    let (run, logs) = store
        .get_run_with_logs(shop, &run_id, 20)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(run.status, RunStatus::Success);
    assert_eq!(run.trigger, "cron");
    assert_eq!(run.summary["synced"], 2);
    assert_eq!(logs[0].message, "fetched 2 products");

    assert_eq!(ebay.inventory_calls().await, vec!["W-1", "G-1"]);
    assert_eq!(store.list_links(shop, 10).await.unwrap().len(), 2);
}

#[tokio::test]
async fn missing_token_finishes_run_with_error() {
    let store = MemoryStore::new();
    let ebay = RecordingEbay::default();
    let shopify = FakeShopify::default();
    let listing = listing_config();

    let run_id = sync::run_product_sync(
        &store,
        &shopify,
        &ebay,
        &listing,
        "unauthed.myshopify.com",
        "manual",
        serde_json::json!({}),
    )
    .await
    .unwrap();

    let (run, logs) = store
        .get_run_with_logs("unauthed.myshopify.com", &run_id, 10)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(run.status, RunStatus::Error);
    assert_eq!(run.summary["reason"], "missing access token");
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].level, LogLevel::Error);
    assert!(ebay.inventory_calls().await.is_empty());
}

#[tokio::test]
async fn product_fetch_failure_is_captured_in_summary() {
    let store = MemoryStore::new();
    let ebay = RecordingEbay::default();
    let shopify = FakeShopify::default();
    let listing = listing_config();
    let shop = "demo.myshopify.com";

    store.set_token(shop, "tok").await.unwrap();
    shopify.fail_next().await;

    let run_id = sync::run_product_sync(
        &store,
        &shopify,
        &ebay,
        &listing,
        shop,
        "cron",
        serde_json::json!({}),
    )
    .await
    .unwrap();

    let (run, _) = store
        .get_run_with_logs(shop, &run_id, 10)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(run.status, RunStatus::Error);
    assert!(run.summary["reason"]
        .as_str()
        .unwrap()
        .contains("shopify error 503"));
}

#[tokio::test]
async fn inventory_webhook_triggers_resync_once() {
    let store = MemoryStore::new();
    let ebay = RecordingEbay::default();
    let shopify = FakeShopify::default();
    let listing = listing_config();
    let shop = "demo.myshopify.com";

    store.set_token(shop, "tok").await.unwrap();
    shopify
        .set_products(vec![product(1, "Widget", vec![variant(11, 1, Some("W-1"), 2)])])
        .await;

    let payload: shopify_ebay_bridge::shopify::InventoryLevelWebhook = serde_json::from_value(
        serde_json::json!({"inventory_item_id": 900, "available": 2, "location_id": 7}),
    )
    .unwrap();

    handlers::handle_inventory_update(
        &store, &shopify, &ebay, &listing, shop, "inv-evt-1", payload.clone(),
    )
    .await
    .unwrap();
    handlers::handle_inventory_update(
        &store, &shopify, &ebay, &listing, shop, "inv-evt-1", payload,
    )
    .await
    .unwrap();

    assert_eq!(store.list_runs(shop, 10).await.unwrap().len(), 1);
    assert_eq!(ebay.inventory_calls().await, vec!["W-1"]);
}
