//! Webhook entry points.
//!
//! Payloads arrive already HMAC-verified and parsed by the HTTP edge. Each
//! handler is guarded by the dedup ledger: the event id is checked before any
//! externally visible side effect and marked after, so redeliveries are
//! harmless no-ops. The coupling is best-effort, not exactly-once — a crash
//! between the side effects and `mark_processed` means one redelivered
//! duplicate sync, which the upsert-based relay tolerates.
//!
//! Downstream failures finish the run with status `error` and return `Ok`,
//! so the caller can ack the delivery instead of provoking a redelivery loop.

use crate::config;
use crate::ebay::EbayService;
use crate::model::RunStatus;
use crate::shopify::{InventoryLevelWebhook, Product, ProductWebhook, ShopifyService};
use crate::store::Store;
use crate::sync;
use anyhow::Result;
use serde_json::json;
use tracing::{info, instrument};

impl From<ProductWebhook> for Product {
    fn from(p: ProductWebhook) -> Self {
        Product {
            id: p.id,
            title: p.title,
            body_html: None,
            variants: p.variants,
        }
    }
}

/// Handle a `products/create` or `products/update` delivery by relaying the
/// product's variants to eBay under a webhook-triggered run.
#[instrument(skip_all, fields(%shop, event_id))]
pub async fn handle_product_update(
    store: &dyn Store,
    ebay: &dyn EbayService,
    listing: &config::Ebay,
    shop: &str,
    event_id: &str,
    payload: ProductWebhook,
) -> Result<()> {
    if store.is_processed(event_id).await? {
        info!("event already processed; skipping");
        return Ok(());
    }

    let product: Product = payload.into();
    let run_id = store
        .create_run(
            shop,
            "webhook",
            json!({"event_id": event_id, "product_id": product.id}),
        )
        .await?;

    let mut synced = 0u64;
    let mut failed = 0u64;
    let mut skipped = 0u64;
    for variant in &product.variants {
        match sync::publish_variant(store, ebay, listing, shop, &product, variant, &run_id).await? {
            sync::VariantOutcome::Synced => synced += 1,
            sync::VariantOutcome::Skipped => skipped += 1,
            sync::VariantOutcome::Failed => failed += 1,
        }
    }

    let status = if failed > 0 {
        RunStatus::Error
    } else {
        RunStatus::Success
    };
    store
        .finish_run(
            &run_id,
            status,
            json!({"synced": synced, "failed": failed, "skipped": skipped}),
        )
        .await?;

    store.mark_processed(event_id).await?;
    Ok(())
}

/// Handle an `inventory_levels/update` delivery. The payload does not carry
/// a SKU, so the handler resyncs the shop's products, which refreshes the
/// affected quantities along the way.
#[instrument(skip_all, fields(%shop, event_id))]
pub async fn handle_inventory_update(
    store: &dyn Store,
    shopify: &dyn ShopifyService,
    ebay: &dyn EbayService,
    listing: &config::Ebay,
    shop: &str,
    event_id: &str,
    payload: InventoryLevelWebhook,
) -> Result<()> {
    if store.is_processed(event_id).await? {
        info!("event already processed; skipping");
        return Ok(());
    }

    let _run_id = sync::run_product_sync(
        store,
        shopify,
        ebay,
        listing,
        shop,
        "webhook",
        json!({
            "event_id": event_id,
            "inventory_item_id": payload.inventory_item_id,
            "location_id": payload.location_id,
            "available": payload.available,
        }),
    )
    .await?;

    store.mark_processed(event_id).await?;
    Ok(())
}
