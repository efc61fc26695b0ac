//! Relay pipeline: Shopify products/variants out to eBay listings.
//!
//! Every sync is wrapped in a run so the dashboard can replay what happened.
//! The pipeline records a log entry per step and finishes the run itself;
//! downstream API failures never escape as errors from `run_product_sync` —
//! they end up in the run's logs and summary instead.

use crate::config;
use crate::ebay::model::{InventoryItem, Offer};
use crate::ebay::{Amount, EbayService, ListingPolicies, PricingSummary};
use crate::model::{LinkUpsert, LogLevel, RunStatus};
use crate::shopify::{Product, ShopifyService, Variant};
use crate::store::Store;
use anyhow::Result;
use serde_json::{json, Value};
use tracing::{info, instrument, warn};

/// Result of relaying one variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantOutcome {
    Synced,
    Skipped,
    Failed,
}

fn build_offer(listing: &config::Ebay, sku: &str, variant: &Variant) -> Offer {
    Offer {
        sku: sku.to_string(),
        marketplace_id: listing.marketplace_id.clone(),
        format: "FIXED_PRICE".to_string(),
        available_quantity: variant.inventory_quantity.max(0),
        category_id: listing.category_id.clone(),
        merchant_location_key: listing.merchant_location_key.clone(),
        listing_policies: ListingPolicies {
            fulfillment_policy_id: listing.fulfillment_policy_id.clone(),
            payment_policy_id: listing.payment_policy_id.clone(),
            return_policy_id: listing.return_policy_id.clone(),
        },
        pricing_summary: PricingSummary {
            price: Amount {
                value: variant.price.clone(),
                currency: listing.currency.clone(),
            },
        },
    }
}

struct Relayed {
    offer_id: String,
    listing_id: Option<String>,
    published: bool,
}

/// The eBay leg: inventory item upsert, then offer update when the link
/// already has an offer, else offer create + publish.
async fn relay_to_ebay(
    ebay: &dyn EbayService,
    listing: &config::Ebay,
    sku: &str,
    item: &InventoryItem,
    variant: &Variant,
    existing_offer_id: Option<&str>,
) -> Result<Relayed> {
    ebay.upsert_inventory_item(sku, item).await?;
    let offer = build_offer(listing, sku, variant);
    match existing_offer_id {
        Some(offer_id) => {
            ebay.update_offer(offer_id, &offer).await?;
            Ok(Relayed {
                offer_id: offer_id.to_string(),
                listing_id: None,
                published: false,
            })
        }
        None => {
            let offer_id = ebay.create_offer(&offer).await?;
            let listing_id = ebay.publish_offer(&offer_id).await?;
            Ok(Relayed {
                offer_id,
                listing_id: Some(listing_id),
                published: true,
            })
        }
    }
}

/// Relay one variant and record the outcome in the link registry and the
/// run's log. Only storage failures propagate; eBay failures are folded into
/// the link's `last_error` and an error-level log entry.
#[instrument(skip_all, fields(sku = variant.sku.as_deref().unwrap_or("")))]
pub async fn publish_variant(
    store: &dyn Store,
    ebay: &dyn EbayService,
    listing: &config::Ebay,
    shop: &str,
    product: &Product,
    variant: &Variant,
    run_id: &str,
) -> Result<VariantOutcome> {
    let Some(sku) = variant.sku.as_deref().filter(|s| !s.is_empty()) else {
        store
            .add_log(
                run_id,
                LogLevel::Warn,
                &format!("variant {} has no sku; skipped", variant.id),
                None,
            )
            .await?;
        return Ok(VariantOutcome::Skipped);
    };

    let item = InventoryItem::new(
        &product.title,
        product.body_html.as_deref(),
        variant.inventory_quantity.max(0),
    );
    let existing = store.get_link_by_sku(shop, sku).await?;
    let existing_offer_id = existing.as_ref().and_then(|l| l.ebay_offer_id.as_deref());

    match relay_to_ebay(ebay, listing, sku, &item, variant, existing_offer_id).await {
        Ok(relayed) => {
            store
                .upsert_link(&LinkUpsert {
                    shop: shop.to_string(),
                    sku: sku.to_string(),
                    product_id: product.id,
                    variant_id: variant.id,
                    ebay_offer_id: Some(relayed.offer_id.clone()),
                    ebay_listing_id: relayed.listing_id.clone(),
                    status: Some("published".to_string()),
                    last_error: None,
                })
                .await?;
            let action = if relayed.published { "published" } else { "updated" };
            store
                .add_log(
                    run_id,
                    LogLevel::Info,
                    &format!("{action} offer for {sku}"),
                    Some(json!({
                        "offer_id": relayed.offer_id,
                        "listing_id": relayed.listing_id,
                    })),
                )
                .await?;
            Ok(VariantOutcome::Synced)
        }
        Err(err) => {
            // Keep the full error chain; the dashboard shows this verbatim.
            let detail = format!("{err:#}");
            warn!(%shop, sku, error = %detail, "variant relay failed");
            store
                .upsert_link(&LinkUpsert {
                    shop: shop.to_string(),
                    sku: sku.to_string(),
                    product_id: product.id,
                    variant_id: variant.id,
                    ebay_offer_id: None,
                    ebay_listing_id: None,
                    status: None,
                    last_error: Some(detail.clone()),
                })
                .await?;
            store
                .add_log(
                    run_id,
                    LogLevel::Error,
                    &format!("failed to sync {sku}: {detail}"),
                    None,
                )
                .await?;
            Ok(VariantOutcome::Failed)
        }
    }
}

/// Full product sync for one shop: create a run, relay every variant, finish
/// the run with a `{"synced", "failed", "skipped"}` summary. Returns the run
/// id; the run itself carries success or failure.
#[instrument(skip_all, fields(%shop, trigger))]
pub async fn run_product_sync(
    store: &dyn Store,
    shopify: &dyn ShopifyService,
    ebay: &dyn EbayService,
    listing: &config::Ebay,
    shop: &str,
    trigger: &str,
    initial_summary: Value,
) -> Result<String> {
    let run_id = store.create_run(shop, trigger, initial_summary).await?;

    let Some(token) = store.get_token(shop).await? else {
        store
            .add_log(&run_id, LogLevel::Error, "no access token stored for shop", None)
            .await?;
        store
            .finish_run(
                &run_id,
                RunStatus::Error,
                json!({"reason": "missing access token"}),
            )
            .await?;
        return Ok(run_id);
    };

    let products = match shopify.list_products(shop, &token).await {
        Ok(products) => products,
        Err(err) => {
            let detail = format!("{err:#}");
            store
                .add_log(
                    &run_id,
                    LogLevel::Error,
                    &format!("failed to fetch products: {detail}"),
                    None,
                )
                .await?;
            store
                .finish_run(&run_id, RunStatus::Error, json!({"reason": detail}))
                .await?;
            return Ok(run_id);
        }
    };

    store
        .add_log(
            &run_id,
            LogLevel::Info,
            &format!("fetched {} products", products.len()),
            None,
        )
        .await?;

    let mut synced = 0u64;
    let mut failed = 0u64;
    let mut skipped = 0u64;
    for product in &products {
        for variant in &product.variants {
            match publish_variant(store, ebay, listing, shop, product, variant, &run_id).await? {
                VariantOutcome::Synced => synced += 1,
                VariantOutcome::Skipped => skipped += 1,
                VariantOutcome::Failed => failed += 1,
            }
        }
    }

    let status = if failed > 0 {
        RunStatus::Error
    } else {
        RunStatus::Success
    };
    let summary = json!({"synced": synced, "failed": failed, "skipped": skipped});
    store.finish_run(&run_id, status, summary).await?;
    info!(%shop, %run_id, synced, failed, skipped, "product sync finished");
    Ok(run_id)
}
