use anyhow::Result;
use clap::Parser;
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};

use shopify_ebay_bridge::ebay::EbayClient;
use shopify_ebay_bridge::shopify::{ShopifyClient, ShopifyService};
use shopify_ebay_bridge::{config, store, sync};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;

    // A configured-but-broken database aborts startup here; only a missing
    // URL downgrades to the in-memory store.
    let store = store::connect(cfg.database_url().as_deref()).await?;

    let shopify = ShopifyClient::new(cfg.shopify.api_version.clone());
    let ebay = EbayClient::new(&cfg.ebay.api_base, cfg.ebay.token.clone())?;

    // Best-effort webhook (re-)registration for shops that already have a
    // token; registering an existing subscription is a no-op on the API side.
    if let Some(address) = &cfg.app.webhook_address {
        for shop in &cfg.app.shops {
            let Some(token) = store.get_token(shop).await? else {
                info!(%shop, "no token stored; skipping webhook registration");
                continue;
            };
            for topic in ["products/update", "inventory_levels/update"] {
                if let Err(err) = shopify.register_webhook(shop, &token, topic, address).await {
                    error!(?err, %shop, topic, "failed to register webhook");
                }
            }
        }
    }

    info!(shops = cfg.app.shops.len(), "starting periodic sync loop");
    let interval = Duration::from_secs(cfg.app.sync_interval_secs);
    loop {
        for shop in &cfg.app.shops {
            match sync::run_product_sync(
                store.as_ref(),
                &shopify,
                &ebay,
                &cfg.ebay,
                shop,
                "cron",
                json!({}),
            )
            .await
            {
                Ok(run_id) => info!(%shop, %run_id, "cron sync run recorded"),
                Err(err) => error!(?err, %shop, "cron sync failed"),
            }
        }
        tokio::time::sleep(interval).await;
    }
}
