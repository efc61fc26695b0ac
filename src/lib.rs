//! Shopify→eBay bridge: OAuth-installed storefront integration that relays
//! product and inventory changes to eBay listings, keeping a small amount of
//! linkage and run-history state.

pub mod config;
pub mod ebay;
pub mod handlers;
pub mod model;
pub mod shopify;
pub mod store;
pub mod sync;
