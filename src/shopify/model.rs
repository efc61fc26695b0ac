use serde::Deserialize;

/// Product as returned by the Admin REST API (fields we consume).
#[derive(Deserialize, Debug, Clone)]
pub struct Product {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub body_html: Option<String>,
    #[serde(default)]
    pub variants: Vec<Variant>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Variant {
    pub id: i64,
    pub product_id: i64,
    #[serde(default)]
    pub sku: Option<String>,
    pub price: String,
    #[serde(default)]
    pub inventory_quantity: i64,
}

#[derive(Deserialize, Debug)]
pub struct ProductsResp {
    pub products: Vec<Product>,
}

#[derive(Deserialize, Debug)]
pub struct WebhookResp {
    pub webhook: Webhook,
}

#[derive(Deserialize, Debug)]
pub struct Webhook {
    pub id: i64,
    pub topic: String,
}

/// Payload of a `products/update` (or `products/create`) webhook, already
/// HMAC-verified and parsed by the HTTP layer.
#[derive(Deserialize, Debug, Clone)]
pub struct ProductWebhook {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub variants: Vec<Variant>,
}

/// Payload of an `inventory_levels/update` webhook.
#[derive(Deserialize, Debug, Clone)]
pub struct InventoryLevelWebhook {
    pub inventory_item_id: i64,
    pub available: i64,
    pub location_id: i64,
}
