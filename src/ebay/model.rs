use serde::{Deserialize, Serialize};

/// Body for `PUT /sell/inventory/v1/inventory_item/{sku}`.
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItem {
    pub availability: Availability,
    pub condition: String,
    pub product: ItemProduct,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Availability {
    pub ship_to_location_availability: ShipToLocationAvailability,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ShipToLocationAvailability {
    pub quantity: i64,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ItemProduct {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl InventoryItem {
    pub fn new(title: &str, description: Option<&str>, quantity: i64) -> Self {
        Self {
            availability: Availability {
                ship_to_location_availability: ShipToLocationAvailability { quantity },
            },
            condition: "NEW".to_string(),
            product: ItemProduct {
                title: title.to_string(),
                description: description.map(str::to_string),
            },
        }
    }
}

/// Body for offer create/update.
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Offer {
    pub sku: String,
    pub marketplace_id: String,
    pub format: String,
    pub available_quantity: i64,
    pub category_id: String,
    pub merchant_location_key: String,
    pub listing_policies: ListingPolicies,
    pub pricing_summary: PricingSummary,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ListingPolicies {
    pub fulfillment_policy_id: String,
    pub payment_policy_id: String,
    pub return_policy_id: String,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PricingSummary {
    pub price: Amount,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Amount {
    pub value: String,
    pub currency: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreateOfferResp {
    pub offer_id: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PublishOfferResp {
    pub listing_id: String,
}
