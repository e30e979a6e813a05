#![allow(non_snake_case)]

use crate::reconcile::{InventoryWriter, QuantityChange};
use crate::shopify::client::{ShopifyClient, ShopifyError, UserError};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use serde_with::skip_serializing_none;

const AVAILABLE: &str = "available";
const REASON: &str = "correction";

const SET_QUANTITIES_MUTATION: &str = r#"
mutation SetAvailable($input: InventorySetQuantitiesInput!) {
  inventorySetQuantities(input: $input) {
    inventoryAdjustmentGroup {
      createdAt
    }
    userErrors {
      field
      message
      code
    }
  }
}
"#;

const ADJUST_QUANTITIES_MUTATION: &str = r#"
mutation AdjustAvailable($input: InventoryAdjustQuantitiesInput!) {
  inventoryAdjustQuantities(input: $input) {
    inventoryAdjustmentGroup {
      createdAt
    }
    userErrors {
      field
      message
      code
    }
  }
}
"#;

#[skip_serializing_none]
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SetQuantitiesInput<'a> {
    name: &'static str,
    reason: &'static str,
    ignore_compare_quantity: bool,
    reference_document_uri: Option<&'a str>,
    quantities: Vec<SetQuantity<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SetQuantity<'a> {
    inventory_item_id: &'a str,
    location_id: &'a str,
    quantity: i64,
}

#[skip_serializing_none]
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AdjustQuantitiesInput<'a> {
    name: &'static str,
    reason: &'static str,
    reference_document_uri: Option<&'a str>,
    changes: Vec<AdjustChange<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AdjustChange<'a> {
    inventory_item_id: &'a str,
    location_id: &'a str,
    delta: i64,
}

#[derive(Debug, Deserialize)]
struct MutationPayload {
    #[serde(default)]
    userErrors: Vec<UserError>,
}

impl ShopifyClient {
    fn set_input<'a>(&'a self, change: &'a QuantityChange) -> SetQuantitiesInput<'a> {
        SetQuantitiesInput {
            name: AVAILABLE,
            reason: REASON,
            ignore_compare_quantity: true,
            reference_document_uri: self.reference_document_uri.as_deref(),
            quantities: vec![SetQuantity {
                inventory_item_id: &change.inventory_item_id,
                location_id: &change.location_id,
                quantity: change.quantity,
            }],
        }
    }

    fn adjust_input<'a>(&'a self, change: &'a QuantityChange) -> AdjustQuantitiesInput<'a> {
        AdjustQuantitiesInput {
            name: AVAILABLE,
            reason: REASON,
            reference_document_uri: self.reference_document_uri.as_deref(),
            changes: vec![AdjustChange {
                inventory_item_id: &change.inventory_item_id,
                location_id: &change.location_id,
                delta: change.quantity,
            }],
        }
    }
}

impl InventoryWriter for ShopifyClient {
    async fn set_available(&self, change: &QuantityChange) -> Result<(), ShopifyError> {
        let data = self
            .execute(
                SET_QUANTITIES_MUTATION,
                json!({ "input": self.set_input(change) }),
            )
            .await?;
        check_mutation(&data, "inventorySetQuantities")
    }

    async fn adjust_available(&self, change: &QuantityChange) -> Result<(), ShopifyError> {
        let data = self
            .execute(
                ADJUST_QUANTITIES_MUTATION,
                json!({ "input": self.adjust_input(change) }),
            )
            .await?;
        check_mutation(&data, "inventoryAdjustQuantities")
    }
}

fn check_mutation(data: &Value, field: &str) -> Result<(), ShopifyError> {
    let payload = data
        .get(field)
        .filter(|v| !v.is_null())
        .ok_or_else(|| ShopifyError::Shape(format!("missing `{field}` payload")))?;
    let payload: MutationPayload = serde_json::from_value(payload.clone())
        .map_err(|err| ShopifyError::Shape(err.to_string()))?;
    if payload.userErrors.is_empty() {
        Ok(())
    } else {
        Err(ShopifyError::UserErrors(payload.userErrors))
    }
}
