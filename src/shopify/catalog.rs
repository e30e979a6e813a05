#![allow(non_snake_case)]

use crate::catalog::{CatalogVariant, VariantPage, VariantSource};
use crate::shopify::client::{ShopifyClient, ShopifyError};
use serde::Deserialize;
use serde_json::{Value, json};

const VARIANTS_QUERY: &str = r#"
query CatalogVariants($first: Int!, $after: String) {
  productVariants(first: $first, after: $after) {
    pageInfo {
      hasNextPage
      endCursor
    }
    edges {
      node {
        sku
        inventoryItem {
          id
        }
      }
    }
  }
}
"#;

#[derive(Debug, Deserialize)]
struct VariantsData {
    productVariants: VariantConnection,
}

#[derive(Debug, Deserialize)]
struct VariantConnection {
    pageInfo: PageInfo,
    edges: Vec<VariantEdge>,
}

#[derive(Debug, Deserialize)]
struct PageInfo {
    hasNextPage: bool,
    #[serde(default)]
    endCursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VariantEdge {
    node: VariantNode,
}

#[derive(Debug, Deserialize)]
struct VariantNode {
    #[serde(default)]
    sku: Option<String>,
    #[serde(default)]
    inventoryItem: Option<InventoryItemRef>,
}

#[derive(Debug, Deserialize)]
struct InventoryItemRef {
    id: String,
}

impl VariantSource for ShopifyClient {
    async fn variant_page(
        &self,
        first: u32,
        after: Option<&str>,
    ) -> Result<VariantPage, ShopifyError> {
        let data = self
            .execute(VARIANTS_QUERY, json!({ "first": first, "after": after }))
            .await?;
        parse_variant_page(data)
    }
}

fn parse_variant_page(data: Value) -> Result<VariantPage, ShopifyError> {
    let data: VariantsData =
        serde_json::from_value(data).map_err(|err| ShopifyError::Shape(err.to_string()))?;
    let connection = data.productVariants;
    Ok(VariantPage {
        variants: connection
            .edges
            .into_iter()
            .map(|edge| CatalogVariant {
                sku: edge.node.sku,
                inventory_item_id: edge.node.inventoryItem.map(|item| item.id),
            })
            .collect(),
        has_next_page: connection.pageInfo.hasNextPage,
        end_cursor: connection.pageInfo.endCursor,
    })
}
