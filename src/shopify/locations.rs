#![allow(non_snake_case)]

use crate::shopify::client::{ShopifyClient, ShopifyError};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

const LOCATIONS_QUERY: &str = r#"
query Locations($first: Int!, $after: String) {
  locations(first: $first, after: $after, includeInactive: true) {
    pageInfo {
      hasNextPage
      endCursor
    }
    edges {
      node {
        id
        name
        legacyResourceId
        isActive
      }
    }
  }
}
"#;

const PAGE_SIZE: u32 = 50;

/// A stock-holding location, as listed by `stocksync locations`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub id: String,
    pub name: String,
    pub legacy_resource_id: String,
    #[serde(default = "active_by_default")]
    pub is_active: bool,
}

fn active_by_default() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct LocationsData {
    locations: LocationConnection,
}

#[derive(Debug, Deserialize)]
struct LocationConnection {
    pageInfo: PageInfo,
    edges: Vec<LocationEdge>,
}

#[derive(Debug, Deserialize)]
struct PageInfo {
    hasNextPage: bool,
    #[serde(default)]
    endCursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LocationEdge {
    node: Location,
}

impl ShopifyClient {
    pub async fn list_locations(&self) -> Result<Vec<Location>, ShopifyError> {
        let mut locations = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let data = self
                .execute(
                    LOCATIONS_QUERY,
                    json!({ "first": PAGE_SIZE, "after": cursor }),
                )
                .await?;
            let (page, next) = parse_locations(data)?;
            locations.extend(page);
            match next {
                Some(next) if Some(&next) != cursor.as_ref() => cursor = Some(next),
                _ => break,
            }
        }
        Ok(locations)
    }
}

/// Returns the page and, when more pages exist, the cursor to continue from.
fn parse_locations(data: Value) -> Result<(Vec<Location>, Option<String>), ShopifyError> {
    let data: LocationsData =
        serde_json::from_value(data).map_err(|err| ShopifyError::Shape(err.to_string()))?;
    let connection = data.locations;
    let next = if connection.pageInfo.hasNextPage {
        connection.pageInfo.endCursor
    } else {
        None
    };
    Ok((
        connection.edges.into_iter().map(|edge| edge.node).collect(),
        next,
    ))
}
