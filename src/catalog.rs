use crate::backoff::Backoff;
use crate::shopify::ShopifyError;
use crate::sku::{NormalizationPolicy, NormalizedSku};
use serde::Serialize;
use std::{
    collections::{BTreeMap, HashMap},
    time::Instant,
};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Attempts per cursor before the listing is declared broken.
const MAX_PAGE_ATTEMPTS: u32 = 2;

/// What to keep when several variants normalize to the same SKU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// Keep every inventory item; all of them receive the update.
    #[default]
    All,
    First,
    Last,
}

impl DuplicatePolicy {
    pub fn from_raw(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "all" => Some(Self::All),
            "first" | "first_wins" | "first-wins" => Some(Self::First),
            "last" | "last_wins" | "last-wins" => Some(Self::Last),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CatalogOptions {
    pub page_size: u32,
    pub normalization: NormalizationPolicy,
    pub duplicates: DuplicatePolicy,
    /// Delay before re-requesting a page that failed once.
    pub retry: Backoff,
}

impl Default for CatalogOptions {
    fn default() -> Self {
        Self {
            page_size: 100,
            normalization: NormalizationPolicy::default(),
            duplicates: DuplicatePolicy::default(),
            retry: Backoff::default(),
        }
    }
}

/// A variant as listed by the platform. Either field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogVariant {
    pub sku: Option<String>,
    pub inventory_item_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct VariantPage {
    pub variants: Vec<CatalogVariant>,
    pub has_next_page: bool,
    pub end_cursor: Option<String>,
}

/// Cursor-paginated listing of the platform's variants.
pub trait VariantSource {
    async fn variant_page(
        &self,
        first: u32,
        after: Option<&str>,
    ) -> Result<VariantPage, ShopifyError>;
}

#[derive(Debug, Error)]
#[error("catalog page {page} failed {attempts} times in a row: {last_error}")]
pub struct PaginationError {
    pub page: usize,
    pub attempts: u32,
    pub last_error: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DuplicateSku {
    pub sku: NormalizedSku,
    pub inventory_item_ids: Vec<String>,
}

/// Normalized SKU → inventory item(s), covering the whole catalog.
#[derive(Debug, Clone)]
pub struct CatalogIndex {
    policy: NormalizationPolicy,
    entries: HashMap<NormalizedSku, Vec<String>>,
    skipped: usize,
    pages: usize,
    duplicates: BTreeMap<NormalizedSku, Vec<String>>,
}

impl CatalogIndex {
    pub fn new(policy: NormalizationPolicy) -> Self {
        Self {
            policy,
            entries: HashMap::new(),
            skipped: 0,
            pages: 0,
            duplicates: BTreeMap::new(),
        }
    }

    /// Normalizes with the index's own policy, the same one used to build it.
    pub fn normalize(&self, raw: &str) -> Option<NormalizedSku> {
        self.policy.normalize(raw)
    }

    pub fn get(&self, sku: &NormalizedSku) -> Option<&[String]> {
        self.entries.get(sku).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Variants dropped for lacking a SKU or an inventory item.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn pages(&self) -> usize {
        self.pages
    }

    /// Every SKU seen more than once, with all items that carried it.
    pub fn duplicates(&self) -> Vec<DuplicateSku> {
        self.duplicates
            .iter()
            .map(|(sku, ids)| DuplicateSku {
                sku: sku.clone(),
                inventory_item_ids: ids.clone(),
            })
            .collect()
    }

    /// Sorted `(sku, inventory_item_id)` pairs, one per kept item.
    pub fn mapping(&self) -> Vec<(&NormalizedSku, &str)> {
        let mut pairs: Vec<_> = self
            .entries
            .iter()
            .flat_map(|(sku, ids)| ids.iter().map(move |id| (sku, id.as_str())))
            .collect();
        pairs.sort();
        pairs
    }

    fn insert(&mut self, variant: CatalogVariant, policy: DuplicatePolicy) {
        let sku = variant.sku.as_deref().and_then(|raw| self.policy.normalize(raw));
        let item = variant.inventory_item_id.filter(|id| !id.trim().is_empty());
        let (Some(sku), Some(item)) = (sku, item) else {
            self.skipped += 1;
            return;
        };

        let Some(existing) = self.entries.get_mut(&sku) else {
            self.entries.insert(sku, vec![item]);
            return;
        };
        let recorded = self
            .duplicates
            .get(&sku)
            .is_some_and(|seen| seen.contains(&item));
        if recorded || existing.contains(&item) {
            return;
        }

        let seen = self
            .duplicates
            .entry(sku.clone())
            .or_insert_with(|| existing.clone());
        seen.push(item.clone());
        warn!(
            target: "stocksync.catalog",
            sku = %sku,
            inventory_item_id = %item,
            policy = ?policy,
            "duplicate sku in catalog"
        );
        match policy {
            DuplicatePolicy::All => existing.push(item),
            DuplicatePolicy::First => {}
            DuplicatePolicy::Last => *existing = vec![item],
        }
    }
}

/// Walks every catalog page and reduces it into a [`CatalogIndex`].
///
/// A failed page is retried once after `options.retry.delay(0)`. A second
/// consecutive failure aborts, since a partial index would report real SKUs
/// as missing.
pub async fn build_index<S>(source: &S, options: &CatalogOptions) -> Result<CatalogIndex, PaginationError>
where
    S: VariantSource,
{
    let mut index = CatalogIndex::new(options.normalization);
    let mut cursor: Option<String> = None;
    let started = Instant::now();

    loop {
        let page_no = index.pages + 1;
        let page = fetch_page(source, options, cursor.as_deref(), page_no).await?;
        index.pages = page_no;

        let next = page.end_cursor.clone();
        for variant in page.variants {
            index.insert(variant, options.duplicates);
        }
        if !page.has_next_page {
            break;
        }
        cursor = next;
    }

    info!(
        target: "stocksync.catalog",
        pages = index.pages,
        skus = index.len(),
        skipped = index.skipped,
        duplicates = index.duplicates.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "catalog index built"
    );
    Ok(index)
}

async fn fetch_page<S>(
    source: &S,
    options: &CatalogOptions,
    cursor: Option<&str>,
    page_no: usize,
) -> Result<VariantPage, PaginationError>
where
    S: VariantSource,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        let started = Instant::now();
        let result = source
            .variant_page(options.page_size, cursor)
            .await
            .and_then(|page| check_page(page, cursor));
        match result {
            Ok(page) => {
                crate::metrics::catalog_page(page.variants.len(), started.elapsed().as_millis());
                debug!(target: "stocksync.catalog", page = page_no, variants = page.variants.len(), "page fetched");
                return Ok(page);
            }
            Err(err) if attempt < MAX_PAGE_ATTEMPTS => {
                let delay = options.retry.delay(attempt - 1);
                warn!(
                    target: "stocksync.catalog",
                    page = page_no,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "catalog page failed, retrying"
                );
                sleep(delay).await;
            }
            Err(err) => {
                return Err(PaginationError {
                    page: page_no,
                    attempts: attempt,
                    last_error: err.to_string(),
                });
            }
        }
    }
}

fn check_page(page: VariantPage, cursor: Option<&str>) -> Result<VariantPage, ShopifyError> {
    if page.has_next_page {
        match page.end_cursor.as_deref() {
            None | Some("") => {
                return Err(ShopifyError::Shape(
                    "hasNextPage without an endCursor".into(),
                ));
            }
            Some(next) if Some(next) == cursor => {
                return Err(ShopifyError::Shape(format!("cursor {next} did not advance")));
            }
            Some(_) => {}
        }
    }
    Ok(page)
}
