use crate::backoff::Backoff;
use crate::catalog::{CatalogOptions, DuplicatePolicy};
use crate::feed::FeedConfig;
use crate::reconcile::{QuantityPolicy, ReconcileOptions, UpdateMode};
use crate::sku::NormalizationPolicy;
use std::{path::PathBuf, str::FromStr, time::Duration};
use thiserror::Error;

pub const DEFAULT_API_VERSION: &str = "2025-07";
const MAX_PAGE_SIZE: u32 = 250;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: &'static str,
    },
}

/// Store access shared by every subcommand.
#[derive(Debug, Clone)]
pub struct ShopConfig {
    /// Bare shop domain, e.g. `example.myshopify.com`.
    pub store: String,
    pub api_version: String,
    pub access_token: String,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpConfig {
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl ShopConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let store = required(&lookup, "SHOPIFY_STORE_URL")?;
        let store = store
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/')
            .to_string();
        if store.is_empty() || store.contains('/') {
            return Err(ConfigError::Invalid {
                key: "SHOPIFY_STORE_URL",
                value: store,
                reason: "expected a bare shop domain",
            });
        }
        let api_version = optional(&lookup, "SHOPIFY_API_VERSION")
            .unwrap_or_else(|| DEFAULT_API_VERSION.to_string());
        let access_token = required(&lookup, "SHOPIFY_ACCESS_TOKEN")?;
        let http = HttpConfig {
            timeout: Duration::from_secs(parse_or(&lookup, "HTTP_TIMEOUT_SECS", 15u64)?),
            connect_timeout: Duration::from_secs(parse_or(
                &lookup,
                "HTTP_CONNECT_TIMEOUT_SECS",
                5u64,
            )?),
        };
        Ok(Self {
            store,
            api_version,
            access_token,
            http,
        })
    }

    pub fn graphql_url(&self) -> String {
        format!(
            "https://{}/admin/api/{}/graphql.json",
            self.store, self.api_version
        )
    }
}

/// Everything a `sync` run needs, built once at startup.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub shop: ShopConfig,
    /// Location GID every update targets.
    pub location_id: String,
    pub feed: FeedConfig,
    pub catalog: CatalogOptions,
    pub reconcile: ReconcileOptions,
    pub report_path: Option<PathBuf>,
}

impl SyncConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let shop = ShopConfig::from_lookup(&lookup)?;
        let location_id = location_gid(&required(&lookup, "SHOPIFY_LOCATION_ID")?)?;
        let feed = feed_config(&lookup)?;
        let catalog = catalog_options(&lookup)?;
        let reconcile = reconcile_options(&lookup)?;
        Ok(Self {
            shop,
            location_id,
            feed,
            catalog,
            reconcile,
            report_path: optional(&lookup, "SYNC_REPORT_PATH").map(PathBuf::from),
        })
    }
}

/// Catalog-only settings for `export-mapping`, which needs no feed or location.
pub fn catalog_options_from_env() -> Result<CatalogOptions, ConfigError> {
    catalog_options(&env_lookup)
}

fn feed_config<F>(lookup: &F) -> Result<FeedConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let source = required(lookup, "CSV_FILE_URL")?;
    let delimiter = match optional(lookup, "FEED_DELIMITER") {
        Some(raw) => parse_delimiter(&raw).ok_or(ConfigError::Invalid {
            key: "FEED_DELIMITER",
            value: raw,
            reason: "expected a single ASCII character or `tab`",
        })?,
        None => b'\t',
    };
    Ok(FeedConfig {
        source,
        delimiter,
        sku_column: optional(lookup, "FEED_SKU_COLUMN").unwrap_or_else(|| "product_sku".into()),
        quantity_column: optional(lookup, "FEED_QUANTITY_COLUMN")
            .unwrap_or_else(|| "actual_stock_level".into()),
    })
}

fn catalog_options<F>(lookup: &F) -> Result<CatalogOptions, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let page_size: u32 = parse_or(lookup, "CATALOG_PAGE_SIZE", 100)?;
    if page_size == 0 {
        return Err(ConfigError::Invalid {
            key: "CATALOG_PAGE_SIZE",
            value: page_size.to_string(),
            reason: "must be at least 1",
        });
    }
    Ok(CatalogOptions {
        page_size: page_size.min(MAX_PAGE_SIZE),
        normalization: choice(
            lookup,
            "SKU_NORMALIZATION",
            NormalizationPolicy::from_raw,
            "expected upper, lower, compact or exact",
        )?
        .unwrap_or_default(),
        duplicates: choice(
            lookup,
            "DUPLICATE_SKU_POLICY",
            DuplicatePolicy::from_raw,
            "expected all, first or last",
        )?
        .unwrap_or_default(),
        retry: pacing(lookup)?,
    })
}

fn reconcile_options<F>(lookup: &F) -> Result<ReconcileOptions, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let batch_size: usize = parse_or(lookup, "SYNC_BATCH_SIZE", 50)?;
    let max_in_flight: usize = parse_or(lookup, "SYNC_MAX_IN_FLIGHT", 1)?;
    if batch_size == 0 {
        return Err(ConfigError::Invalid {
            key: "SYNC_BATCH_SIZE",
            value: "0".into(),
            reason: "must be at least 1",
        });
    }
    if max_in_flight == 0 {
        return Err(ConfigError::Invalid {
            key: "SYNC_MAX_IN_FLIGHT",
            value: "0".into(),
            reason: "must be at least 1",
        });
    }
    Ok(ReconcileOptions {
        batch_size,
        max_in_flight,
        quantity_policy: choice(
            lookup,
            "QUANTITY_POLICY",
            QuantityPolicy::from_raw,
            "expected skip or zero",
        )?
        .unwrap_or_default(),
        mode: choice(
            lookup,
            "UPDATE_MODE",
            UpdateMode::from_raw,
            "expected set or adjust",
        )?
        .unwrap_or_default(),
        pacing: pacing(lookup)?,
    })
}

fn pacing<F>(lookup: &F) -> Result<Backoff, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let base: u64 = parse_or(lookup, "SYNC_BATCH_PAUSE_MS", 500)?;
    let max: u64 = parse_or(lookup, "SYNC_BACKOFF_MAX_MS", 30_000)?;
    Ok(Backoff::new(
        Duration::from_millis(base),
        Duration::from_millis(max),
    ))
}

/// Accepts a location GID or the numeric legacy id shown in the admin.
pub fn location_gid(raw: &str) -> Result<String, ConfigError> {
    let raw = raw.trim();
    if raw.starts_with("gid://shopify/Location/") {
        return Ok(raw.to_string());
    }
    if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
        return Ok(format!("gid://shopify/Location/{raw}"));
    }
    Err(ConfigError::Invalid {
        key: "SHOPIFY_LOCATION_ID",
        value: raw.to_string(),
        reason: "expected a numeric id or a Location GID",
    })
}

fn parse_delimiter(raw: &str) -> Option<u8> {
    match raw {
        "tab" | "TAB" | "\\t" => Some(b'\t'),
        other if other.len() == 1 && other.is_ascii() => other.bytes().next(),
        _ => None,
    }
}

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn optional<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).filter(|v| !v.trim().is_empty())
}

fn required<F>(lookup: &F, key: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    optional(lookup, key)
        .map(|v| v.trim().to_string())
        .ok_or(ConfigError::Missing(key))
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match optional(lookup, key) {
        Some(raw) => raw.trim().parse::<T>().map_err(|_| ConfigError::Invalid {
            key,
            value: raw,
            reason: "not a valid number",
        }),
        None => Ok(default),
    }
}

fn choice<F, T>(
    lookup: &F,
    key: &'static str,
    parse: fn(&str) -> Option<T>,
    reason: &'static str,
) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match optional(lookup, key) {
        Some(raw) => parse(&raw)
            .map(Some)
            .ok_or(ConfigError::Invalid { key, value: raw, reason }),
        None => Ok(None),
    }
}
