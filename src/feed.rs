use reqwest::Client;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// `http(s)://` URL or a local path.
    pub source: String,
    pub delimiter: u8,
    pub sku_column: String,
    pub quantity_column: String,
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("feed request failed: {0}")]
    Request(String),
    #[error("feed file unreadable: {0}")]
    Io(#[from] std::io::Error),
    #[error("feed is not valid delimited text: {0}")]
    Csv(#[from] csv::Error),
    #[error("feed header has no `{0}` column")]
    MissingColumn(String),
}

/// One data row of the supplier feed, fields still raw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupplierRow {
    /// 1-based data row number (the header is not counted).
    pub line: u64,
    pub sku: String,
    pub quantity: String,
}

/// Parsed feed: the data rows plus the line numbers of rows left out for
/// being blank.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Feed {
    pub rows: Vec<SupplierRow>,
    pub blank_lines: Vec<u64>,
}

pub async fn fetch_feed(client: &Client, config: &FeedConfig) -> Result<Feed, FeedError> {
    let bytes = if is_remote(&config.source) {
        let response = client
            .get(&config.source)
            .send()
            .await
            .map_err(|err| FeedError::Request(err.to_string()))?;
        if !response.status().is_success() {
            return Err(FeedError::Request(format!("HTTP {}", response.status())));
        }
        response
            .bytes()
            .await
            .map_err(|err| FeedError::Request(err.to_string()))?
            .to_vec()
    } else {
        tokio::fs::read(&config.source).await?
    };
    debug!(target: "stocksync.feed", bytes = bytes.len(), source = %config.source, "feed downloaded");
    let feed = parse_feed(&bytes, config)?;
    info!(
        target: "stocksync.feed",
        rows = feed.rows.len(),
        blank = feed.blank_lines.len(),
        "feed parsed"
    );
    Ok(feed)
}

fn is_remote(source: &str) -> bool {
    let lower = source.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Rows whose cells are not valid UTF-8 are decoded lossily rather than
/// rejected; short rows yield empty fields and fail validation later.
pub fn parse_feed(bytes: &[u8], config: &FeedConfig) -> Result<Feed, FeedError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(config.delimiter)
        .flexible(true)
        .from_reader(bytes);

    let headers = reader.byte_headers()?.clone();
    let sku_idx = column_index(&headers, &config.sku_column)?;
    let qty_idx = column_index(&headers, &config.quantity_column)?;

    let mut feed = Feed::default();
    for (idx, record) in reader.byte_records().enumerate() {
        let record = record?;
        let line = idx as u64 + 1;
        if record.iter().all(|cell| cell.iter().all(u8::is_ascii_whitespace)) {
            debug!(target: "stocksync.feed", line, "blank feed row skipped");
            feed.blank_lines.push(line);
            continue;
        }
        feed.rows.push(SupplierRow {
            line,
            sku: cell(&record, sku_idx),
            quantity: cell(&record, qty_idx),
        });
    }
    Ok(feed)
}

fn column_index(headers: &csv::ByteRecord, name: &str) -> Result<usize, FeedError> {
    let wanted = name.trim();
    headers
        .iter()
        .position(|h| {
            let h = String::from_utf8_lossy(h);
            h.trim_start_matches('\u{feff}').trim().eq_ignore_ascii_case(wanted)
        })
        .ok_or_else(|| FeedError::MissingColumn(wanted.to_string()))
}

fn cell(record: &csv::ByteRecord, idx: usize) -> String {
    record
        .get(idx)
        .map(|raw| String::from_utf8_lossy(raw).into_owned())
        .unwrap_or_default()
}
