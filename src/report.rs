use crate::catalog::{CatalogIndex, DuplicateSku};
use crate::feed::Feed;
use crate::reconcile::{RecordOutcome, Summary, UpdateMode};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{fs, io, path::Path};
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct CatalogStats {
    pub pages: usize,
    pub skus: usize,
    pub skipped: usize,
    pub duplicates: Vec<DuplicateSku>,
}

impl CatalogStats {
    pub fn of(index: &CatalogIndex) -> Self {
        Self {
            pages: index.pages(),
            skus: index.len(),
            skipped: index.skipped(),
            duplicates: index.duplicates(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FeedStats {
    pub rows: usize,
    /// Data rows left out for holding nothing but whitespace.
    pub blank_lines: Vec<u64>,
}

impl FeedStats {
    pub fn of(feed: &Feed) -> Self {
        Self {
            rows: feed.rows.len(),
            blank_lines: feed.blank_lines.clone(),
        }
    }
}

/// Everything one `sync` run did, written as JSON on request.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub location_id: String,
    pub mode: UpdateMode,
    pub feed: FeedStats,
    pub catalog: CatalogStats,
    pub summary: Summary,
    pub outcomes: Vec<RecordOutcome>,
}

impl RunReport {
    pub fn write_to(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(self).map_err(io::Error::other)?;
        fs::write(path, json)
    }
}

/// Writes `sku,inventory_item_id` rows, one per indexed item.
pub fn write_mapping<W: io::Write>(index: &CatalogIndex, out: W) -> Result<usize, csv::Error> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(["sku", "inventory_item_id"])?;
    let mapping = index.mapping();
    for (sku, item) in &mapping {
        writer.write_record([sku.as_str(), *item])?;
    }
    writer.flush()?;
    Ok(mapping.len())
}
