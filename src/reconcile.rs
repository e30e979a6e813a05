use crate::backoff::Backoff;
use crate::catalog::CatalogIndex;
use crate::feed::SupplierRow;
use crate::shopify::ShopifyError;
use crate::sku::NormalizedSku;
use futures::{StreamExt, stream};
use serde::Serialize;
use serde_with::{DisplayFromStr, serde_as};
use std::{fmt, time::Instant};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// What to do with a quantity that is not a usable number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuantityPolicy {
    /// Report the row as invalid and leave the platform untouched.
    #[default]
    Skip,
    /// Set the stock to 0. Only meaningful for absolute updates.
    Zero,
}

impl QuantityPolicy {
    pub fn from_raw(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "skip" => Some(Self::Skip),
            "zero" | "coerce" => Some(Self::Zero),
            _ => None,
        }
    }
}

/// How feed quantities are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateMode {
    /// Replace the available quantity. Re-running converges on the same state.
    #[default]
    Set,
    /// Treat the feed quantity as a signed delta. Not idempotent.
    Adjust,
}

impl UpdateMode {
    pub fn from_raw(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "set" | "absolute" => Some(Self::Set),
            "adjust" | "delta" => Some(Self::Adjust),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    pub batch_size: usize,
    pub max_in_flight: usize,
    pub quantity_policy: QuantityPolicy,
    pub mode: UpdateMode,
    /// `delay(n)` is the pause before a batch, `n` being the number of
    /// consecutive preceding batches that were throttled.
    pub pacing: Backoff,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            batch_size: 50,
            max_in_flight: 1,
            quantity_policy: QuantityPolicy::default(),
            mode: UpdateMode::default(),
            pacing: Backoff::default(),
        }
    }
}

/// One inventory write at the run's location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantityChange {
    pub inventory_item_id: String,
    pub location_id: String,
    /// Absolute quantity for [`InventoryWriter::set_available`], delta for
    /// [`InventoryWriter::adjust_available`].
    pub quantity: i64,
}

pub trait InventoryWriter {
    async fn set_available(&self, change: &QuantityChange) -> Result<(), ShopifyError>;
    async fn adjust_available(&self, change: &QuantityChange) -> Result<(), ShopifyError>;
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("sku is empty")]
    MissingSku,
    #[error("quantity {0:?} is not a number")]
    NotANumber(String),
    #[error("quantity {0} is negative")]
    Negative(i64),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UpdateError {
    #[error("{0}")]
    Transport(String),
    #[error("throttled")]
    Throttled,
    #[error("{0}")]
    Rejected(String),
}

impl From<ShopifyError> for UpdateError {
    fn from(err: ShopifyError) -> Self {
        match err {
            ShopifyError::Throttled => Self::Throttled,
            ShopifyError::UserErrors(_) | ShopifyError::GraphQl(_) => Self::Rejected(err.to_string()),
            other => Self::Transport(other.to_string()),
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub inventory_item_id: String,
    #[serde_as(as = "DisplayFromStr")]
    pub error: UpdateError,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Updated {
        quantity: i64,
        inventory_item_ids: Vec<String>,
    },
    NotFoundInCatalog,
    Invalid {
        #[serde_as(as = "DisplayFromStr")]
        reason: RecordError,
    },
    UpdateFailed {
        failures: Vec<ItemFailure>,
    },
}

impl Outcome {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Updated { .. } => "updated",
            Self::NotFoundInCatalog => "not_found",
            Self::Invalid { .. } => "invalid",
            Self::UpdateFailed { .. } => "failed",
        }
    }

    fn throttled(&self) -> bool {
        matches!(self, Self::UpdateFailed { failures }
            if failures.iter().any(|f| f.error == UpdateError::Throttled))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordOutcome {
    pub line: u64,
    pub sku: String,
    pub normalized_sku: Option<NormalizedSku>,
    #[serde(flatten)]
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub updated: usize,
    pub not_found: usize,
    pub invalid: usize,
    pub failed: usize,
}

impl Summary {
    pub fn from_outcomes(outcomes: &[RecordOutcome]) -> Self {
        let mut summary = Self::default();
        for record in outcomes {
            match record.outcome {
                Outcome::Updated { .. } => summary.updated += 1,
                Outcome::NotFoundInCatalog => summary.not_found += 1,
                Outcome::Invalid { .. } => summary.invalid += 1,
                Outcome::UpdateFailed { .. } => summary.failed += 1,
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.updated + self.not_found + self.invalid + self.failed
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "updated={} not_found={} invalid={} failed={}",
            self.updated, self.not_found, self.invalid, self.failed
        )
    }
}

/// Matches supplier rows against the catalog index and writes quantities.
pub struct Reconciler<'a, W> {
    writer: &'a W,
    index: &'a CatalogIndex,
    location_id: &'a str,
    options: &'a ReconcileOptions,
}

impl<'a, W> Reconciler<'a, W>
where
    W: InventoryWriter,
{
    pub fn new(
        writer: &'a W,
        index: &'a CatalogIndex,
        location_id: &'a str,
        options: &'a ReconcileOptions,
    ) -> Self {
        Self {
            writer,
            index,
            location_id,
            options,
        }
    }

    /// Produces one outcome per row, in feed order. A failing row never stops
    /// the run.
    pub async fn run(&self, rows: &[SupplierRow]) -> Vec<RecordOutcome> {
        let mut outcomes = Vec::with_capacity(rows.len());
        let mut throttled_streak = 0u32;
        let batch_size = self.options.batch_size.max(1);

        for (batch_no, batch) in rows.chunks(batch_size).enumerate() {
            if batch_no > 0 {
                let pause = self.options.pacing.delay(throttled_streak);
                if !pause.is_zero() {
                    debug!(target: "stocksync.sync", batch = batch_no, pause_ms = pause.as_millis() as u64, "pacing");
                    sleep(pause).await;
                }
            }

            let started = Instant::now();
            let results: Vec<RecordOutcome> = stream::iter(batch)
                .map(|row| self.reconcile_row(row))
                .buffered(self.options.max_in_flight.max(1))
                .collect()
                .await;
            crate::metrics::batch_elapsed(batch_no, started.elapsed().as_millis());

            if results.iter().any(|r| r.outcome.throttled()) {
                throttled_streak = throttled_streak.saturating_add(1);
            } else {
                throttled_streak = 0;
            }
            outcomes.extend(results);
        }
        outcomes
    }

    async fn reconcile_row(&self, row: &SupplierRow) -> RecordOutcome {
        let normalized = self.index.normalize(&row.sku);
        let outcome = match &normalized {
            None => Outcome::Invalid {
                reason: RecordError::MissingSku,
            },
            Some(sku) => match self.index.get(sku) {
                None => Outcome::NotFoundInCatalog,
                Some(items) => match self.resolve_quantity(row) {
                    Err(reason) => Outcome::Invalid { reason },
                    Ok(quantity) => self.apply(items, quantity).await,
                },
            },
        };
        crate::metrics::inc_outcome(outcome.kind());
        log_outcome(row, &outcome);
        RecordOutcome {
            line: row.line,
            sku: row.sku.clone(),
            normalized_sku: normalized,
            outcome,
        }
    }

    fn resolve_quantity(&self, row: &SupplierRow) -> Result<i64, RecordError> {
        let parsed = parse_quantity(&row.quantity).and_then(|quantity| match self.options.mode {
            UpdateMode::Set if quantity < 0 => Err(RecordError::Negative(quantity)),
            _ => Ok(quantity),
        });
        match parsed {
            Err(err)
                if self.options.quantity_policy == QuantityPolicy::Zero
                    && self.options.mode == UpdateMode::Set =>
            {
                warn!(
                    target: "stocksync.sync",
                    line = row.line,
                    sku = %row.sku,
                    error = %err,
                    "quantity coerced to 0"
                );
                Ok(0)
            }
            other => other,
        }
    }

    async fn apply(&self, items: &[String], quantity: i64) -> Outcome {
        let mut failures = Vec::new();
        for item in items {
            let change = QuantityChange {
                inventory_item_id: item.clone(),
                location_id: self.location_id.to_string(),
                quantity,
            };
            let result = match self.options.mode {
                UpdateMode::Set => self.writer.set_available(&change).await,
                UpdateMode::Adjust => self.writer.adjust_available(&change).await,
            };
            if let Err(err) = result {
                failures.push(ItemFailure {
                    inventory_item_id: item.clone(),
                    error: err.into(),
                });
            }
        }
        if failures.is_empty() {
            Outcome::Updated {
                quantity,
                inventory_item_ids: items.to_vec(),
            }
        } else {
            Outcome::UpdateFailed { failures }
        }
    }
}

/// Parses integers and decimal text such as `"12.0"`, truncating toward zero.
pub fn parse_quantity(raw: &str) -> Result<i64, RecordError> {
    let trimmed = raw.trim();
    if let Ok(value) = trimmed.parse::<i64>() {
        return Ok(value);
    }
    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() && value.abs() < i64::MAX as f64 => Ok(value.trunc() as i64),
        _ => Err(RecordError::NotANumber(trimmed.to_string())),
    }
}

fn log_outcome(row: &SupplierRow, outcome: &Outcome) {
    match outcome {
        Outcome::Updated {
            quantity,
            inventory_item_ids,
        } => info!(
            target: "stocksync.sync",
            line = row.line,
            sku = %row.sku,
            quantity,
            items = inventory_item_ids.len(),
            "stock updated"
        ),
        Outcome::NotFoundInCatalog => warn!(
            target: "stocksync.sync",
            line = row.line,
            sku = %row.sku,
            "sku not found in catalog"
        ),
        Outcome::Invalid { reason } => warn!(
            target: "stocksync.sync",
            line = row.line,
            sku = %row.sku,
            error = %reason,
            "invalid supplier row"
        ),
        Outcome::UpdateFailed { failures } => {
            for failure in failures {
                warn!(
                    target: "stocksync.sync",
                    line = row.line,
                    sku = %row.sku,
                    inventory_item_id = %failure.inventory_item_id,
                    error = %failure.error,
                    "update failed"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::{PagedCatalog, variant};
    use crate::catalog::{CatalogOptions, build_index};
    use crate::shopify::client::UserError;
    use std::{
        cell::RefCell,
        collections::{HashMap, HashSet},
        time::Duration,
    };

    const LOCATION: &str = "gid://shopify/Location/1";

    #[derive(Clone, Copy)]
    enum Fail {
        Throttled,
        Rejected,
        Transport,
    }

    /// In-memory stock levels keyed by (item, location).
    #[derive(Default)]
    struct FakeStore {
        levels: RefCell<HashMap<(String, String), i64>>,
        calls: RefCell<Vec<(UpdateMode, QuantityChange)>>,
        failing: HashMap<String, Fail>,
        latency: HashMap<String, Duration>,
    }

    impl FakeStore {
        fn with_levels(levels: &[(&str, i64)]) -> Self {
            let store = Self::default();
            for (item, qty) in levels {
                store
                    .levels
                    .borrow_mut()
                    .insert((item.to_string(), LOCATION.to_string()), *qty);
            }
            store
        }

        fn level(&self, item: &str) -> i64 {
            self.levels
                .borrow()
                .get(&(item.to_string(), LOCATION.to_string()))
                .copied()
                .unwrap_or(0)
        }

        fn calls(&self) -> usize {
            self.calls.borrow().len()
        }

        async fn write(
            &self,
            mode: UpdateMode,
            change: &QuantityChange,
        ) -> Result<(), ShopifyError> {
            if let Some(delay) = self.latency.get(&change.inventory_item_id) {
                tokio::time::sleep(*delay).await;
            }
            self.calls.borrow_mut().push((mode, change.clone()));
            match self.failing.get(&change.inventory_item_id) {
                Some(Fail::Throttled) => return Err(ShopifyError::Throttled),
                Some(Fail::Rejected) => {
                    return Err(ShopifyError::UserErrors(vec![UserError {
                        field: Some(vec!["input".into(), "quantities".into()]),
                        message: "Inventory item is not stocked at location".into(),
                        code: Some("ITEM_NOT_STOCKED_AT_LOCATION".into()),
                    }]));
                }
                Some(Fail::Transport) => {
                    return Err(ShopifyError::Request("connection reset".into()));
                }
                None => {}
            }
            let key = (change.inventory_item_id.clone(), change.location_id.clone());
            let mut levels = self.levels.borrow_mut();
            let level = levels.entry(key).or_insert(0);
            match mode {
                UpdateMode::Set => *level = change.quantity,
                UpdateMode::Adjust => *level += change.quantity,
            }
            Ok(())
        }
    }

    impl InventoryWriter for FakeStore {
        async fn set_available(&self, change: &QuantityChange) -> Result<(), ShopifyError> {
            self.write(UpdateMode::Set, change).await
        }

        async fn adjust_available(&self, change: &QuantityChange) -> Result<(), ShopifyError> {
            self.write(UpdateMode::Adjust, change).await
        }
    }

    fn row(line: u64, sku: &str, quantity: &str) -> SupplierRow {
        SupplierRow {
            line,
            sku: sku.to_string(),
            quantity: quantity.to_string(),
        }
    }

    fn options() -> ReconcileOptions {
        ReconcileOptions {
            pacing: Backoff::new(Duration::ZERO, Duration::ZERO),
            ..ReconcileOptions::default()
        }
    }

    async fn index_of(variants: Vec<crate::catalog::CatalogVariant>) -> CatalogIndex {
        let source = PagedCatalog::new(variants);
        let opts = CatalogOptions {
            retry: Backoff::new(Duration::ZERO, Duration::ZERO),
            ..CatalogOptions::default()
        };
        build_index(&source, &opts).await.expect("index")
    }

    #[tokio::test]
    async fn lowercase_supplier_sku_sets_absolute_quantity() {
        let index = index_of(vec![variant("ABC-1", "item_ref_42")]).await;
        let store = FakeStore::with_levels(&[("item_ref_42", 17)]);
        let opts = options();
        let reconciler = Reconciler::new(&store, &index, LOCATION, &opts);

        let outcomes = reconciler.run(&[row(1, "abc-1", "5")]).await;

        assert_eq!(
            outcomes[0].outcome,
            Outcome::Updated {
                quantity: 5,
                inventory_item_ids: vec!["item_ref_42".into()],
            }
        );
        assert_eq!(outcomes[0].normalized_sku.as_ref().unwrap().as_str(), "ABC-1");
        let calls = store.calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0],
            (
                UpdateMode::Set,
                QuantityChange {
                    inventory_item_id: "item_ref_42".into(),
                    location_id: LOCATION.into(),
                    quantity: 5,
                }
            )
        );
        assert_eq!(store.level("item_ref_42"), 5);
    }

    #[tokio::test]
    async fn empty_sku_is_invalid_without_calls() {
        let index = index_of(vec![variant("ABC-1", "item-1")]).await;
        let store = FakeStore::default();
        let opts = options();
        let outcomes = Reconciler::new(&store, &index, LOCATION, &opts)
            .run(&[row(1, "", "3"), row(2, "   ", "3")])
            .await;
        for outcome in &outcomes {
            assert_eq!(
                outcome.outcome,
                Outcome::Invalid {
                    reason: RecordError::MissingSku
                }
            );
            assert!(outcome.normalized_sku.is_none());
        }
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn unknown_sku_is_reported_without_calls() {
        let index = index_of(vec![variant("ABC-1", "item-1")]).await;
        let store = FakeStore::default();
        let opts = options();
        let outcomes = Reconciler::new(&store, &index, LOCATION, &opts)
            .run(&[row(1, "ZZZ-9", "4")])
            .await;
        assert_eq!(outcomes[0].outcome, Outcome::NotFoundInCatalog);
        assert_eq!(outcomes[0].sku, "ZZZ-9");
        assert_eq!(store.calls(), 0);
        let summary = Summary::from_outcomes(&outcomes);
        assert_eq!(summary.not_found, 1);
        assert_eq!(summary.total(), 1);
    }

    #[tokio::test]
    async fn repeated_absolute_runs_converge() {
        let index = index_of(vec![variant("A", "item-a"), variant("B", "item-b")]).await;
        let store = FakeStore::with_levels(&[("item-a", 40), ("item-b", 2)]);
        let rows = [row(1, "a", "10"), row(2, "b", "0")];
        let opts = options();
        let reconciler = Reconciler::new(&store, &index, LOCATION, &opts);

        reconciler.run(&rows).await;
        let first = (store.level("item-a"), store.level("item-b"));
        reconciler.run(&rows).await;
        let second = (store.level("item-a"), store.level("item-b"));

        assert_eq!(first, (10, 0));
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn adjust_mode_applies_deltas_and_is_not_idempotent() {
        let index = index_of(vec![variant("A", "item-a")]).await;
        let store = FakeStore::with_levels(&[("item-a", 10)]);
        let opts = ReconcileOptions {
            mode: UpdateMode::Adjust,
            ..options()
        };
        let reconciler = Reconciler::new(&store, &index, LOCATION, &opts);
        let rows = [row(1, "A", "-3")];

        let outcomes = reconciler.run(&rows).await;
        assert!(matches!(outcomes[0].outcome, Outcome::Updated { quantity: -3, .. }));
        assert_eq!(store.level("item-a"), 7);
        reconciler.run(&rows).await;
        assert_eq!(store.level("item-a"), 4);
        assert!(store.calls.borrow().iter().all(|(mode, _)| *mode == UpdateMode::Adjust));
    }

    #[tokio::test]
    async fn quantity_policy_skip_and_zero() {
        let index = index_of(vec![variant("A", "item-a"), variant("B", "item-b")]).await;
        let rows = [row(1, "A", "n/a"), row(2, "B", "-4")];

        let store = FakeStore::with_levels(&[("item-a", 9), ("item-b", 9)]);
        let opts = options();
        let outcomes = Reconciler::new(&store, &index, LOCATION, &opts).run(&rows).await;
        assert_eq!(
            outcomes[0].outcome,
            Outcome::Invalid {
                reason: RecordError::NotANumber("n/a".into())
            }
        );
        assert_eq!(
            outcomes[1].outcome,
            Outcome::Invalid {
                reason: RecordError::Negative(-4)
            }
        );
        assert_eq!(store.calls(), 0);

        let store = FakeStore::with_levels(&[("item-a", 9), ("item-b", 9)]);
        let opts = ReconcileOptions {
            quantity_policy: QuantityPolicy::Zero,
            ..options()
        };
        let outcomes = Reconciler::new(&store, &index, LOCATION, &opts).run(&rows).await;
        assert!(outcomes
            .iter()
            .all(|o| matches!(o.outcome, Outcome::Updated { quantity: 0, .. })));
        assert_eq!((store.level("item-a"), store.level("item-b")), (0, 0));
    }

    #[tokio::test]
    async fn zero_policy_never_coerces_deltas() {
        let index = index_of(vec![variant("A", "item-a")]).await;
        let store = FakeStore::default();
        let opts = ReconcileOptions {
            quantity_policy: QuantityPolicy::Zero,
            mode: UpdateMode::Adjust,
            ..options()
        };
        let outcomes = Reconciler::new(&store, &index, LOCATION, &opts)
            .run(&[row(1, "A", "lots")])
            .await;
        assert!(matches!(outcomes[0].outcome, Outcome::Invalid { .. }));
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn one_failure_does_not_stop_the_run() {
        let index = index_of(vec![
            variant("A", "item-a"),
            variant("B", "item-b"),
            variant("C", "item-c"),
        ])
        .await;
        let store = FakeStore {
            failing: HashMap::from([("item-b".to_string(), Fail::Rejected)]),
            ..FakeStore::default()
        };
        let opts = ReconcileOptions {
            batch_size: 2,
            ..options()
        };
        let outcomes = Reconciler::new(&store, &index, LOCATION, &opts)
            .run(&[row(1, "A", "1"), row(2, "B", "2"), row(3, "C", "3")])
            .await;

        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].outcome.kind(), "updated");
        assert_eq!(outcomes[2].outcome.kind(), "updated");
        let Outcome::UpdateFailed { failures } = &outcomes[1].outcome else {
            panic!("expected failure, got {:?}", outcomes[1].outcome);
        };
        assert_eq!(failures[0].inventory_item_id, "item-b");
        assert!(matches!(&failures[0].error, UpdateError::Rejected(msg)
            if msg.contains("ITEM_NOT_STOCKED_AT_LOCATION")));
        assert_eq!(
            Summary::from_outcomes(&outcomes),
            Summary {
                updated: 2,
                not_found: 0,
                invalid: 0,
                failed: 1
            }
        );
        assert_eq!(store.level("item-c"), 3);
    }

    #[tokio::test]
    async fn duplicate_sku_updates_every_item() {
        let index = index_of(vec![variant("A", "item-1"), variant("a ", "item-2")]).await;
        let store = FakeStore {
            failing: HashMap::from([("item-2".to_string(), Fail::Transport)]),
            ..FakeStore::default()
        };
        let opts = options();
        let outcomes = Reconciler::new(&store, &index, LOCATION, &opts)
            .run(&[row(1, "A", "6")])
            .await;
        assert_eq!(store.calls(), 2);
        assert_eq!(store.level("item-1"), 6);
        assert_eq!(
            outcomes[0].outcome,
            Outcome::UpdateFailed {
                failures: vec![ItemFailure {
                    inventory_item_id: "item-2".into(),
                    error: UpdateError::Transport("request failed: connection reset".into()),
                }]
            }
        );
    }

    #[tokio::test]
    async fn empty_feed_is_an_empty_success() {
        let index = index_of(vec![variant("A", "item-a")]).await;
        let store = FakeStore::default();
        let opts = options();
        let outcomes = Reconciler::new(&store, &index, LOCATION, &opts).run(&[]).await;
        assert!(outcomes.is_empty());
        assert_eq!(Summary::from_outcomes(&outcomes), Summary::default());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_updates_keep_feed_order() {
        let variants: Vec<_> = (0..6)
            .map(|i| variant(&format!("S{i}"), &format!("item-{i}")))
            .collect();
        let index = index_of(variants).await;
        let latency = (0..6)
            .map(|i| (format!("item-{i}"), Duration::from_millis(60 - i * 10)))
            .collect();
        let store = FakeStore {
            latency,
            ..FakeStore::default()
        };
        let opts = ReconcileOptions {
            max_in_flight: 3,
            ..options()
        };
        let rows: Vec<_> = (0..6).map(|i| row(i + 1, &format!("s{i}"), "1")).collect();
        let outcomes = Reconciler::new(&store, &index, LOCATION, &opts).run(&rows).await;

        let lines: Vec<u64> = outcomes.iter().map(|o| o.line).collect();
        assert_eq!(lines, vec![1, 2, 3, 4, 5, 6]);
        let completion: Vec<String> = store
            .calls
            .borrow()
            .iter()
            .map(|(_, c)| c.inventory_item_id.clone())
            .collect();
        assert_ne!(completion[..3], ["item-0", "item-1", "item-2"]);
        let distinct: HashSet<_> = completion.iter().collect();
        assert_eq!(distinct.len(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn batches_are_paced_and_throttling_backs_off() {
        let index = index_of(vec![variant("A", "item-a"), variant("T", "item-t")]).await;
        let store = FakeStore {
            failing: HashMap::from([("item-t".to_string(), Fail::Throttled)]),
            ..FakeStore::default()
        };
        let opts = ReconcileOptions {
            batch_size: 1,
            pacing: Backoff::new(Duration::from_millis(100), Duration::from_secs(10)),
            ..ReconcileOptions::default()
        };
        let reconciler = Reconciler::new(&store, &index, LOCATION, &opts);

        let started = tokio::time::Instant::now();
        reconciler
            .run(&[row(1, "A", "1"), row(2, "A", "1"), row(3, "A", "1")])
            .await;
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(200) && elapsed < Duration::from_millis(300));

        let started = tokio::time::Instant::now();
        let outcomes = reconciler
            .run(&[row(1, "T", "1"), row(2, "T", "1"), row(3, "A", "1")])
            .await;
        // 200ms after one throttled batch, 400ms after two.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(600) && elapsed < Duration::from_millis(700));
        assert_eq!(Summary::from_outcomes(&outcomes).failed, 2);
    }

    #[test]
    fn parses_decimal_feed_quantities() {
        assert_eq!(parse_quantity("12"), Ok(12));
        assert_eq!(parse_quantity(" 12.0 "), Ok(12));
        assert_eq!(parse_quantity("7.9"), Ok(7));
        assert_eq!(parse_quantity("-2.5"), Ok(-2));
        assert_eq!(parse_quantity("+3"), Ok(3));
        assert_eq!(parse_quantity(""), Err(RecordError::NotANumber(String::new())));
        assert_eq!(parse_quantity("NaN"), Err(RecordError::NotANumber("NaN".into())));
        assert_eq!(parse_quantity("inf"), Err(RecordError::NotANumber("inf".into())));
        assert_eq!(parse_quantity("1e30"), Err(RecordError::NotANumber("1e30".into())));
    }

    #[test]
    fn outcomes_serialize_with_reasons() {
        let record = RecordOutcome {
            line: 4,
            sku: "b-2".into(),
            normalized_sku: None,
            outcome: Outcome::Invalid {
                reason: RecordError::Negative(-1),
            },
        };
        let value = serde_json::to_value(&record).expect("json");
        assert_eq!(
            value,
            serde_json::json!({
                "line": 4,
                "sku": "b-2",
                "normalized_sku": null,
                "outcome": "invalid",
                "reason": "quantity -1 is negative"
            })
        );
    }

    #[test]
    fn summary_line() {
        let summary = Summary {
            updated: 3,
            not_found: 1,
            invalid: 0,
            failed: 2,
        };
        assert_eq!(summary.to_string(), "updated=3 not_found=1 invalid=0 failed=2");
    }
}
