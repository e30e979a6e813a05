use tracing::trace;

// Counters are emitted as trace events; there is no exporter for a one-shot job.

pub fn inc_outcome(kind: &'static str) {
    trace!(target: "stocksync.metrics", kind = kind, "outcomes_total_inc");
}

pub fn catalog_page(variants: usize, elapsed_ms: u128) {
    trace!(
        target: "stocksync.metrics",
        variants = variants as u64,
        elapsed_ms = elapsed_ms as u64,
        "catalog_page_fetched"
    );
}

pub fn batch_elapsed(batch: usize, elapsed_ms: u128) {
    trace!(
        target: "stocksync.metrics",
        batch = batch as u64,
        elapsed_ms = elapsed_ms as u64,
        "batch_elapsed"
    );
}
