//! [`OhlcvIngestionPort`] stub plus the ingestion work planner.
//!
//! Mint-filtering lives inside the planning function itself rather than
//! having a caller fetch everything and filter client-side — that keeps a
//! caller who passes `mints: None` from ever materializing a cross product
//! of every known mint.

use std::time::Instant;

use tracing::{info, warn};

use crate::domain::ports::{IngestionSpec, IngestionSummary, OhlcvIngestionPort};

/// One token's ingestion window, already clipped to `pre_window_min`/
/// `post_window_min` around the requested range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionWorkItem {
    pub mint: String,
    pub from_s: i64,
    pub to_s: i64,
}

/// Expands an [`IngestionSpec`] into a concrete worklist. When `mints` is
/// `Some`, only those mints are planned; an empty or `None` list plans
/// nothing, since fetching "every known mint" has no bounded cost.
pub fn plan_ingestion(spec: &IngestionSpec) -> Vec<IngestionWorkItem> {
    let pre_s = spec.pre_window_min * 60;
    let post_s = spec.post_window_min * 60;
    let from_s = spec.from_s - pre_s;
    let to_s = spec.to_s + post_s;

    match &spec.mints {
        Some(mints) => mints.iter().map(|m| IngestionWorkItem { mint: m.clone(), from_s, to_s }).collect(),
        None => Vec::new(),
    }
}

/// Development stub: plans the worklist and reports it without performing
/// any network fetch (no HTTP client crate is wired into this build).
/// Exists so the CLI's `ingestion` subcommands have something to call.
pub struct StubIngestionAdapter;

impl OhlcvIngestionPort for StubIngestionAdapter {
    fn ingest(&self, spec: &IngestionSpec) -> Result<IngestionSummary, crate::domain::errors::PortError> {
        let started = Instant::now();
        let worklist = plan_ingestion(spec);
        if worklist.is_empty() {
            warn!(duckdb_path = %spec.duckdb_path, "ingestion requested with no mints to plan");
        } else {
            info!(duckdb_path = %spec.duckdb_path, items = worklist.len(), "ingestion worklist planned");
        }
        Ok(IngestionSummary {
            worklist_generated: worklist.len(),
            items_processed: 0,
            items_succeeded: 0,
            items_failed: 0,
            items_skipped: worklist.len(),
            total_candles_fetched: 0,
            duration_ms: started.elapsed().as_millis() as u64,
            errors: Vec::new(),
        })
    }
}
