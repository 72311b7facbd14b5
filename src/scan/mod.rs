//! Scan orchestration: request in, ranked result out.

pub mod aggregate;
pub mod budget;
pub mod report;
pub mod request;
pub mod scanner;

use tracing::{info, warn};

pub use aggregate::{enrich, merge_observations, rank, EnrichField, Observation, Signal};
pub use budget::ScanBudget;
pub use report::{Counter, DebugCounters, ExceptionRecord, OutputRow, RowMetrics, ScanResult, Stage};
pub use request::{Enrichment, ModeParams, PacingPreset, ScanRequest};
pub use scanner::Scanner;

use crate::storage::SnapshotStore;

/// Persist a finished scan for later inspection. Failures are logged only.
pub fn save_snapshot(store: &SnapshotStore, request: &ScanRequest, result: &ScanResult) -> Option<i64> {
    let country = result.countries.join(", ");
    match store.save(
        result.finished_at,
        request.mode.snapshot_type(),
        &country,
        request,
        &result.rows,
    ) {
        Ok(id) => {
            info!(snapshot_id = id, scan_id = %result.scan_id, "snapshot saved");
            Some(id)
        }
        Err(err) => {
            warn!(scan_id = %result.scan_id, error = %err, "snapshot not saved");
            None
        }
    }
}
