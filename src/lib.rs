//! Steam Radar: finds new and upcoming storefront titles across countries,
//! enriches them with review, wishlist and follower signals, and ranks them.
//!
//! Layers, leaf first: `storage` (SQLite TTL cache and snapshots), `steam`
//! (transport, retrying fetcher, source adapters), `normalization` (typed
//! details, release-date rules, term filters) and `scan` (budgeted
//! multi-country scanner plus aggregation and ranking).

pub mod cli;
pub mod clock;
pub mod config;
pub mod normalization;
pub mod scan;
pub mod steam;
pub mod storage;
pub mod telemetry;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod tiers;

pub mod util {
    pub mod env;
}

pub use config::{Radar, RadarConfig};
pub use scan::{ScanRequest, ScanResult, Scanner};
