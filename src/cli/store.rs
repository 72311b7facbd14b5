//! Maintenance commands: tag vocabulary, cache upkeep, snapshot listing.

use anyhow::{Context, Result};
use serde_json::json;
use tracing::{info, warn};

use crate::clock::SystemClock;
use crate::config::{Radar, RadarConfig};
use crate::scan::{ExceptionRecord, Stage};
use crate::storage::{SnapshotStore, TtlCache};
use crate::steam::normalize_country;

pub async fn tags(cfg: &RadarConfig, country: &str) -> Result<()> {
    let radar = Radar::connect(cfg)?;
    let cc = normalize_country(country);
    match radar
        .sources
        .global_tags(&cc)
        .await
        .with_context(|| format!("fetching tag vocabulary for {cc}"))
    {
        Ok(tags) => {
            info!(country = %cc, count = tags.len(), "tags fetched");
            println!("{}", serde_json::to_string(&tags)?);
            Ok(())
        }
        Err(err) => {
            let record =
                ExceptionRecord::capture(radar.clock.now(), Stage::FetchGlobalTags, Some(cc.as_str()), None, &err);
            warn!(country = %cc, error = %err, "tag vocabulary unavailable");
            println!("{}", serde_json::to_string(&json!({ "tags": [], "exception": record }))?);
            Ok(())
        }
    }
}

pub fn cache_purge(cfg: &RadarConfig) -> Result<()> {
    let cache = TtlCache::new(cfg.open_db()?, std::sync::Arc::new(SystemClock));
    let removed = cache.purge_expired().context("purging expired cache entries")?;
    info!(removed, "cache purged");
    println!("{}", json!({ "removed": removed }));
    Ok(())
}

pub fn cache_stats(cfg: &RadarConfig) -> Result<()> {
    let cache = TtlCache::new(cfg.open_db()?, std::sync::Arc::new(SystemClock));
    let stats = cache.stats().context("reading cache stats")?;
    println!("{}", json!({ "entries": stats.entries, "expired": stats.expired }));
    Ok(())
}

pub fn snapshots(cfg: &RadarConfig, limit: usize) -> Result<()> {
    let store = SnapshotStore::new(cfg.open_db()?);
    let recent = store.recent(limit).context("listing snapshots")?;
    println!("{}", serde_json::to_string_pretty(&recent)?);
    Ok(())
}
