//! Process-level settings read from the environment (and `.env`).
//!
//! Only wiring lives here: where the cache is, how to talk to upstream, how
//! hard to retry. Scan parameters always come in through `ScanRequest`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::clock::{Clock, SystemClock};
use crate::scan::Scanner;
use crate::steam::{
    http::DEFAULT_USER_AGENT, Endpoints, Fetcher, ReqwestTransport, RetryPolicy, SteamSources,
    TokioSleeper, DEFAULT_GAMEDATA_BASE, DEFAULT_STORE_BASE,
};
use crate::storage::{Db, SnapshotStore, TtlCache};
use crate::util::env::{env_opt, env_parse};

pub const DEFAULT_DB_PATH: &str = "steam_radar.sqlite";

#[derive(Debug, Clone, PartialEq)]
pub struct RadarConfig {
    pub db_path: PathBuf,
    pub http_timeout: Duration,
    pub user_agent: String,
    pub retry: RetryPolicy,
    pub enrich_max_attempts: u32,
    pub store_base: String,
    pub gamedata_base: String,
}

impl Default for RadarConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            http_timeout: Duration::from_secs(20),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            retry: RetryPolicy::standard(),
            enrich_max_attempts: RetryPolicy::enrichment().max_attempts,
            store_base: DEFAULT_STORE_BASE.to_string(),
            gamedata_base: DEFAULT_GAMEDATA_BASE.to_string(),
        }
    }
}

impl RadarConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            db_path: env_opt("STEAM_RADAR_DB").map(PathBuf::from).unwrap_or(d.db_path),
            http_timeout: Duration::from_secs(env_parse("STEAM_HTTP_TIMEOUT_SECS", 20u64)),
            user_agent: env_opt("STEAM_USER_AGENT").unwrap_or(d.user_agent),
            retry: RetryPolicy {
                max_attempts: env_parse("STEAM_MAX_ATTEMPTS", d.retry.max_attempts).max(1),
                base: Duration::from_millis(env_parse("STEAM_BACKOFF_BASE_MS", 750u64)),
                cap: Duration::from_millis(env_parse("STEAM_BACKOFF_CAP_MS", 8_000u64)),
                jitter: Duration::from_millis(env_parse("STEAM_BACKOFF_JITTER_MS", 250u64)),
            },
            enrich_max_attempts: env_parse("STEAM_ENRICH_MAX_ATTEMPTS", d.enrich_max_attempts).max(1),
            store_base: env_opt("STEAM_STORE_BASE").unwrap_or(d.store_base),
            gamedata_base: env_opt("STEAM_GAMEDATA_BASE").unwrap_or(d.gamedata_base),
        }
    }

    pub fn endpoints(&self) -> Endpoints {
        Endpoints::new(&self.store_base, &self.gamedata_base)
    }

    pub fn open_db(&self) -> Result<Db> {
        Db::open(&self.db_path).with_context(|| format!("opening {}", self.db_path.display()))
    }
}

/// Everything a run needs, wired from one config against the real network.
pub struct Radar {
    pub cache: Arc<TtlCache>,
    pub sources: SteamSources,
    pub snapshots: SnapshotStore,
    pub clock: Arc<dyn Clock>,
}

impl Radar {
    pub fn connect(cfg: &RadarConfig) -> Result<Self> {
        let db = cfg.open_db()?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let cache = Arc::new(TtlCache::new(db.clone(), clock.clone()));
        let transport = ReqwestTransport::new(cfg.http_timeout, &cfg.user_agent)
            .context("building http client")?;
        let fetcher = Fetcher::new(Arc::new(transport), Arc::new(TokioSleeper), cfg.retry.clone());
        let enrich_policy = cfg.retry.clone().with_max_attempts(cfg.enrich_max_attempts);
        let sources = SteamSources::new(fetcher, cache.clone(), cfg.endpoints())
            .context("building source adapters")?
            .with_enrichment_policy(enrich_policy);
        Ok(Self {
            snapshots: SnapshotStore::new(db),
            cache,
            sources,
            clock,
        })
    }

    pub fn scanner(&self) -> Scanner {
        Scanner::new(self.sources.clone(), self.clock.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_standard_policy() {
        let cfg = RadarConfig::default();
        assert_eq!(cfg.retry, RetryPolicy::standard());
        assert_eq!(cfg.enrich_max_attempts, 4);
        assert_eq!(cfg.endpoints(), Endpoints::default());
    }

    #[test]
    fn radar_wires_against_a_temp_db() {
        let path = std::env::temp_dir().join(format!("steam_radar_cfg_{}.sqlite", uuid::Uuid::new_v4()));
        let cfg = RadarConfig {
            db_path: path.clone(),
            ..RadarConfig::default()
        };
        let radar = Radar::connect(&cfg).unwrap();
        assert_eq!(radar.cache.stats().unwrap().entries, 0);
        drop(radar);
        let _ = std::fs::remove_file(&path);
    }
}
