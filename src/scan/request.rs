use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::steam::{normalize_country, BatchPacing, SearchKind};

/// Mode and its mode-specific knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ModeParams {
    NewReleases {
        /// Released within the last N days.
        window_days: u32,
        /// Review lookback window.
        review_days: u32,
        min_reviews_per_day: f64,
    },
    Upcoming {
        /// Releasing within the next N days.
        window_days: u32,
        include_unknown: bool,
    },
}

impl ModeParams {
    pub fn new_releases() -> Self {
        ModeParams::NewReleases {
            window_days: 14,
            review_days: 3,
            min_reviews_per_day: 0.5,
        }
    }

    pub fn upcoming() -> Self {
        ModeParams::Upcoming {
            window_days: 60,
            include_unknown: true,
        }
    }

    pub fn kind(&self) -> SearchKind {
        match self {
            ModeParams::NewReleases { .. } => SearchKind::NewReleases,
            ModeParams::Upcoming { .. } => SearchKind::Upcoming,
        }
    }

    /// Label stored with snapshots.
    pub fn snapshot_type(&self) -> &'static str {
        match self {
            ModeParams::NewReleases { .. } => "new",
            ModeParams::Upcoming { .. } => "upcoming",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum PacingPreset {
    Safe,
    Normal,
    Fast,
}

impl PacingPreset {
    pub fn pacing(self) -> BatchPacing {
        let (batch_size, delay_ms) = match self {
            PacingPreset::Safe => (20, 700),
            PacingPreset::Normal => (25, 450),
            PacingPreset::Fast => (35, 300),
        };
        BatchPacing {
            batch_size,
            delay: Duration::from_millis(delay_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrichment {
    pub wishlists: bool,
    pub followers: bool,
}

impl Default for Enrichment {
    fn default() -> Self {
        Self {
            wishlists: true,
            followers: true,
        }
    }
}

/// Everything one scan needs. The scanner reads nothing else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRequest {
    pub mode: ModeParams,
    /// Processed in this order.
    pub countries: Vec<String>,
    pub pages: u32,
    pub per_page: u32,
    /// Global cap on items processed across all countries.
    pub max_apps: usize,
    pub top_n: usize,
    pub batch_size: usize,
    pub request_delay: Duration,
    pub include_tags: Vec<String>,
    pub include_terms: Vec<String>,
    pub exclude_terms: Vec<String>,
    pub enrich: Enrichment,
}

impl ScanRequest {
    pub fn new(mode: ModeParams, countries: Vec<String>) -> Self {
        let pacing = PacingPreset::Normal.pacing();
        Self {
            mode,
            countries,
            pages: 3,
            per_page: 50,
            max_apps: 500,
            top_n: 60,
            batch_size: pacing.batch_size,
            request_delay: pacing.delay,
            include_tags: Vec::new(),
            include_terms: Vec::new(),
            exclude_terms: Vec::new(),
            enrich: Enrichment::default(),
        }
    }

    pub fn with_preset(mut self, preset: PacingPreset) -> Self {
        let pacing = preset.pacing();
        self.batch_size = pacing.batch_size;
        self.request_delay = pacing.delay;
        self
    }

    pub fn pacing(&self) -> BatchPacing {
        BatchPacing {
            batch_size: self.batch_size.max(1),
            delay: self.request_delay,
        }
    }

    /// Upper-cased country codes, first occurrence kept.
    pub fn normalized_countries(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.countries
            .iter()
            .filter(|cc| !cc.trim().is_empty())
            .map(|cc| normalize_country(cc))
            .filter(|cc| seen.insert(cc.clone()))
            .collect()
    }
}
