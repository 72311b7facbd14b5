//! What a scan hands back: ranked rows, decision counters and the exception log.

use chrono::{DateTime, NaiveDate, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use super::budget::ScanBudget;
use crate::steam::SearchKind;

/// Reasons an item decision is counted under, in reporting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Counter {
    NonGameType,
    MissingDetails,
    FilteredTagOr,
    FilteredIncludeTerms,
    FilteredExcludeTerms,
    UpcomingClassifyReject,
    NewreleaseWrongWindow,
    NewreleaseNoDate,
    Kept,
    Exceptions,
}

impl Counter {
    pub const ALL: [Counter; 10] = [
        Counter::NonGameType,
        Counter::MissingDetails,
        Counter::FilteredTagOr,
        Counter::FilteredIncludeTerms,
        Counter::FilteredExcludeTerms,
        Counter::UpcomingClassifyReject,
        Counter::NewreleaseWrongWindow,
        Counter::NewreleaseNoDate,
        Counter::Kept,
        Counter::Exceptions,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Counter::NonGameType => "non_game_type",
            Counter::MissingDetails => "missing_details",
            Counter::FilteredTagOr => "filtered_tag_or",
            Counter::FilteredIncludeTerms => "filtered_include_terms",
            Counter::FilteredExcludeTerms => "filtered_exclude_terms",
            Counter::UpcomingClassifyReject => "upcoming_classify_reject",
            Counter::NewreleaseWrongWindow => "newrelease_wrong_window",
            Counter::NewreleaseNoDate => "newrelease_no_date",
            Counter::Kept => "kept",
            Counter::Exceptions => "exceptions",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DebugCounters {
    counts: IndexMap<&'static str, u64>,
}

impl Default for DebugCounters {
    fn default() -> Self {
        Self {
            counts: Counter::ALL.iter().map(|c| (c.name(), 0)).collect(),
        }
    }
}

impl DebugCounters {
    pub fn bump(&mut self, counter: Counter) {
        *self.counts.entry(counter.name()).or_insert(0) += 1;
    }

    pub fn get(&self, counter: Counter) -> u64 {
        self.counts.get(counter.name()).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, u64)> + '_ {
        self.counts.iter().map(|(k, v)| (*k, *v))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    FetchAppids,
    FetchUpcomingAppids,
    FetchAppdetailsBatch,
    ProcessApp,
    Wishlists,
    Followers,
    FetchGlobalTags,
}

impl Stage {
    pub fn listing(kind: SearchKind) -> Self {
        match kind {
            SearchKind::NewReleases => Stage::FetchAppids,
            SearchKind::Upcoming => Stage::FetchUpcomingAppids,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::FetchAppids => "fetch_appids",
            Stage::FetchUpcomingAppids => "fetch_upcoming_appids",
            Stage::FetchAppdetailsBatch => "fetch_appdetails_batch",
            Stage::ProcessApp => "process_app",
            Stage::Wishlists => "wishlists",
            Stage::Followers => "followers",
            Stage::FetchGlobalTags => "fetch_global_tags",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExceptionRecord {
    pub timestamp: DateTime<Utc>,
    pub stage: Stage,
    pub country: Option<String>,
    pub appid: Option<u32>,
    pub message: String,
    /// Full cause chain.
    pub trace: String,
}

impl ExceptionRecord {
    pub fn capture(
        timestamp: DateTime<Utc>,
        stage: Stage,
        country: Option<&str>,
        appid: Option<u32>,
        err: &anyhow::Error,
    ) -> Self {
        Self {
            timestamp,
            stage,
            country: country.map(str::to_string),
            appid,
            message: err.to_string(),
            trace: format!("{err:?}"),
        }
    }
}

/// Counters and exceptions accumulated while one scan runs.
#[derive(Debug, Default)]
pub struct ScanLog {
    counters: DebugCounters,
    exceptions: Vec<ExceptionRecord>,
}

impl ScanLog {
    pub fn bump(&mut self, counter: Counter) {
        self.counters.bump(counter);
    }

    /// Append an exception and count it.
    pub fn record(
        &mut self,
        at: DateTime<Utc>,
        stage: Stage,
        country: Option<&str>,
        appid: Option<u32>,
        err: anyhow::Error,
    ) {
        warn!(stage = stage.as_str(), country, appid, error = %err, "scan step failed");
        self.counters.bump(Counter::Exceptions);
        self.exceptions
            .push(ExceptionRecord::capture(at, stage, country, appid, &err));
    }

    pub fn counters(&self) -> &DebugCounters {
        &self.counters
    }

    pub fn exceptions(&self) -> &[ExceptionRecord] {
        &self.exceptions
    }

    pub fn into_parts(self) -> (DebugCounters, Vec<ExceptionRecord>) {
        (self.counters, self.exceptions)
    }
}

/// Mode-specific derived fields of a row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RowMetrics {
    NewReleases {
        reviews_per_day: f64,
        percent_positive: Option<f64>,
        reviews_total: u64,
        reviews_positive: u64,
    },
    Upcoming {
        days_until: Option<i64>,
    },
}

impl RowMetrics {
    pub fn reviews_per_day(&self) -> Option<f64> {
        match self {
            RowMetrics::NewReleases { reviews_per_day, .. } => Some(*reviews_per_day),
            RowMetrics::Upcoming { .. } => None,
        }
    }

    pub fn percent_positive(&self) -> Option<f64> {
        match self {
            RowMetrics::NewReleases { percent_positive, .. } => *percent_positive,
            RowMetrics::Upcoming { .. } => None,
        }
    }

    pub fn days_until(&self) -> Option<i64> {
        match self {
            RowMetrics::Upcoming { days_until } => *days_until,
            RowMetrics::NewReleases { .. } => None,
        }
    }
}

/// One surfaced title, merged across the countries that observed it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputRow {
    pub appid: u32,
    pub name: String,
    pub store_url: String,
    pub developer: String,
    pub publisher: String,
    /// Sorted, comma-joined country codes.
    pub countries: String,
    pub genres: String,
    pub release_text: String,
    pub release_date: Option<NaiveDate>,
    #[serde(flatten)]
    pub metrics: RowMetrics,
    pub wishlist_estimate: Option<u64>,
    pub followers: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanResult {
    pub scan_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub mode: SearchKind,
    pub countries: Vec<String>,
    pub budget: ScanBudget,
    pub rows: Vec<OutputRow>,
    pub counters: DebugCounters,
    pub exceptions: Vec<ExceptionRecord>,
}

impl ScanResult {
    /// Items processed against the budget.
    pub fn processed(&self) -> usize {
        self.budget.consumed()
    }

    /// Ran to completion but nothing qualified. Distinct from failures, which
    /// show up in `exceptions`.
    pub fn no_results(&self) -> bool {
        self.rows.is_empty()
    }
}
