//! Cross-country merge, velocity threshold, enrichment and ranking.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use anyhow::Context;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use tracing::debug;

use super::report::{OutputRow, RowMetrics, ScanLog, Stage};
use crate::clock::Clock;
use crate::normalization::AppDetail;
use crate::steam::{store_url, ReviewSummary, SearchKind, SteamSources};

/// Release text shown for upcoming items that carry none.
pub const COMING_SOON: &str = "Coming Soon";

/// What one country contributed for an accepted item.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    NewRelease {
        released: DateTime<Utc>,
        reviews: ReviewSummary,
        reviews_per_day: f64,
    },
    Upcoming {
        days_until: Option<i64>,
    },
}

/// An accepted item as seen from one country.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub country: String,
    pub detail: AppDetail,
    pub signal: Signal,
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// One row per appid in first-seen order. Scalars come from the first
/// observation; signals are combined per mode.
pub fn merge_observations(observations: &[Observation]) -> Vec<OutputRow> {
    let mut groups: IndexMap<u32, Vec<&Observation>> = IndexMap::new();
    for obs in observations {
        groups.entry(obs.detail.appid).or_default().push(obs);
    }

    groups
        .into_iter()
        .filter_map(|(appid, group)| {
            let first = *group.first()?;
            let countries: BTreeSet<&str> = group.iter().map(|o| o.country.as_str()).collect();
            let countries = countries.into_iter().collect::<Vec<_>>().join(", ");

            let (metrics, release_text, release_date) = match first.signal {
                Signal::NewRelease { released, .. } => {
                    let mut best_velocity = 0.0f64;
                    let mut total = 0u64;
                    let mut positive = 0u64;
                    for obs in &group {
                        if let Signal::NewRelease {
                            reviews,
                            reviews_per_day,
                            ..
                        } = &obs.signal
                        {
                            best_velocity = best_velocity.max(*reviews_per_day);
                            total += reviews.total;
                            positive += reviews.positive;
                        }
                    }
                    let percent_positive =
                        (total > 0).then(|| round_to(positive as f64 / total as f64 * 100.0, 1));
                    (
                        RowMetrics::NewReleases {
                            reviews_per_day: best_velocity,
                            percent_positive,
                            reviews_total: total,
                            reviews_positive: positive,
                        },
                        first.detail.release_text.clone(),
                        Some(released.date_naive()),
                    )
                }
                Signal::Upcoming { .. } => {
                    let days_until = group
                        .iter()
                        .filter_map(|o| match o.signal {
                            Signal::Upcoming { days_until } => days_until,
                            Signal::NewRelease { .. } => None,
                        })
                        .min();
                    let text = if first.detail.release_text.is_empty() {
                        COMING_SOON.to_string()
                    } else {
                        first.detail.release_text.clone()
                    };
                    (
                        RowMetrics::Upcoming { days_until },
                        text,
                        first.detail.released_at().map(|d| d.date_naive()),
                    )
                }
            };

            Some(OutputRow {
                appid,
                name: first.detail.name.clone(),
                store_url: store_url(appid),
                developer: first.detail.developer_line(),
                publisher: first.detail.publisher_line(),
                countries,
                genres: first.detail.terms_line(),
                release_text,
                release_date,
                metrics,
                wishlist_estimate: None,
                followers: None,
            })
        })
        .collect()
}

/// Drop new-release rows whose merged velocity is under `min`.
pub fn retain_min_velocity(rows: &mut Vec<OutputRow>, min: f64) {
    rows.retain(|row| row.metrics.reviews_per_day().map_or(true, |v| v >= min));
}

/// Descending with `None` after every known value.
fn desc_known_first<T>(a: Option<T>, b: Option<T>, cmp: impl Fn(&T, &T) -> Ordering) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => cmp(&b, &a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn compare_new_releases(a: &OutputRow, b: &OutputRow) -> Ordering {
    desc_known_first(a.metrics.reviews_per_day(), b.metrics.reviews_per_day(), f64::total_cmp)
        .then_with(|| desc_known_first(a.wishlist_estimate, b.wishlist_estimate, Ord::cmp))
        .then_with(|| {
            desc_known_first(a.metrics.percent_positive(), b.metrics.percent_positive(), f64::total_cmp)
        })
        .then_with(|| desc_known_first(a.release_date, b.release_date, Ord::cmp))
}

fn compare_upcoming(a: &OutputRow, b: &OutputRow) -> Ordering {
    match (a.metrics.days_until(), b.metrics.days_until()) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.release_text.cmp(&b.release_text))
}

/// Stable sort for the mode, then keep the first `top_n`.
pub fn rank(mut rows: Vec<OutputRow>, kind: SearchKind, top_n: usize) -> Vec<OutputRow> {
    match kind {
        SearchKind::NewReleases => rows.sort_by(compare_new_releases),
        SearchKind::Upcoming => rows.sort_by(compare_upcoming),
    }
    rows.truncate(top_n);
    rows
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrichField {
    Wishlists,
    Followers,
}

impl EnrichField {
    fn stage(self) -> Stage {
        match self {
            EnrichField::Wishlists => Stage::Wishlists,
            EnrichField::Followers => Stage::Followers,
        }
    }
}

/// One lookup per row. A failed lookup leaves the field empty and is logged.
pub async fn enrich(
    sources: &SteamSources,
    rows: &mut [OutputRow],
    field: EnrichField,
    log: &mut ScanLog,
    clock: &dyn Clock,
) {
    for row in rows.iter_mut() {
        let looked_up = match field {
            EnrichField::Wishlists => sources
                .wishlist_estimate(row.appid)
                .await
                .context("fetching wishlist estimate"),
            EnrichField::Followers => sources
                .followers(row.appid)
                .await
                .context("fetching follower count"),
        };
        let value = match looked_up {
            Ok(value) => value,
            Err(err) => {
                log.record(clock.now(), field.stage(), None, Some(row.appid), err);
                None
            }
        };
        match field {
            EnrichField::Wishlists => row.wishlist_estimate = value,
            EnrichField::Followers => row.followers = value,
        }
    }
    debug!(?field, rows = rows.len(), "enrichment pass finished");
}
