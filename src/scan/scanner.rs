//! Budgeted multi-country scan.
//!
//! Countries are visited in request order. Each gets its id list truncated to
//! `min(per-country share, remaining global capacity)`, a paced detail batch,
//! and then every id goes through the filter/classify pipeline, counted once.
//! A failing list or batch fetch skips that country; a failing item skips that
//! item. Nothing aborts the scan.

use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use super::aggregate::{enrich, merge_observations, rank, retain_min_velocity, EnrichField, Observation, Signal};
use super::budget::ScanBudget;
use super::report::{Counter, ScanLog, ScanResult, Stage};
use super::request::{ModeParams, ScanRequest};
use crate::clock::Clock;
use crate::normalization::{
    classify_new_release, classify_upcoming, AppDetail, FilterVerdict, NewReleaseDecision, TermFilter,
    UpcomingDecision,
};
use crate::steam::SteamSources;

enum Decision {
    Keep(Observation),
    Reject(Counter),
}

pub struct Scanner {
    sources: SteamSources,
    clock: Arc<dyn Clock>,
}

impl Scanner {
    pub fn new(sources: SteamSources, clock: Arc<dyn Clock>) -> Self {
        Self { sources, clock }
    }

    pub async fn run(&self, request: &ScanRequest) -> ScanResult {
        let scan_id = Uuid::new_v4();
        let started_at = self.clock.now();
        let countries = request.normalized_countries();
        let kind = request.mode.kind();
        let pacing = request.pacing();
        let filter = TermFilter::new(
            &request.include_tags,
            &request.include_terms,
            &request.exclude_terms,
        );
        let mut budget = ScanBudget::new(request.max_apps, countries.len());
        let mut log = ScanLog::default();
        let mut observations: Vec<Observation> = Vec::new();

        info!(
            %scan_id,
            mode = ?kind,
            countries = countries.len(),
            max_apps = budget.global_max(),
            per_country = budget.per_country_share(),
            "scan started"
        );

        for cc in &countries {
            if budget.is_exhausted() {
                info!(%scan_id, country = %cc, processed = budget.consumed(), "global budget reached; stopping");
                break;
            }

            let appids = match self
                .sources
                .search_appids(kind, cc, request.pages, request.per_page)
                .await
                .with_context(|| format!("fetching app list for {cc}"))
            {
                Ok(ids) => ids,
                Err(err) => {
                    log.record(self.clock.now(), Stage::listing(kind), Some(cc.as_str()), None, err);
                    continue;
                }
            };

            let allowance = budget.allowance();
            let listed = appids.len();
            let appids: Vec<u32> = appids.into_iter().take(allowance).collect();
            debug!(country = %cc, listed, allowance, "candidate ids");

            let details = match self
                .sources
                .app_details_batch(&appids, cc, pacing)
                .await
                .with_context(|| format!("fetching appdetails batch for {cc}"))
            {
                Ok(details) => details,
                Err(err) => {
                    log.record(self.clock.now(), Stage::FetchAppdetailsBatch, Some(cc.as_str()), None, err);
                    continue;
                }
            };

            for appid in appids {
                if !budget.consume() {
                    break;
                }
                let payload = details.get(&appid).and_then(Option::as_ref);
                match self.process_app(request, &filter, cc, appid, payload, started_at).await {
                    Ok(Decision::Keep(obs)) => {
                        log.bump(Counter::Kept);
                        observations.push(obs);
                    }
                    Ok(Decision::Reject(counter)) => log.bump(counter),
                    Err(err) => log.record(self.clock.now(), Stage::ProcessApp, Some(cc.as_str()), Some(appid), err),
                }
            }

            info!(
                %scan_id,
                country = %cc,
                processed = budget.consumed(),
                kept = log.counters().get(Counter::Kept),
                "country done"
            );
        }

        let mut rows = merge_observations(&observations);
        // Wishlists only feed the new-release sort; upcoming rows look them up after truncation.
        let wishlists_feed_rank = matches!(request.mode, ModeParams::NewReleases { .. });
        if let ModeParams::NewReleases {
            min_reviews_per_day, ..
        } = request.mode
        {
            retain_min_velocity(&mut rows, min_reviews_per_day);
        }
        if request.enrich.wishlists && wishlists_feed_rank {
            enrich(&self.sources, &mut rows, EnrichField::Wishlists, &mut log, self.clock.as_ref()).await;
        }
        let mut rows = rank(rows, kind, request.top_n);
        if request.enrich.wishlists && !wishlists_feed_rank {
            enrich(&self.sources, &mut rows, EnrichField::Wishlists, &mut log, self.clock.as_ref()).await;
        }
        if request.enrich.followers {
            enrich(&self.sources, &mut rows, EnrichField::Followers, &mut log, self.clock.as_ref()).await;
        }

        let (counters, exceptions) = log.into_parts();
        info!(
            %scan_id,
            processed = budget.consumed(),
            rows = rows.len(),
            exceptions = exceptions.len(),
            "scan finished"
        );
        ScanResult {
            scan_id,
            started_at,
            finished_at: self.clock.now(),
            mode: kind,
            countries,
            budget,
            rows,
            counters,
            exceptions,
        }
    }

    async fn process_app(
        &self,
        request: &ScanRequest,
        filter: &TermFilter,
        cc: &str,
        appid: u32,
        payload: Option<&Value>,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Decision> {
        let Some(payload) = payload else {
            return Ok(Decision::Reject(Counter::MissingDetails));
        };
        let detail = AppDetail::from_payload(appid, payload).context("normalizing appdetails")?;
        if !detail.is_game() {
            return Ok(Decision::Reject(Counter::NonGameType));
        }
        match filter.check(&detail) {
            FilterVerdict::Pass => {}
            FilterVerdict::TagMiss => return Ok(Decision::Reject(Counter::FilteredTagOr)),
            FilterVerdict::IncludeMiss => return Ok(Decision::Reject(Counter::FilteredIncludeTerms)),
            FilterVerdict::Excluded => return Ok(Decision::Reject(Counter::FilteredExcludeTerms)),
        }

        let signal = match request.mode {
            ModeParams::NewReleases {
                window_days,
                review_days,
                ..
            } => match classify_new_release(&detail.release, now, window_days) {
                NewReleaseDecision::NoDate => return Ok(Decision::Reject(Counter::NewreleaseNoDate)),
                NewReleaseDecision::WrongWindow => {
                    return Ok(Decision::Reject(Counter::NewreleaseWrongWindow))
                }
                NewReleaseDecision::Keep { released } => {
                    let reviews = self
                        .sources
                        .reviews(appid, cc, review_days)
                        .await
                        .context("fetching review summary")?;
                    Signal::NewRelease {
                        released,
                        reviews,
                        reviews_per_day: reviews.per_day(review_days),
                    }
                }
            },
            ModeParams::Upcoming {
                window_days,
                include_unknown,
            } => match classify_upcoming(&detail.release, now, window_days, include_unknown) {
                UpcomingDecision::Keep { days_until } => Signal::Upcoming { days_until },
                rejected => {
                    debug!(
                        appid,
                        country = cc,
                        ?rejected,
                        release = %detail.release_text,
                        hinted = detail.looks_upcoming(),
                        "upcoming classification rejected"
                    );
                    return Ok(Decision::Reject(Counter::UpcomingClassifyReject));
                }
            },
        };

        Ok(Decision::Keep(Observation {
            country: cc.to_string(),
            detail,
            signal,
        }))
    }
}
