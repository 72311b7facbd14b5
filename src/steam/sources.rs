//! Cache-backed source adapters, one per upstream endpoint.
//!
//! Every adapter looks up its cache key first and returns a hit as-is. On a
//! miss it fetches, parses, stores with a source-specific TTL and returns.
//! Unparseable or "not successful" payloads are cached as negatives; transport
//! and status failures after retries come back as `SourceError` and are not
//! cached.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use super::fetcher::{ensure_success, FetchError, Fetcher, RetryPolicy};
use super::http::HttpResponse;
use super::parse::StorePageParser;
use super::{normalize_country, Endpoints};
use crate::storage::TtlCache;

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;

pub const TAGS_TTL: Duration = Duration::from_secs(24 * HOUR);
pub const SEARCH_TTL: Duration = Duration::from_secs(6 * HOUR);
pub const DETAILS_TTL: Duration = Duration::from_secs(24 * HOUR);
pub const REVIEWS_TTL: Duration = Duration::from_secs(30 * MINUTE);
pub const WISHLIST_TTL: Duration = Duration::from_secs(6 * HOUR);
pub const FOLLOWERS_TTL: Duration = Duration::from_secs(12 * HOUR);
/// Unparseable pages and missing appdetails.
pub const NEGATIVE_TTL: Duration = Duration::from_secs(30 * MINUTE);
/// Enrichment endpoints that answered without a usable number.
pub const ENRICH_NEGATIVE_TTL: Duration = Duration::from_secs(HOUR);

#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("store page patterns failed to compile: {0}")]
    Parser(#[from] regex::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchKind {
    NewReleases,
    Upcoming,
}

impl SearchKind {
    fn cache_tag(self) -> &'static str {
        match self {
            SearchKind::NewReleases => "new",
            SearchKind::Upcoming => "upcoming",
        }
    }

    fn extra_params(self) -> &'static [(&'static str, &'static str)] {
        match self {
            SearchKind::NewReleases => &[("sort_by", "Released_DESC")],
            SearchKind::Upcoming => &[("os", "win"), ("filter", "comingsoon")],
        }
    }
}

/// Where an adapter's answer came from. Pacing only applies to upstream hits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Cache,
    Upstream,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
    pub value: T,
    pub origin: Origin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReviewSummary {
    pub total: u64,
    pub positive: u64,
}

impl ReviewSummary {
    /// Reviews per day over the lookback, to 2 decimals.
    pub fn per_day(&self, lookback_days: u32) -> f64 {
        let per_day = self.total as f64 / f64::from(lookback_days.max(1));
        (per_day * 100.0).round() / 100.0
    }

}

/// Chunking and inter-request delay for detail lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPacing {
    pub batch_size: usize,
    pub delay: Duration,
}

#[derive(Debug, Serialize, Deserialize)]
struct CachedTags {
    tags: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CachedDetail {
    data: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CachedWishlist {
    wishlists: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CachedFollowers {
    followers: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct SearchPage {
    results_html: Option<String>,
}

fn query(pairs: &[(&str, String)]) -> Vec<(String, String)> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

#[derive(Clone)]
pub struct SteamSources {
    fetcher: Fetcher,
    cache: Arc<TtlCache>,
    endpoints: Endpoints,
    parser: Arc<StorePageParser>,
    enrich_policy: RetryPolicy,
}

impl SteamSources {
    pub fn new(fetcher: Fetcher, cache: Arc<TtlCache>, endpoints: Endpoints) -> Result<Self, SourceError> {
        let enrich_policy = fetcher
            .policy()
            .clone()
            .with_max_attempts(RetryPolicy::enrichment().max_attempts);
        Ok(Self {
            fetcher,
            cache,
            endpoints,
            parser: Arc::new(StorePageParser::new()?),
            enrich_policy,
        })
    }

    pub fn with_enrichment_policy(mut self, policy: RetryPolicy) -> Self {
        self.enrich_policy = policy;
        self
    }

    fn cached<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.cache.get_json::<T>(key) {
            Ok(hit) => {
                debug!(key, hit = hit.is_some(), "cache lookup");
                hit
            }
            Err(err) => {
                warn!(key, error = %err, "cache read failed; treating as miss");
                None
            }
        }
    }

    fn remember<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        if let Err(err) = self.cache.set_json(key, value, ttl) {
            warn!(key, error = %err, "cache write failed");
        }
    }

    async fn get_ok(&self, url: &str, query: &[(String, String)]) -> Result<HttpResponse, FetchError> {
        let resp = self.fetcher.fetch(url, query).await?;
        ensure_success(url, resp)
    }

    /// Tag names for a country, most popular first.
    pub async fn global_tags(&self, cc: &str) -> Result<Vec<String>, SourceError> {
        let cc = normalize_country(cc);
        let key = format!("global_tags::{cc}");
        if let Some(hit) = self.cached::<CachedTags>(&key) {
            return Ok(hit.tags);
        }

        let url = self.endpoints.tag_browse();
        let resp = self.get_ok(&url, &query(&[("cc", cc.clone())])).await?;
        let tags = self.parser.tag_names(&resp.body);
        let ttl = if tags.is_empty() { NEGATIVE_TTL } else { TAGS_TTL };
        self.remember(&key, &CachedTags { tags: tags.clone() }, ttl);
        Ok(tags)
    }

    /// Candidate ids over `pages` search pages of `per_page` rows, unique in
    /// first-seen order.
    pub async fn search_appids(
        &self,
        kind: SearchKind,
        cc: &str,
        pages: u32,
        per_page: u32,
    ) -> Result<Vec<u32>, SourceError> {
        let cc = normalize_country(cc);
        let url = self.endpoints.search();
        let mut ids: Vec<u32> = Vec::new();

        for page in 0..pages {
            let start = page.saturating_mul(per_page);
            let key = format!("search::{}::{cc}::{start}::{per_page}", kind.cache_tag());
            if let Some(hit) = self.cached::<Vec<u32>>(&key) {
                ids.extend(hit);
                continue;
            }

            let mut params = query(&[
                ("cc", cc.clone()),
                ("l", "english".to_string()),
                ("start", start.to_string()),
                ("count", per_page.to_string()),
                ("infinite", "1".to_string()),
                ("category1", "998".to_string()),
            ]);
            params.extend(
                kind.extra_params()
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string())),
            );
            let resp = self.get_ok(&url, &params).await?;
            let (page_ids, ttl) = match serde_json::from_str::<SearchPage>(&resp.body) {
                Ok(SearchPage {
                    results_html: Some(html),
                }) => (self.parser.search_appids(&html), SEARCH_TTL),
                Ok(_) => {
                    warn!(country = %cc, start, "search page without results_html");
                    (Vec::new(), NEGATIVE_TTL)
                }
                Err(err) => {
                    warn!(country = %cc, start, error = %err, "unparseable search page");
                    (Vec::new(), NEGATIVE_TTL)
                }
            };
            debug!(country = %cc, start, found = page_ids.len(), "search page");
            self.remember(&key, &page_ids, ttl);
            ids.extend(page_ids);
        }

        let mut seen = HashSet::new();
        ids.retain(|id| seen.insert(*id));
        Ok(ids)
    }

    /// Raw appdetails `data` block, or `None` when the store reports no success.
    pub async fn app_details(&self, appid: u32, cc: &str) -> Result<Fetched<Option<Value>>, SourceError> {
        let cc = normalize_country(cc);
        let key = format!("appdetails::{appid}::{cc}");
        if let Some(hit) = self.cached::<CachedDetail>(&key) {
            return Ok(Fetched {
                value: hit.data,
                origin: Origin::Cache,
            });
        }

        let url = self.endpoints.appdetails();
        let params = query(&[
            ("appids", appid.to_string()),
            ("cc", cc.clone()),
            ("l", "english".to_string()),
        ]);
        let resp = self.get_ok(&url, &params).await?;
        let data = serde_json::from_str::<Value>(&resp.body)
            .ok()
            .and_then(|payload| {
                let block = payload.get(appid.to_string())?;
                if !block.get("success").and_then(Value::as_bool).unwrap_or(false) {
                    return None;
                }
                block.get("data").filter(|d| !d.is_null()).cloned()
            });
        let ttl = if data.is_some() { DETAILS_TTL } else { NEGATIVE_TTL };
        if data.is_none() {
            debug!(appid, country = %cc, "appdetails not successful; caching negative");
        }
        self.remember(&key, &CachedDetail { data: data.clone() }, ttl);
        Ok(Fetched {
            value: data,
            origin: Origin::Upstream,
        })
    }

    /// Sequential detail lookups in chunks of `batch_size`, sleeping `delay`
    /// after each lookup that went upstream. The first failure aborts the batch.
    pub async fn app_details_batch(
        &self,
        appids: &[u32],
        cc: &str,
        pacing: BatchPacing,
    ) -> Result<IndexMap<u32, Option<Value>>, SourceError> {
        let cc = normalize_country(cc);
        let chunk_size = pacing.batch_size.max(1);
        let chunks = appids.len().div_ceil(chunk_size);
        let mut out = IndexMap::with_capacity(appids.len());

        for (idx, chunk) in appids.chunks(chunk_size).enumerate() {
            debug!(country = %cc, chunk = idx + 1, chunks, size = chunk.len(), "appdetails chunk");
            for &appid in chunk {
                let fetched = self.app_details(appid, &cc).await?;
                if fetched.origin == Origin::Upstream && !pacing.delay.is_zero() {
                    self.fetcher.sleeper().sleep(pacing.delay).await;
                }
                out.insert(appid, fetched.value);
            }
        }
        Ok(out)
    }

    /// Recent review totals; lookback is clamped to at least one day.
    pub async fn reviews(&self, appid: u32, cc: &str, lookback_days: u32) -> Result<ReviewSummary, SourceError> {
        let cc = normalize_country(cc);
        let days = lookback_days.max(1);
        let key = format!("reviews::{appid}::{cc}::{days}");
        if let Some(hit) = self.cached::<ReviewSummary>(&key) {
            return Ok(hit);
        }

        let url = self.endpoints.reviews(appid);
        let params = query(&[
            ("json", "1".to_string()),
            ("filter", "recent".to_string()),
            ("language", "all".to_string()),
            ("purchase_type", "all".to_string()),
            ("day_range", days.to_string()),
        ]);
        let resp = self.get_ok(&url, &params).await?;
        let summary = match serde_json::from_str::<Value>(&resp.body) {
            Ok(payload) => {
                let q = payload.get("query_summary");
                let count = |field: &str| q.and_then(|q| q.get(field)).and_then(Value::as_u64).unwrap_or(0);
                ReviewSummary {
                    total: count("total_reviews"),
                    positive: count("total_positive"),
                }
            }
            Err(err) => {
                warn!(appid, country = %cc, error = %err, "unparseable review summary");
                ReviewSummary::default()
            }
        };
        self.remember(&key, &summary, REVIEWS_TTL);
        Ok(summary)
    }

    /// Third-party wishlist estimate. Any non-200 or missing number is a cached `None`.
    pub async fn wishlist_estimate(&self, appid: u32) -> Result<Option<u64>, SourceError> {
        let key = format!("wl_est::{appid}");
        if let Some(hit) = self.cached::<CachedWishlist>(&key) {
            return Ok(hit.wishlists);
        }

        let url = self.endpoints.wishlist(appid);
        let resp = self.fetcher.fetch_with(&self.enrich_policy, &url, &[]).await?;
        let estimate = if resp.status == 200 {
            serde_json::from_str::<Value>(&resp.body)
                .ok()
                .and_then(|payload| {
                    ["wishlists", "wishlist", "wl"]
                        .iter()
                        .find_map(|field| payload.get(*field).filter(|v| !v.is_null()))
                        .and_then(as_count)
                })
        } else {
            debug!(appid, status = resp.status, "wishlist estimate unavailable");
            None
        };
        let ttl = if estimate.is_some() { WISHLIST_TTL } else { ENRICH_NEGATIVE_TTL };
        self.remember(&key, &CachedWishlist { wishlists: estimate }, ttl);
        Ok(estimate)
    }

    /// Follower count scraped from the US store page.
    pub async fn followers(&self, appid: u32) -> Result<Option<u64>, SourceError> {
        let key = format!("followers::{appid}");
        if let Some(hit) = self.cached::<CachedFollowers>(&key) {
            return Ok(hit.followers);
        }

        let url = self.endpoints.app_page(appid);
        let params = query(&[("cc", "US".to_string()), ("l", "english".to_string())]);
        let resp = self.fetcher.fetch_with(&self.enrich_policy, &url, &params).await?;
        let count = if resp.status == 200 {
            self.parser.follower_count(&resp.body)
        } else {
            debug!(appid, status = resp.status, "store page unavailable");
            None
        };
        let ttl = if count.is_some() { FOLLOWERS_TTL } else { ENRICH_NEGATIVE_TTL };
        self.remember(&key, &CachedFollowers { followers: count }, ttl);
        Ok(count)
    }
}

/// Non-negative integer from a JSON number or numeric string.
fn as_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().replace(',', "").parse().ok(),
        _ => None,
    }
}
