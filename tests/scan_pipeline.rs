use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use steam_radar::clock::ManualClock;
use steam_radar::scan::{Counter, ModeParams, ScanRequest, Scanner, Stage};
use steam_radar::steam::{Endpoints, Fetcher, RetryPolicy, SteamSources};
use steam_radar::storage::{Db, TtlCache};
use steam_radar::testing::{InstantSleeper, ScriptedTransport};

const STORE: &str = "http://store.test";
const GAMEDATA: &str = "http://gamedata.test";

fn search_url() -> String {
    format!("{STORE}/search/results/")
}

fn details_url() -> String {
    format!("{STORE}/api/appdetails")
}

fn scanner(transport: Arc<ScriptedTransport>) -> Scanner {
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 2, 1, 12, 0, 0).unwrap()));
    let cache = Arc::new(TtlCache::new(Db::open_in_memory().unwrap(), clock.clone()));
    let policy = RetryPolicy {
        jitter: Duration::ZERO,
        ..RetryPolicy::standard().with_max_attempts(3)
    };
    let fetcher = Fetcher::new(transport, Arc::new(InstantSleeper::new()), policy);
    let sources = SteamSources::new(fetcher, cache, Endpoints::new(STORE, GAMEDATA)).unwrap();
    Scanner::new(sources, clock)
}

fn listing(ids: &[u32]) -> String {
    let rows: String = ids
        .iter()
        .map(|id| format!(r#"<a class="search_result_row" data-ds-appid="{id}"></a>"#))
        .collect();
    json!({ "results_html": rows }).to_string()
}

fn game(appid: u32, name: &str, release: &str) -> String {
    let mut body = serde_json::Map::new();
    body.insert(
        appid.to_string(),
        json!({
            "success": true,
            "data": {
                "type": "game",
                "name": name,
                "developers": ["Lantern Studio"],
                "publishers": ["Lantern Studio"],
                "genres": [{"description": "Indie"}],
                "release_date": {"coming_soon": false, "date": release}
            }
        }),
    );
    Value::Object(body).to_string()
}

fn request(mode: ModeParams, countries: &[&str]) -> ScanRequest {
    let mut req = ScanRequest::new(mode, countries.iter().map(|c| c.to_string()).collect());
    req.pages = 1;
    req.request_delay = Duration::ZERO;
    req
}

#[tokio::test]
async fn no_country_starts_after_budget_is_spent() {
    let transport = Arc::new(ScriptedTransport::new());
    transport
        .respond(&search_url(), &[], 200, &listing(&[1, 2, 3, 4]))
        .respond(&details_url(), &[], 200, "{}");

    let mut req = request(ModeParams::upcoming(), &["US", "GB", "DE"]);
    req.max_apps = 2;
    req.enrich.wishlists = false;
    req.enrich.followers = false;

    let result = scanner(transport.clone()).run(&req).await;
    assert_eq!(result.budget.per_country_share(), 1);
    assert_eq!(result.processed(), 2);
    assert_eq!(result.counters.get(Counter::MissingDetails), 2);
    let de_calls = transport
        .calls()
        .iter()
        .filter(|c| c.param("cc") == Some("DE"))
        .count();
    assert_eq!(de_calls, 0);
    assert!(result.no_results());
    assert!(result.exceptions.is_empty());
}

#[tokio::test]
async fn failing_detail_batch_skips_only_that_country() {
    let transport = Arc::new(ScriptedTransport::new());
    transport
        .respond(&search_url(), &[("cc", "US")], 200, &listing(&[10]))
        .respond(&search_url(), &[("cc", "DE")], 200, &listing(&[20]))
        .respond(&search_url(), &[("cc", "GB")], 200, &listing(&[30]))
        .respond(&details_url(), &[("appids", "10")], 200, &game(10, "Harbor", "10 Feb, 2026"))
        .fail(&details_url(), &[("appids", "20"), ("cc", "DE")], "connection reset")
        .respond(&details_url(), &[("appids", "30")], 200, &game(30, "Ember", "Q3 2026"));

    let mut req = request(ModeParams::upcoming(), &["US", "DE", "GB"]);
    req.enrich.followers = false;

    let result = scanner(transport.clone()).run(&req).await;
    assert_eq!(result.counters.get(Counter::Exceptions), 1);
    assert_eq!(result.exceptions.len(), 1);
    let failure = &result.exceptions[0];
    assert_eq!(failure.stage, Stage::FetchAppdetailsBatch);
    assert_eq!(failure.country.as_deref(), Some("DE"));
    assert!(failure.trace.contains("connection reset"));

    let ids: Vec<u32> = result.rows.iter().map(|r| r.appid).collect();
    assert_eq!(ids, vec![10, 30]);
    assert!(result.rows.iter().all(|r| !r.countries.contains("DE")));
    assert_eq!(result.rows[1].release_text, "Q3 2026");
    assert_eq!(result.processed(), 2);
    // three attempts against the failing id, nothing retried elsewhere
    let de_detail_calls = transport
        .calls()
        .iter()
        .filter(|c| c.param("appids") == Some("20"))
        .count();
    assert_eq!(de_detail_calls, 3);
}

#[tokio::test]
async fn positivity_pools_reviews_across_countries() {
    let transport = Arc::new(ScriptedTransport::new());
    let reviews = format!("{STORE}/appreviews/7");
    transport
        .respond(&search_url(), &[], 200, &listing(&[7]))
        .respond(&details_url(), &[("appids", "7")], 200, &game(7, "Lantern", "25 Jan, 2026"))
        .respond(&reviews, &[], 200, r#"{"query_summary": {"total_reviews": 100, "total_positive": 50}}"#)
        .respond(&reviews, &[], 200, r#"{"query_summary": {"total_reviews": 50, "total_positive": 40}}"#)
        .respond(&format!("{GAMEDATA}/app/7.json"), &[], 200, r#"{"wishlists": 900}"#);

    let req = request(ModeParams::new_releases(), &["US", "DE"]);
    let result = scanner(transport).run(&req).await;

    assert_eq!(result.rows.len(), 1);
    let row = &result.rows[0];
    assert_eq!(row.countries, "DE, US");
    assert_eq!(row.metrics.percent_positive(), Some(60.0));
    assert_eq!(row.metrics.reviews_per_day(), Some(33.33));
    assert_eq!(row.wishlist_estimate, Some(900));
    assert_eq!(row.followers, None);
    assert_eq!(result.counters.get(Counter::Kept), 2);
    assert!(result.exceptions.is_empty());
}

#[tokio::test]
async fn upcoming_merge_keeps_earliest_days_until() {
    let transport = Arc::new(ScriptedTransport::new());
    transport
        .respond(&search_url(), &[], 200, &listing(&[9]))
        .respond(&details_url(), &[("appids", "9"), ("cc", "US")], 200, &game(9, "Tide", "20 Feb, 2026"))
        .respond(&details_url(), &[("appids", "9"), ("cc", "GB")], 200, &game(9, "Tide", "10 Feb, 2026"));

    let mut req = request(ModeParams::upcoming(), &["US", "GB"]);
    req.enrich.wishlists = false;
    req.enrich.followers = false;

    let result = scanner(transport).run(&req).await;
    assert_eq!(result.rows.len(), 1);
    assert_eq!(result.rows[0].metrics.days_until(), Some(9));
    assert_eq!(result.rows[0].release_text, "20 Feb, 2026");
    assert_eq!(result.rows[0].countries, "GB, US");
}

#[tokio::test]
async fn repeated_scan_is_served_from_cache() {
    let transport = Arc::new(ScriptedTransport::new());
    transport
        .respond(&search_url(), &[], 200, &listing(&[7, 8]))
        .respond(&details_url(), &[("appids", "7")], 200, &game(7, "Lantern", "25 Jan, 2026"))
        .respond(&details_url(), &[("appids", "8")], 200, r#"{"8": {"success": false}}"#)
        .respond(
            &format!("{STORE}/appreviews/7"),
            &[],
            200,
            r#"{"query_summary": {"total_reviews": 30, "total_positive": 27}}"#,
        );

    let scanner = scanner(transport.clone());
    let req = request(ModeParams::new_releases(), &["US"]);
    let first = scanner.run(&req).await;
    let upstream_calls = transport.calls().len();
    let second = scanner.run(&req).await;

    assert_eq!(transport.calls().len(), upstream_calls);
    assert_eq!(first.rows, second.rows);
    assert_eq!(first.counters, second.counters);
    assert_ne!(first.scan_id, second.scan_id);
    assert_eq!(second.rows[0].metrics.percent_positive(), Some(90.0));
}

#[tokio::test]
async fn tag_and_term_filters_are_counted_in_order() {
    let transport = Arc::new(ScriptedTransport::new());
    transport
        .respond(&search_url(), &[], 200, &listing(&[1, 2]))
        .respond(&details_url(), &[("appids", "1")], 200, &game(1, "Deep Space Miner", "10 Feb, 2026"))
        .respond(&details_url(), &[("appids", "2")], 200, &game(2, "Garden Story", "10 Feb, 2026"));

    let mut req = request(ModeParams::upcoming(), &["US"]);
    req.include_tags = vec!["indie".into()];
    req.include_terms = vec!["Space".into()];
    req.enrich.wishlists = false;
    req.enrich.followers = false;

    let result = scanner(transport).run(&req).await;
    assert_eq!(result.counters.get(Counter::FilteredIncludeTerms), 1);
    assert_eq!(result.counters.get(Counter::Kept), 1);
    assert_eq!(result.rows[0].name, "Deep Space Miner");

    let summary: Vec<(&str, u64)> = result.counters.iter().filter(|(_, n)| *n > 0).collect();
    assert_eq!(summary, vec![("filtered_include_terms", 1), ("kept", 1)]);
}

#[tokio::test]
async fn failed_id_list_skips_only_that_country() {
    let transport = Arc::new(ScriptedTransport::new());
    transport
        .fail(&search_url(), &[("cc", "US")], "listing timed out")
        .respond(&search_url(), &[("cc", "GB")], 200, &listing(&[1]))
        .respond(&details_url(), &[("appids", "1")], 200, &game(1, "Harbor", "25 Jan, 2026"))
        .respond(
            &format!("{STORE}/appreviews/1"),
            &[],
            200,
            r#"{"query_summary": {"total_reviews": 30, "total_positive": 27}}"#,
        );

    let mut req = request(ModeParams::new_releases(), &["US", "GB"]);
    req.enrich.wishlists = false;
    req.enrich.followers = false;

    let result = scanner(transport.clone()).run(&req).await;
    assert_eq!(result.exceptions.len(), 1);
    let failure = &result.exceptions[0];
    assert_eq!(failure.stage, Stage::FetchAppids);
    assert_eq!(failure.country.as_deref(), Some("US"));
    assert_eq!(failure.appid, None);
    assert!(failure.trace.contains("listing timed out"));

    assert_eq!(result.counters.get(Counter::Exceptions), 1);
    assert_eq!(result.counters.get(Counter::Kept), 1);
    assert_eq!(result.processed(), 1);
    assert_eq!(result.rows.len(), 1);
    assert_eq!(result.rows[0].countries, "GB");
    let us_detail_calls = transport
        .calls()
        .iter()
        .filter(|c| c.url == details_url() && c.param("cc") == Some("US"))
        .count();
    assert_eq!(us_detail_calls, 0);
}

#[tokio::test]
async fn failing_item_is_skipped_and_the_rest_of_the_country_kept() {
    let transport = Arc::new(ScriptedTransport::new());
    transport
        .respond(&search_url(), &[], 200, &listing(&[1, 2, 3]))
        .respond(&details_url(), &[("appids", "1")], 200, &game(1, "Harbor", "25 Jan, 2026"))
        .respond(&details_url(), &[("appids", "2")], 200, &game(2, "Ember", "26 Jan, 2026"))
        .respond(&details_url(), &[("appids", "3")], 200, &game(3, "Tide", "27 Jan, 2026"))
        .respond(
            &format!("{STORE}/appreviews/1"),
            &[],
            200,
            r#"{"query_summary": {"total_reviews": 30, "total_positive": 27}}"#,
        )
        .fail(&format!("{STORE}/appreviews/2"), &[], "reviews backend down")
        .respond(
            &format!("{STORE}/appreviews/3"),
            &[],
            200,
            r#"{"query_summary": {"total_reviews": 9, "total_positive": 9}}"#,
        );

    let mut req = request(ModeParams::new_releases(), &["US"]);
    req.enrich.wishlists = false;
    req.enrich.followers = false;

    let result = scanner(transport).run(&req).await;
    assert_eq!(result.exceptions.len(), 1);
    let failure = &result.exceptions[0];
    assert_eq!(failure.stage, Stage::ProcessApp);
    assert_eq!(failure.country.as_deref(), Some("US"));
    assert_eq!(failure.appid, Some(2));
    assert!(failure.trace.contains("reviews backend down"));

    assert_eq!(result.processed(), 3);
    assert_eq!(result.counters.get(Counter::Kept), 2);
    assert_eq!(result.counters.get(Counter::Exceptions), 1);
    let ids: Vec<u32> = result.rows.iter().map(|r| r.appid).collect();
    assert_eq!(ids, vec![1, 3]);
}

#[tokio::test]
async fn enrichment_failure_blanks_the_field_and_ranking_goes_on() {
    let transport = Arc::new(ScriptedTransport::new());
    transport
        .respond(&search_url(), &[], 200, &listing(&[1]))
        .respond(&details_url(), &[("appids", "1")], 200, &game(1, "Harbor", "10 Feb, 2026"))
        .fail(&format!("{GAMEDATA}/app/1.json"), &[], "gamedata unreachable")
        .respond(
            &format!("{STORE}/app/1/"),
            &[],
            200,
            r#"<div class="followers">5 followers</div>"#,
        );

    let req = request(ModeParams::upcoming(), &["US"]);
    let result = scanner(transport).run(&req).await;

    assert_eq!(result.exceptions.len(), 1);
    let failure = &result.exceptions[0];
    assert_eq!(failure.stage, Stage::Wishlists);
    assert_eq!(failure.country, None);
    assert_eq!(failure.appid, Some(1));

    assert_eq!(result.counters.get(Counter::Exceptions), 1);
    assert_eq!(result.counters.get(Counter::Kept), 1);
    assert_eq!(result.rows.len(), 1);
    assert_eq!(result.rows[0].wishlist_estimate, None);
    assert_eq!(result.rows[0].followers, Some(5));
    assert!(!result.no_results());
}

#[tokio::test]
async fn upcoming_wishlists_are_fetched_for_top_rows_only() {
    let transport = Arc::new(ScriptedTransport::new());
    transport
        .respond(&search_url(), &[], 200, &listing(&[1, 2, 3]))
        .respond(&details_url(), &[("appids", "1")], 200, &game(1, "Harbor", "10 Feb, 2026"))
        .respond(&details_url(), &[("appids", "2")], 200, &game(2, "Ember", "20 Feb, 2026"))
        .respond(&details_url(), &[("appids", "3")], 200, &game(3, "Tide", "Q3 2026"))
        .respond(&format!("{GAMEDATA}/app/1.json"), &[], 200, r#"{"wishlists": 1200}"#);

    let mut req = request(ModeParams::upcoming(), &["US"]);
    req.top_n = 1;
    req.enrich.followers = false;

    let result = scanner(transport.clone()).run(&req).await;
    assert_eq!(result.rows.len(), 1);
    assert_eq!(result.rows[0].appid, 1);
    assert_eq!(result.rows[0].wishlist_estimate, Some(1200));
    let wishlist_calls = transport
        .calls()
        .iter()
        .filter(|c| c.url.starts_with(GAMEDATA))
        .count();
    assert_eq!(wishlist_calls, 1);
}
