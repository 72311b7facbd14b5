//! Storefront access: transport seam, retrying fetcher, HTML extraction and
//! the cache-backed source adapters built on them.

pub mod fetcher;
pub mod http;
pub mod parse;
pub mod sources;

pub use fetcher::{FetchError, Fetcher, RetryPolicy, Sleeper, TokioSleeper};
pub use http::{HttpResponse, ReqwestTransport, Transport, TransportError};
pub use sources::{BatchPacing, Fetched, Origin, ReviewSummary, SearchKind, SourceError, SteamSources};

pub const DEFAULT_STORE_BASE: &str = "https://store.steampowered.com";
pub const DEFAULT_GAMEDATA_BASE: &str = "https://gamedata.wtf";

/// Base URLs for every upstream the adapters call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    store: String,
    gamedata: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::new(DEFAULT_STORE_BASE, DEFAULT_GAMEDATA_BASE)
    }
}

impl Endpoints {
    pub fn new(store: &str, gamedata: &str) -> Self {
        Self {
            store: store.trim_end_matches('/').to_string(),
            gamedata: gamedata.trim_end_matches('/').to_string(),
        }
    }

    pub fn search(&self) -> String {
        format!("{}/search/results/", self.store)
    }

    pub fn appdetails(&self) -> String {
        format!("{}/api/appdetails", self.store)
    }

    pub fn reviews(&self, appid: u32) -> String {
        format!("{}/appreviews/{appid}", self.store)
    }

    pub fn tag_browse(&self) -> String {
        format!("{}/tag/browse/", self.store)
    }

    pub fn wishlist(&self, appid: u32) -> String {
        format!("{}/app/{appid}.json", self.gamedata)
    }

    pub fn app_page(&self, appid: u32) -> String {
        format!("{}/app/{appid}/", self.store)
    }
}

/// Public store link for an app, independent of configured bases.
pub fn store_url(appid: u32) -> String {
    format!("{DEFAULT_STORE_BASE}/app/{appid}/")
}

/// Upper-cased country code; blank falls back to `US`.
pub fn normalize_country(cc: &str) -> String {
    let cc = cc.trim();
    if cc.is_empty() {
        "US".to_string()
    } else {
        cc.to_ascii_uppercase()
    }
}
