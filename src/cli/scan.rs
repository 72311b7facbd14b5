use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, ValueEnum};
use tracing::{info, warn};

use crate::config::{Radar, RadarConfig};
use crate::scan::{self, Counter, ModeParams, PacingPreset, ScanRequest};
use crate::tiers::{self, Tier};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    New,
    Upcoming,
}

#[derive(Debug, Clone, Args)]
pub struct ScanArgs {
    #[arg(long, value_enum, default_value_t = ModeArg::New)]
    pub mode: ModeArg,
    /// Country set shortcut; ignored when --countries is given
    #[arg(long, value_enum, default_value_t = Tier::Primary)]
    pub tier: Tier,
    /// Explicit country codes (comma-separated), processed in this order
    #[arg(long, value_delimiter = ',')]
    pub countries: Vec<String>,
    /// Released in the last N days (new) or releasing in the next N days (upcoming)
    #[arg(long)]
    pub window_days: Option<u32>,
    /// Review lookback in days (new releases)
    #[arg(long, default_value_t = 3)]
    pub review_days: u32,
    #[arg(long, default_value_t = 0.5)]
    pub min_reviews_per_day: f64,
    /// Drop upcoming items without a concrete date
    #[arg(long = "no-unknown", action = ArgAction::SetTrue)]
    pub no_unknown: bool,
    #[arg(long, default_value_t = 3)]
    pub pages: u32,
    #[arg(long, default_value_t = 50)]
    pub per_page: u32,
    /// Max apps processed per scan, across all countries
    #[arg(long, default_value_t = 500)]
    pub max_apps: usize,
    #[arg(long, default_value_t = 60)]
    pub top_n: usize,
    #[arg(long, value_enum, default_value_t = PacingPreset::Normal)]
    pub preset: PacingPreset,
    /// Override the preset's appdetails batch size
    #[arg(long)]
    pub batch_size: Option<usize>,
    /// Override the preset's delay between appdetails requests
    #[arg(long)]
    pub delay_ms: Option<u64>,
    /// Keep items carrying any of these tags (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub tags: Vec<String>,
    #[arg(long = "include", value_delimiter = ',')]
    pub include_terms: Vec<String>,
    #[arg(long = "exclude", value_delimiter = ',')]
    pub exclude_terms: Vec<String>,
    #[arg(long = "no-wishlists", action = ArgAction::SetTrue)]
    pub no_wishlists: bool,
    #[arg(long = "no-followers", action = ArgAction::SetTrue)]
    pub no_followers: bool,
    #[arg(long = "no-snapshot", action = ArgAction::SetTrue)]
    pub no_snapshot: bool,
    #[arg(long, action = ArgAction::SetTrue)]
    pub pretty: bool,
}

impl ScanArgs {
    pub fn to_request(&self) -> Result<ScanRequest> {
        let countries: Vec<String> = if self.countries.is_empty() {
            self.tier.countries().iter().map(|c| c.to_string()).collect()
        } else {
            self.countries.clone()
        };
        for cc in &countries {
            if !tiers::is_known_country(cc) {
                warn!(country = %cc, "not an ISO country code; scanning anyway");
            }
        }
        if countries.is_empty() {
            bail!("no countries selected: pass --countries or a non-custom --tier");
        }

        let mode = match self.mode {
            ModeArg::New => ModeParams::NewReleases {
                window_days: self.window_days.unwrap_or(14),
                review_days: self.review_days,
                min_reviews_per_day: self.min_reviews_per_day,
            },
            ModeArg::Upcoming => ModeParams::Upcoming {
                window_days: self.window_days.unwrap_or(60),
                include_unknown: !self.no_unknown,
            },
        };

        let mut request = ScanRequest::new(mode, countries).with_preset(self.preset);
        request.pages = self.pages.max(1);
        request.per_page = self.per_page.max(1);
        request.max_apps = self.max_apps;
        request.top_n = self.top_n;
        if let Some(batch_size) = self.batch_size {
            request.batch_size = batch_size.max(1);
        }
        if let Some(delay_ms) = self.delay_ms {
            request.request_delay = Duration::from_millis(delay_ms);
        }
        request.include_tags = self.tags.clone();
        request.include_terms = self.include_terms.clone();
        request.exclude_terms = self.exclude_terms.clone();
        request.enrich.wishlists = !self.no_wishlists;
        request.enrich.followers = !self.no_followers;
        Ok(request)
    }
}

pub async fn run(cfg: &RadarConfig, args: ScanArgs) -> Result<()> {
    let request = args.to_request()?;
    let radar = Radar::connect(cfg)?;
    let result = radar.scanner().run(&request).await;

    if result.no_results() {
        warn!(
            processed = result.processed(),
            exceptions = result.exceptions.len(),
            "no results; increase pages/max apps, change countries, or relax filters"
        );
    }
    info!(
        kept = result.counters.get(Counter::Kept),
        exceptions = result.counters.get(Counter::Exceptions),
        rows = result.rows.len(),
        "scan summary"
    );

    if !args.no_snapshot {
        scan::save_snapshot(&radar.snapshots, &request, &result);
    }

    let out = if args.pretty {
        serde_json::to_string_pretty(&result)
    } else {
        serde_json::to_string(&result)
    }
    .context("serializing scan result")?;
    println!("{out}");
    Ok(())
}
