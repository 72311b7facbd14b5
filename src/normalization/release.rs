use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Formats the store uses for concrete release dates, tried in order.
pub const RELEASE_DATE_FORMATS: [&str; 5] = [
    "%d %b, %Y",
    "%b %d, %Y",
    "%d %B, %Y",
    "%B %d, %Y",
    "%Y-%m-%d",
];

/// What a release-date string resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReleaseSignal {
    /// A calendar day, as UTC midnight.
    Date { at: DateTime<Utc> },
    /// Bare year such as "2026".
    Year { year: i32 },
    /// Quarter such as "Q3 2026".
    Quarter { quarter: u8, year: i32 },
    /// Non-empty text that names no date ("Coming soon", "TBA", "To be announced").
    Unresolved,
    Blank,
}

impl ReleaseSignal {
    pub fn instant(&self) -> Option<DateTime<Utc>> {
        match self {
            ReleaseSignal::Date { at } => Some(*at),
            _ => None,
        }
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, ReleaseSignal::Blank)
    }
}

pub fn parse_release(text: &str) -> ReleaseSignal {
    let text = text.trim();
    if text.is_empty() {
        return ReleaseSignal::Blank;
    }
    for fmt in RELEASE_DATE_FORMATS {
        if let Ok(day) = NaiveDate::parse_from_str(text, fmt) {
            if let Some(midnight) = day.and_hms_opt(0, 0, 0) {
                return ReleaseSignal::Date {
                    at: midnight.and_utc(),
                };
            }
        }
    }
    if let Some(year) = bare_year(text) {
        return ReleaseSignal::Year { year };
    }
    if let Some((quarter, year)) = quarter_prefix(text) {
        return ReleaseSignal::Quarter { quarter, year };
    }
    ReleaseSignal::Unresolved
}

struct ReleasePatterns {
    year: Regex,
    quarter: Regex,
    upcoming_hint: Regex,
}

static RELEASE_PATTERNS: OnceLock<Option<ReleasePatterns>> = OnceLock::new();

fn patterns() -> Option<&'static ReleasePatterns> {
    RELEASE_PATTERNS
        .get_or_init(|| {
            let compiled = (|| -> Result<ReleasePatterns, regex::Error> {
                Ok(ReleasePatterns {
                    year: Regex::new(r"^(\d{4})$")?,
                    quarter: Regex::new(r"(?i)^q([1-4])\s*(\d{4})")?,
                    upcoming_hint: Regex::new(
                        r"(?i)(coming soon|tba|to be announced|q[1-4]\s*\d{4}|\d{4}|early access)",
                    )?,
                })
            })();
            match compiled {
                Ok(patterns) => Some(patterns),
                Err(err) => {
                    warn!(error = %err, "release patterns failed to compile");
                    None
                }
            }
        })
        .as_ref()
}

fn bare_year(text: &str) -> Option<i32> {
    patterns()?.year.captures(text)?.get(1)?.as_str().parse().ok()
}

fn quarter_prefix(text: &str) -> Option<(u8, i32)> {
    let caps = patterns()?.quarter.captures(text)?;
    let quarter = caps.get(1)?.as_str().parse().ok()?;
    let year = caps.get(2)?.as_str().parse().ok()?;
    Some((quarter, year))
}

/// Loose "this is not out yet" hint from the release text.
pub fn has_upcoming_hint(text: &str) -> bool {
    patterns().is_some_and(|p| p.upcoming_hint.is_match(text))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpcomingDecision {
    Keep { days_until: Option<i64> },
    RejectPast,
    RejectBeyondWindow,
    RejectUndated,
}

/// Concrete dates must fall in `[now, now + window_days]`; undated signals
/// pass only when `include_unknown` is set.
pub fn classify_upcoming(
    signal: &ReleaseSignal,
    now: DateTime<Utc>,
    window_days: u32,
    include_unknown: bool,
) -> UpcomingDecision {
    let Some(release) = signal.instant() else {
        return if include_unknown {
            UpcomingDecision::Keep { days_until: None }
        } else {
            UpcomingDecision::RejectUndated
        };
    };
    let delta_days = (release - now).num_seconds() as f64 / 86_400.0;
    if delta_days < 0.0 {
        UpcomingDecision::RejectPast
    } else if delta_days > f64::from(window_days) {
        UpcomingDecision::RejectBeyondWindow
    } else {
        UpcomingDecision::Keep {
            days_until: Some(delta_days.round() as i64),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewReleaseDecision {
    Keep { released: DateTime<Utc> },
    NoDate,
    WrongWindow,
}

/// Kept when released no later than `now` and at most `window_days` whole days ago.
pub fn classify_new_release(
    signal: &ReleaseSignal,
    now: DateTime<Utc>,
    window_days: u32,
) -> NewReleaseDecision {
    let Some(released) = signal.instant() else {
        return NewReleaseDecision::NoDate;
    };
    let age = now - released;
    if age < chrono::Duration::zero() || age.num_days() > i64::from(window_days) {
        return NewReleaseDecision::WrongWindow;
    }
    NewReleaseDecision::Keep { released }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn parses_store_formats_to_utc_midnight() {
        let expected = utc(2025, 12, 27, 0);
        for text in ["27 Dec, 2025", "Dec 27, 2025", "27 December, 2025", "December 27, 2025", "2025-12-27"] {
            assert_eq!(parse_release(text).instant(), Some(expected), "{text}");
        }
    }

    #[test]
    fn quarter_and_year_are_recognized_but_not_dated() {
        assert_eq!(parse_release("Q1 2026"), ReleaseSignal::Quarter { quarter: 1, year: 2026 });
        assert_eq!(parse_release("q3  2027"), ReleaseSignal::Quarter { quarter: 3, year: 2027 });
        assert_eq!(parse_release("2026"), ReleaseSignal::Year { year: 2026 });
        assert_eq!(parse_release("Coming soon"), ReleaseSignal::Unresolved);
        assert_eq!(parse_release("   "), ReleaseSignal::Blank);
        assert!(parse_release("Q1 2026").instant().is_none());
        assert!(!parse_release("Q1 2026").is_blank());
    }

    #[test]
    fn upcoming_hints() {
        assert!(has_upcoming_hint("Coming Soon"));
        assert!(has_upcoming_hint("Q2 2026"));
        assert!(has_upcoming_hint("To be announced"));
        assert!(!has_upcoming_hint("Soon-ish"));
        assert!(has_upcoming_hint("Early Access, full launch 2027"));
        assert!(has_upcoming_hint("TBA"));
    }

    #[test]
    fn out_of_range_quarters_and_long_numbers_stay_unresolved() {
        assert_eq!(parse_release("Q5 2026"), ReleaseSignal::Unresolved);
        assert_eq!(parse_release("20261"), ReleaseSignal::Unresolved);
        assert_eq!(parse_release("Q22026"), ReleaseSignal::Quarter { quarter: 2, year: 2026 });
    }

    #[test]
    fn upcoming_window_is_inclusive() {
        let now = utc(2026, 1, 1, 0);
        let in_ten = ReleaseSignal::Date { at: now + Duration::days(10) };
        assert_eq!(
            classify_upcoming(&in_ten, now, 10, false),
            UpcomingDecision::Keep { days_until: Some(10) }
        );
        assert_eq!(classify_upcoming(&in_ten, now, 9, false), UpcomingDecision::RejectBeyondWindow);

        let yesterday = ReleaseSignal::Date { at: now - Duration::days(1) };
        assert_eq!(classify_upcoming(&yesterday, now, 30, true), UpcomingDecision::RejectPast);
    }

    #[test]
    fn upcoming_days_until_rounds_fraction() {
        let now = utc(2026, 1, 1, 10);
        let signal = ReleaseSignal::Date { at: utc(2026, 1, 4, 0) };
        // 2 days 14 hours
        assert_eq!(
            classify_upcoming(&signal, now, 30, false),
            UpcomingDecision::Keep { days_until: Some(3) }
        );
    }

    #[test]
    fn undated_upcoming_depends_on_flag() {
        let now = utc(2026, 1, 1, 0);
        let quarter = parse_release("Q2 2026");
        assert_eq!(
            classify_upcoming(&quarter, now, 60, true),
            UpcomingDecision::Keep { days_until: None }
        );
        assert_eq!(classify_upcoming(&quarter, now, 60, false), UpcomingDecision::RejectUndated);
        assert_eq!(
            classify_upcoming(&ReleaseSignal::Blank, now, 60, true),
            UpcomingDecision::Keep { days_until: None }
        );
    }

    #[test]
    fn new_release_window_boundaries() {
        let now = utc(2026, 2, 15, 13);
        let at = |days: i64| ReleaseSignal::Date { at: utc(2026, 2, 15, 0) - Duration::days(days) };

        assert!(matches!(classify_new_release(&at(0), now, 14), NewReleaseDecision::Keep { .. }));
        assert!(matches!(classify_new_release(&at(14), now, 14), NewReleaseDecision::Keep { .. }));
        assert_eq!(classify_new_release(&at(15), now, 14), NewReleaseDecision::WrongWindow);

        let tomorrow = ReleaseSignal::Date { at: utc(2026, 2, 16, 0) };
        assert_eq!(classify_new_release(&tomorrow, now, 14), NewReleaseDecision::WrongWindow);
        assert_eq!(
            classify_new_release(&ReleaseSignal::Unresolved, now, 14),
            NewReleaseDecision::NoDate
        );
    }
}
