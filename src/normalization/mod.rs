//! Storefront payloads to typed items, plus the release-window and term rules
//! the scanner filters with.

pub mod detail;
pub mod release;
pub mod terms;

pub use detail::{AppDetail, NormalizeError};
pub use release::{
    classify_new_release, classify_upcoming, parse_release, NewReleaseDecision, ReleaseSignal,
    UpcomingDecision,
};
pub use terms::{extract_terms, FilterVerdict, TermFilter};
