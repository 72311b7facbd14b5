//! Environment helpers: one-time dotenv loading and typed getters.
//! Every getter calls `init_env()` first, so explicit initialization is optional.
use std::str::FromStr;
use std::sync::Once;

use tracing::warn;

static INIT: Once = Once::new();

/// Load `.env` once. Safe to call many times.
pub fn init_env() {
    INIT.call_once(|| {
        let _ = dotenv::dotenv();
    });
}

/// Optional env var (None if unset or blank).
pub fn env_opt(key: &str) -> Option<String> {
    init_env();
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => None,
    }
}

/// Parsed value with default fallback. Unparseable values are logged and ignored.
pub fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    match env_opt(key) {
        Some(raw) => match raw.parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                warn!(target = "env", key, value = %raw, "unparseable value; using default");
                default
            }
        },
        None => default,
    }
}
