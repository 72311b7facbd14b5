use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::release::{has_upcoming_hint, parse_release, ReleaseSignal};
use super::terms::extract_terms;

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("appdetails payload for {appid} is malformed: {source}")]
    Malformed {
        appid: u32,
        #[source]
        source: serde_json::Error,
    },
}

// Lenient mirror of the appdetails `data` block. Missing fields and nulls are
// fine; a field of the wrong JSON type is not.
#[derive(Debug, Deserialize)]
struct RawAppData {
    #[serde(rename = "type", default)]
    app_type: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    developers: Option<Vec<Option<String>>>,
    #[serde(default)]
    publishers: Option<Vec<Option<String>>>,
    #[serde(default)]
    genres: Option<Vec<Option<DescriptionEntry>>>,
    #[serde(default)]
    categories: Option<Vec<Option<DescriptionEntry>>>,
    #[serde(default)]
    release_date: Option<RawReleaseDate>,
}

#[derive(Debug, Deserialize)]
struct DescriptionEntry {
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawReleaseDate {
    #[serde(default)]
    coming_soon: Option<bool>,
    #[serde(default)]
    date: Option<String>,
}

/// Typed projection of one storefront item as seen from one country.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppDetail {
    pub appid: u32,
    pub name: String,
    pub developers: Vec<String>,
    pub publishers: Vec<String>,
    pub app_type: Option<String>,
    /// Genre then category descriptions, case-insensitively unique.
    pub terms: Vec<String>,
    pub release_text: String,
    pub coming_soon: bool,
    pub release: ReleaseSignal,
}

impl AppDetail {
    pub fn from_payload(appid: u32, payload: &Value) -> Result<Self, NormalizeError> {
        let raw: RawAppData = serde_json::from_value(payload.clone())
            .map_err(|source| NormalizeError::Malformed { appid, source })?;

        let descriptions = |entries: &Option<Vec<Option<DescriptionEntry>>>| -> Vec<String> {
            entries
                .iter()
                .flatten()
                .flatten()
                .filter_map(|e| e.description.clone())
                .collect()
        };
        let genres = descriptions(&raw.genres);
        let categories = descriptions(&raw.categories);
        let terms = extract_terms(genres.iter().chain(categories.iter()).map(String::as_str));

        let (release_text, coming_soon) = match raw.release_date {
            Some(rd) => (
                rd.date.unwrap_or_default().trim().to_string(),
                rd.coming_soon.unwrap_or(false),
            ),
            None => (String::new(), false),
        };
        let release = parse_release(&release_text);

        Ok(Self {
            appid,
            name: raw.name.unwrap_or_default(),
            developers: flatten_names(raw.developers),
            publishers: flatten_names(raw.publishers),
            app_type: raw.app_type,
            terms,
            release_text,
            coming_soon,
            release,
        })
    }

    pub fn is_game(&self) -> bool {
        self.app_type.as_deref() == Some("game")
    }

    pub fn released_at(&self) -> Option<DateTime<Utc>> {
        self.release.instant()
    }

    pub fn developer_line(&self) -> String {
        self.developers.join(", ")
    }

    pub fn publisher_line(&self) -> String {
        self.publishers.join(", ")
    }

    pub fn terms_line(&self) -> String {
        self.terms.join(", ")
    }

    /// Lower-cased name, developer, publisher and terms, space separated.
    /// Free-text include/exclude terms match against this.
    pub fn search_blob(&self) -> String {
        let mut parts = vec![self.name.clone(), self.developer_line(), self.publisher_line()];
        parts.extend(self.terms.iter().cloned());
        parts.join(" ").to_lowercase()
    }

    /// Flag or text suggests the item is not out yet.
    pub fn looks_upcoming(&self) -> bool {
        self.coming_soon || (!self.release_text.is_empty() && has_upcoming_hint(&self.release_text))
    }
}

fn flatten_names(names: Option<Vec<Option<String>>>) -> Vec<String> {
    names
        .into_iter()
        .flatten()
        .flatten()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload() -> Value {
        json!({
            "type": "game",
            "name": "Star Forge",
            "developers": ["Ember Works", null],
            "publishers": ["Nova Publishing"],
            "genres": [{"id": "1", "description": "Action"}, {"id": "23", "description": "Indie"}],
            "categories": [{"id": 2, "description": "Single-player"}, {"id": 9, "description": "action"}, null],
            "release_date": {"coming_soon": false, "date": "27 Dec, 2025"}
        })
    }

    #[test]
    fn projects_payload() {
        let detail = AppDetail::from_payload(42, &payload()).unwrap();
        assert!(detail.is_game());
        assert_eq!(detail.name, "Star Forge");
        assert_eq!(detail.developer_line(), "Ember Works");
        assert_eq!(detail.terms, vec!["Action", "Indie", "Single-player"]);
        assert_eq!(detail.release_text, "27 Dec, 2025");
        assert_eq!(
            detail.released_at().map(|d| d.date_naive().to_string()),
            Some("2025-12-27".to_string())
        );
        assert_eq!(
            detail.search_blob(),
            "star forge ember works nova publishing action indie single-player"
        );
    }

    #[test]
    fn tolerates_missing_fields() {
        let detail = AppDetail::from_payload(7, &json!({"type": "dlc"})).unwrap();
        assert!(!detail.is_game());
        assert!(detail.terms.is_empty());
        assert!(detail.release.is_blank());
    }

    #[test]
    fn wrong_field_types_are_malformed() {
        let err = AppDetail::from_payload(9, &json!({"type": "game", "developers": "Solo Dev"}));
        assert!(matches!(err, Err(NormalizeError::Malformed { appid: 9, .. })));
        assert!(AppDetail::from_payload(9, &json!("not an object")).is_err());
    }

    #[test]
    fn coming_soon_flag_or_text_marks_upcoming() {
        let mut p = payload();
        p["release_date"] = json!({"coming_soon": true, "date": ""});
        assert!(AppDetail::from_payload(1, &p).unwrap().looks_upcoming());
        p["release_date"] = json!({"coming_soon": false, "date": "Q4 2026"});
        assert!(AppDetail::from_payload(1, &p).unwrap().looks_upcoming());
    }
}
