use std::collections::HashSet;

use super::detail::AppDetail;

/// Trimmed, non-empty names in first-seen order, deduplicated ignoring case.
pub fn extract_terms<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for name in names {
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        if seen.insert(name.to_lowercase()) {
            out.push(name.to_string());
        }
    }
    out
}

/// Lower-cased, trimmed filter terms with blanks dropped.
pub fn normalize_terms<S: AsRef<str>>(terms: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    terms
        .iter()
        .map(|t| t.as_ref().trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterVerdict {
    Pass,
    /// Tag list was given and none of the item's terms is in it.
    TagMiss,
    /// Include terms were given and none occurs in the item text.
    IncludeMiss,
    /// An exclude term occurs in the item text.
    Excluded,
}

/// Tag OR-filter plus free-text include/exclude terms, checked in that order.
#[derive(Debug, Clone, Default)]
pub struct TermFilter {
    tags: Vec<String>,
    include: Vec<String>,
    exclude: Vec<String>,
}

impl TermFilter {
    pub fn new<S: AsRef<str>>(tags: &[S], include: &[S], exclude: &[S]) -> Self {
        Self {
            tags: normalize_terms(tags),
            include: normalize_terms(include),
            exclude: normalize_terms(exclude),
        }
    }

    pub fn check(&self, detail: &AppDetail) -> FilterVerdict {
        if !self.tags.is_empty() {
            let hit = detail
                .terms
                .iter()
                .any(|term| self.tags.contains(&term.to_lowercase()));
            if !hit {
                return FilterVerdict::TagMiss;
            }
        }
        if self.include.is_empty() && self.exclude.is_empty() {
            return FilterVerdict::Pass;
        }
        let blob = detail.search_blob();
        if !self.include.is_empty() && !self.include.iter().any(|t| blob.contains(t.as_str())) {
            return FilterVerdict::IncludeMiss;
        }
        if self.exclude.iter().any(|t| blob.contains(t.as_str())) {
            return FilterVerdict::Excluded;
        }
        FilterVerdict::Pass
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalization::release::ReleaseSignal;

    fn detail(name: &str, terms: &[&str]) -> AppDetail {
        AppDetail {
            appid: 1,
            name: name.to_string(),
            developers: vec!["Quiet Forge".into()],
            publishers: vec![],
            app_type: Some("game".into()),
            terms: terms.iter().map(|t| t.to_string()).collect(),
            release_text: String::new(),
            coming_soon: false,
            release: ReleaseSignal::Blank,
        }
    }

    #[test]
    fn extract_terms_dedupes_ignoring_case() {
        let terms = extract_terms([" RPG ", "Indie", "rpg", "", "Strategy"]);
        assert_eq!(terms, vec!["RPG", "Indie", "Strategy"]);
    }

    #[test]
    fn tag_filter_is_an_or_over_terms() {
        let filter = TermFilter::new(&["roguelike", "Deckbuilder"], &[], &[]);
        assert_eq!(filter.check(&detail("Cards", &["Deckbuilder", "Indie"])), FilterVerdict::Pass);
        assert_eq!(filter.check(&detail("Racer", &["Racing"])), FilterVerdict::TagMiss);
    }

    #[test]
    fn include_and_exclude_match_text_blob() {
        let filter = TermFilter::new(&[], &["forge"], &["hentai"]);
        assert_eq!(filter.check(&detail("Night Drive", &[])), FilterVerdict::Pass);

        let filter = TermFilter::new(&[], &["space"], &[]);
        assert_eq!(filter.check(&detail("Night Drive", &["Racing"])), FilterVerdict::IncludeMiss);

        let filter = TermFilter::new(&[], &[], &["racing"]);
        assert_eq!(filter.check(&detail("Night Drive", &["Racing"])), FilterVerdict::Excluded);
    }

    #[test]
    fn tag_check_runs_before_text_terms() {
        let filter = TermFilter::new(&["puzzle"], &[], &["racing"]);
        assert_eq!(filter.check(&detail("Night Drive", &["Racing"])), FilterVerdict::TagMiss);
        assert_eq!(TermFilter::default().check(&detail("Night Drive", &["Racing"])), FilterVerdict::Pass);
    }
}
