//! Extraction from the store's HTML fragments: search result rows, the tag
//! browse list and the follower count on an app page.

use regex::Regex;

pub struct StorePageParser {
    search_row: Regex,
    appid_attr: Regex,
    packageid_attr: Regex,
    tag_link: Regex,
    followers: Regex,
}

impl StorePageParser {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            search_row: Regex::new(
                r#"(?is)<a\b[^>]*\bclass\s*=\s*"[^"]*\bsearch_result_row\b[^"]*"[^>]*>"#,
            )?,
            appid_attr: Regex::new(r#"(?i)\bdata-ds-appid\s*=\s*"([^"]*)""#)?,
            packageid_attr: Regex::new(r#"(?i)\bdata-ds-packageid\s*=\s*"([^"]*)""#)?,
            tag_link: Regex::new(
                r#"(?is)<a\b[^>]*\bclass\s*=\s*"[^"]*\btag_browse_tag\b[^"]*"[^>]*>(.*?)</a>"#,
            )?,
            followers: Regex::new(r"(?i)([\d,]+)\s+followers")?,
        })
    }

    /// App ids in row order. `data-ds-appid` may hold a comma list; the first
    /// numeric entry wins. Rows without a usable id are skipped.
    pub fn search_appids(&self, results_html: &str) -> Vec<u32> {
        self.search_row
            .find_iter(results_html)
            .filter_map(|row| {
                let tag = row.as_str();
                let raw = self
                    .appid_attr
                    .captures(tag)
                    .or_else(|| self.packageid_attr.captures(tag))?
                    .get(1)?
                    .as_str();
                let first = raw.split(',').next()?.trim();
                if first.is_empty() || !first.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                first.parse::<u32>().ok()
            })
            .collect()
    }

    /// Tag names in page order (the store lists them by popularity).
    pub fn tag_names(&self, html: &str) -> Vec<String> {
        self.tag_link
            .captures_iter(html)
            .filter_map(|caps| {
                let name = decode_entities(&strip_html_tags(caps.get(1)?.as_str()));
                let name = name.trim();
                (!name.is_empty()).then(|| name.to_string())
            })
            .collect()
    }

    pub fn follower_count(&self, html: &str) -> Option<u64> {
        let caps = self.followers.captures(html)?;
        let digits: String = caps.get(1)?.as_str().chars().filter(|c| *c != ',').collect();
        digits.parse::<u64>().ok()
    }
}

pub fn strip_html_tags(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_tag = false;
    let mut prev_space = false;
    for ch in input.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => {
                if c.is_whitespace() {
                    if !prev_space {
                        out.push(' ');
                        prev_space = true;
                    }
                } else {
                    out.push(c);
                    prev_space = false;
                }
            }
            _ => {}
        }
    }
    out.trim().to_string()
}

fn decode_entities(input: &str) -> String {
    input
        .replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}
