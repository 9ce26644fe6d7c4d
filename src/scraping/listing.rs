//! CELEX discovery on listing pages
//!
//! Listing pages link to documents in several surface encodings: the number
//! in the link text, a plain `?uri=CELEX:...` query, a percent-encoded (or
//! doubly percent-encoded) query, or an absolute URL wrapped inside a
//! `javascript:` call. Every hyperlink's text and href are checked; links
//! that carry nothing recognisable simply contribute nothing.

use scraper::{Html, Selector};
use std::collections::BTreeSet;
use tracing::{info, warn};
use url::Url;

use super::fetcher::PageFetcher;
use crate::celex::CelexNumber;

/// Query parameters that carry a CELEX reference
const CELEX_PARAMS: &[&str] = &["uri", "celex"];

/// Upper bound on nested percent-decoding passes
const MAX_DECODE_PASSES: usize = 3;

/// Extracts canonical CELEX numbers from listing markup
#[derive(Debug, Clone)]
pub struct ListingScanner {
    sectors: Vec<char>,
}

impl ListingScanner {
    /// Create a scanner keeping only the given sector digits
    pub fn new(sectors: Vec<char>) -> Self {
        Self { sectors }
    }

    /// Extract every CELEX number referenced by a hyperlink on the page
    pub fn extract(&self, html: &str) -> BTreeSet<CelexNumber> {
        let document = Html::parse_document(html);
        let mut found = BTreeSet::new();

        if let Ok(selector) = Selector::parse("a") {
            for link in document.select(&selector) {
                let text: String = link.text().collect();
                found.extend(CelexNumber::find_all(&text));

                if let Some(href) = link.value().attr("href") {
                    found.extend(celex_from_href(href));
                }
            }
        }

        found.retain(|celex| self.sectors.contains(&celex.sector()));
        found
    }

    /// Fetch a listing page and extract its CELEX numbers.
    ///
    /// A failed fetch yields an empty set so one unreachable page never
    /// aborts discovery.
    pub async fn scan<F>(&self, fetcher: &F, url: &Url) -> BTreeSet<CelexNumber>
    where
        F: PageFetcher + ?Sized,
    {
        info!(url = %url, "Scanning listing page");
        match fetcher.fetch(url).await {
            Ok(page) => {
                let found = self.extract(&page.body);
                info!(url = %url, "Found {} unique CELEX numbers", found.len());
                found
            }
            Err(e) => {
                warn!(url = %url, "Listing page unavailable, contributing nothing: {}", e);
                BTreeSet::new()
            }
        }
    }
}

impl Default for ListingScanner {
    fn default() -> Self {
        Self::new(vec!['6'])
    }
}

/// Decode percent-encoding until the string stops changing
pub(crate) fn decode_fully(raw: &str) -> String {
    let mut current = raw.to_string();
    for _ in 0..MAX_DECODE_PASSES {
        if !current.contains('%') {
            break;
        }
        match urlencoding::decode(&current) {
            Ok(decoded) if decoded != current => current = decoded.into_owned(),
            _ => break,
        }
    }
    current
}

/// Absolute URLs embedded anywhere in a string (e.g. `javascript:open('https://...')`)
fn embedded_urls(text: &str) -> Vec<Url> {
    let mut urls = Vec::new();
    let mut rest = text;

    while let Some(pos) = rest.find("http") {
        let candidate = &rest[pos..];
        let end = candidate
            .find(|c: char| c.is_whitespace() || matches!(c, '\'' | '"' | ')' | '(' | ',' | ';' | '<' | '>'))
            .unwrap_or(candidate.len());
        if let Ok(url) = Url::parse(&candidate[..end]) {
            if url.scheme() == "http" || url.scheme() == "https" {
                urls.push(url);
            }
        }
        rest = &candidate[4..];
    }

    urls
}

/// CELEX numbers carried in a query parameter value such as `CELEX:62019CJ0123`
fn celex_from_param(value: &str) -> Option<CelexNumber> {
    let trimmed = value.trim();
    let stripped = match trimmed.get(..6) {
        Some(prefix) if prefix.eq_ignore_ascii_case("celex:") || prefix.eq_ignore_ascii_case("celex=") => {
            &trimmed[6..]
        }
        _ => trimmed,
    };
    CelexNumber::parse(stripped).ok()
}

/// All CELEX numbers an href refers to, after unwrapping its encodings
fn celex_from_href(href: &str) -> BTreeSet<CelexNumber> {
    let decoded = decode_fully(href);
    let mut found: BTreeSet<CelexNumber> = BTreeSet::new();

    let mut urls = embedded_urls(&decoded);
    if let Ok(url) = Url::parse(&decoded) {
        urls.push(url);
    }

    for url in &urls {
        for (key, value) in url.query_pairs() {
            if CELEX_PARAMS.iter().any(|p| key.eq_ignore_ascii_case(p)) {
                if let Some(celex) = celex_from_param(&decode_fully(&value)) {
                    found.insert(celex);
                }
            }
        }
    }

    found.extend(CelexNumber::find_all(&decoded));
    found
}
