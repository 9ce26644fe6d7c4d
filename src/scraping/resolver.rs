//! CELEX → (canonical URL, text) resolution
//!
//! 1. Fetch the reference-language page for the identifier.
//! 2. Look for a cross-link to the target-language edition (language code in
//!    the path as `/<LANG>/TXT`, or a `locale`/`lang` query parameter).
//! 3. Without one, build the target URL from the configured template.
//! 4. Fetch the target page and extract its main text.
//!
//! Any missing piece yields an error; partial text is never returned.

use scraper::{Html, Selector};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use super::extractor::{ContentExtractor, ExtractError};
use super::fetcher::{FetchError, Page, PageFetcher};
use super::listing::decode_fully;
use super::politeness::Throttle;
use crate::celex::CelexNumber;
use crate::config::ResolverConfig;

/// Query parameters that name the page language
const LANGUAGE_PARAMS: &[&str] = &["locale", "lang"];

/// Errors that prevent a document from being resolved
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("Extraction failed: {0}")]
    Extract(#[from] ExtractError),
}

/// A resolved target-language document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDocument {
    pub celex: CelexNumber,
    /// Canonical locator of the target-language edition
    pub url: Url,
    /// Extracted plain text (never empty)
    pub content: String,
    /// Whether the URL came from a cross-link rather than the template
    pub via_cross_link: bool,
}

/// Resolves identifiers to target-language documents
#[derive(Debug, Clone)]
pub struct ContentResolver {
    config: ResolverConfig,
    extractor: ContentExtractor,
    link_selector: Selector,
}

impl ContentResolver {
    /// Create a resolver from configuration
    pub fn new(config: ResolverConfig) -> Result<Self, ExtractError> {
        let extractor = ContentExtractor::new(&config)?;
        let link_selector = Selector::parse("a[href]")
            .map_err(|_| ExtractError::InvalidSelector("a[href]".to_string()))?;

        Ok(Self {
            config,
            extractor,
            link_selector,
        })
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Reference-language page for an identifier
    pub fn reference_url(&self, celex: &CelexNumber) -> Result<Url, ResolveError> {
        parse_url(&celex.fill_template(&self.config.reference_url_template))
    }

    /// Templated target-language URL used when no cross-link exists
    pub fn fallback_url(&self, celex: &CelexNumber) -> Result<Url, ResolveError> {
        parse_url(&celex.fill_template(&self.config.target_url_template))
    }

    /// Find the cross-link to the target-language edition on a reference page
    pub fn find_target_link(&self, page: &Page, celex: &CelexNumber) -> Option<Url> {
        let document = Html::parse_document(&page.body);

        document
            .select(&self.link_selector)
            .filter_map(|a| a.value().attr("href"))
            .filter_map(|href| page.url.join(href.trim()).ok())
            .filter(|url| url.scheme() == "http" || url.scheme() == "https")
            .find(|url| self.is_target_edition(url, celex))
    }

    fn is_target_edition(&self, url: &Url, celex: &CelexNumber) -> bool {
        let decoded = decode_fully(url.as_str()).to_ascii_uppercase();
        if !decoded.contains(celex.as_str()) {
            return false;
        }

        let lang = self.config.target_language.trim();
        let path_marker = format!("/{}/TXT", lang.to_ascii_uppercase());
        if url.path().to_ascii_uppercase().contains(&path_marker) {
            return true;
        }

        url.query_pairs().any(|(key, value)| {
            LANGUAGE_PARAMS.iter().any(|p| key.eq_ignore_ascii_case(p)) && value.eq_ignore_ascii_case(lang)
        })
    }

    /// Work out which URL holds the target-language edition.
    ///
    /// A failed reference page is not fatal; the template still applies.
    pub async fn locate<F>(
        &self,
        fetcher: &F,
        throttle: &mut Throttle,
        celex: &CelexNumber,
    ) -> Result<(Url, bool), ResolveError>
    where
        F: PageFetcher + ?Sized,
    {
        let reference = self.reference_url(celex)?;
        throttle.wait().await;

        match fetcher.fetch(&reference).await {
            Ok(page) => {
                if let Some(url) = self.find_target_link(&page, celex) {
                    debug!(celex = %celex, url = %url, "found target-language cross-link");
                    return Ok((url, true));
                }
                debug!(celex = %celex, "no target-language cross-link, using template");
            }
            Err(e) => {
                warn!(celex = %celex, "Reference page unavailable, using template: {}", e);
            }
        }

        Ok((self.fallback_url(celex)?, false))
    }

    /// Resolve an identifier to its target-language URL and extracted text
    pub async fn resolve<F>(
        &self,
        fetcher: &F,
        throttle: &mut Throttle,
        celex: &CelexNumber,
    ) -> Result<ResolvedDocument, ResolveError>
    where
        F: PageFetcher + ?Sized,
    {
        info!(celex = %celex, "Resolving document");
        let (url, via_cross_link) = self.locate(fetcher, throttle, celex).await?;

        throttle.wait().await;
        let page = fetcher.fetch(&url).await?;
        let content = self.extractor.extract(&page.body)?;

        Ok(ResolvedDocument {
            celex: celex.clone(),
            url,
            content,
            via_cross_link,
        })
    }
}

fn parse_url(raw: &str) -> Result<Url, ResolveError> {
    Url::parse(raw).map_err(|e| ResolveError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::time::Duration;

    /// Serves canned bodies by exact URL, 404 otherwise
    #[derive(Default)]
    struct CannedFetcher {
        pages: HashMap<String, String>,
        requested: Mutex<Vec<String>>,
    }

    impl CannedFetcher {
        fn with(mut self, url: &str, body: &str) -> Self {
            self.pages.insert(url.to_string(), body.to_string());
            self
        }
    }

    #[async_trait]
    impl PageFetcher for CannedFetcher {
        async fn fetch_with_timeout(&self, url: &Url, _timeout: Option<Duration>) -> Result<Page, FetchError> {
            self.requested.lock().push(url.to_string());
            match self.pages.get(url.as_str()) {
                Some(body) => Ok(Page::new(url.clone(), body.clone())),
                None => Err(FetchError::Status {
                    url: url.to_string(),
                    status: 404,
                }),
            }
        }
    }

    const EN_URL: &str = "https://eur-lex.europa.eu/legal-content/EN/TXT/?uri=CELEX:62019CJ0123";
    const NL_TEMPLATE_URL: &str = "https://eur-lex.europa.eu/legal-content/NL/TXT/HTML/?uri=CELEX:62019CJ0123";
    const NL_BODY: &str = r#"<html><body><div id="document1"><p>Arrest van het Hof</p><p>Het Hof verklaart voor recht</p></div></body></html>"#;

    fn celex() -> CelexNumber {
        CelexNumber::parse("62019CJ0123").unwrap()
    }

    fn resolver() -> ContentResolver {
        ContentResolver::new(ResolverConfig::default()).unwrap()
    }

    #[test]
    fn test_find_target_link_resolves_relative() {
        let page = Page::new(
            Url::parse(EN_URL).unwrap(),
            r#"<a href="./../../../legal-content/DE/TXT/?uri=CELEX:62019CJ0123">DE</a>
               <a href="./../../../legal-content/NL/TXT/?uri=CELEX:62019CJ0123">NL</a>"#,
        );
        let url = resolver().find_target_link(&page, &celex()).unwrap();
        assert_eq!(
            url.as_str(),
            "https://eur-lex.europa.eu/legal-content/NL/TXT/?uri=CELEX:62019CJ0123"
        );
    }

    #[test]
    fn test_find_target_link_protocol_relative_and_query_locale() {
        let page = Page::new(
            Url::parse(EN_URL).unwrap(),
            r#"<a href="//eur-lex.europa.eu/search.html?uri=CELEX%3A62019CJ0123&locale=nl">NL</a>"#,
        );
        let url = resolver().find_target_link(&page, &celex()).unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.host_str(), Some("eur-lex.europa.eu"));
    }

    #[test]
    fn test_find_target_link_ignores_other_documents() {
        let page = Page::new(
            Url::parse(EN_URL).unwrap(),
            r#"<a href="/legal-content/NL/TXT/?uri=CELEX:62018CJ0999">other case</a>"#,
        );
        assert!(resolver().find_target_link(&page, &celex()).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cross_link_followed() {
        let cross = "https://eur-lex.europa.eu/legal-content/NL/TXT/?uri=CELEX:62019CJ0123";
        let fetcher = CannedFetcher::default()
            .with(EN_URL, &format!(r#"<a href="{cross}">Nederlands</a>"#))
            .with(cross, NL_BODY);
        let mut throttle = Throttle::from_millis(1500);

        let doc = resolver().resolve(&fetcher, &mut throttle, &celex()).await.unwrap();
        assert!(doc.via_cross_link);
        assert_eq!(doc.url.as_str(), cross);
        assert_eq!(doc.content, "Arrest van het Hof\nHet Hof verklaart voor recht");
    }

    #[tokio::test(start_paused = true)]
    async fn test_falls_back_to_template_without_cross_link() {
        let fetcher = CannedFetcher::default()
            .with(EN_URL, "<html><body><a href=\"/help\">Help</a></body></html>")
            .with(NL_TEMPLATE_URL, NL_BODY);
        let mut throttle = Throttle::from_millis(0);

        let doc = resolver().resolve(&fetcher, &mut throttle, &celex()).await.unwrap();
        assert!(!doc.via_cross_link);
        assert_eq!(doc.url.as_str(), NL_TEMPLATE_URL);
        assert!(doc.content.contains("Het Hof verklaart voor recht"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_falls_back_when_reference_page_fails() {
        let fetcher = CannedFetcher::default().with(NL_TEMPLATE_URL, NL_BODY);
        let mut throttle = Throttle::from_millis(0);

        let doc = resolver().resolve(&fetcher, &mut throttle, &celex()).await.unwrap();
        assert_eq!(doc.url.as_str(), NL_TEMPLATE_URL);
        assert_eq!(fetcher.requested.lock().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_container_is_an_error() {
        let fetcher = CannedFetcher::default()
            .with(NL_TEMPLATE_URL, "<html><body><p>menu</p></body></html>");
        let mut throttle = Throttle::from_millis(0);

        let err = resolver().resolve(&fetcher, &mut throttle, &celex()).await.unwrap_err();
        assert!(matches!(err, ResolveError::Extract(ExtractError::NoContainer(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_target_fetch_failure_is_an_error() {
        let fetcher = CannedFetcher::default();
        let mut throttle = Throttle::from_millis(0);

        let err = resolver().resolve(&fetcher, &mut throttle, &celex()).await.unwrap_err();
        assert!(matches!(err, ResolveError::Fetch(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_politeness_between_reference_and_target() {
        let fetcher = CannedFetcher::default().with(NL_TEMPLATE_URL, NL_BODY);
        let mut throttle = Throttle::from_millis(1500);
        let start = tokio::time::Instant::now();

        resolver().resolve(&fetcher, &mut throttle, &celex()).await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_millis(1500));
    }
}
