//! Main-text extraction from document pages
//!
//! The page's main container is located by trying the configured selectors
//! in priority order (first selector with a match wins). Text comes only from
//! paragraph-level nodes, optionally limited to a section delimited by two
//! marker headings. When nothing matches, the configured `ExtractionPolicy`
//! decides between failing and reading the whole `<body>`.

mod text;
mod types;

pub use types::ExtractError;

use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::config::{ExtractionPolicy, ResolverConfig, SectionBounds};

/// Content extractor with pre-compiled selectors
#[derive(Debug, Clone)]
pub struct ContentExtractor {
    /// Main-content selectors in priority order (source text kept for logs)
    container_selectors: Vec<(String, Selector)>,
    body_selector: Selector,
    paragraph_selector: Selector,
    /// Blocks considered when scanning for section markers
    block_selector: Selector,
    policy: ExtractionPolicy,
    section: Option<SectionBounds>,
}

fn compile(selector: &str) -> Result<Selector, ExtractError> {
    Selector::parse(selector).map_err(|_| ExtractError::InvalidSelector(selector.to_string()))
}

impl ContentExtractor {
    /// Create an extractor from the resolver configuration
    pub fn new(config: &ResolverConfig) -> Result<Self, ExtractError> {
        let container_selectors = config
            .container_selectors
            .iter()
            .map(|s| compile(s).map(|sel| (s.clone(), sel)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            container_selectors,
            body_selector: compile("body")?,
            paragraph_selector: compile("p")?,
            block_selector: compile("h1, h2, h3, h4, h5, h6, p")?,
            policy: config.extraction,
            section: config.section.clone(),
        })
    }

    pub fn policy(&self) -> ExtractionPolicy {
        self.policy
    }

    /// Extract the newline-joined paragraph text of a document page
    pub fn extract(&self, html: &str) -> Result<String, ExtractError> {
        let document = Html::parse_document(html);
        let container = self.find_container(&document)?;

        let paragraphs = match &self.section {
            Some(bounds) => self.bounded_paragraphs(container, bounds)?,
            None => self.paragraphs(container),
        };

        if paragraphs.is_empty() {
            return Err(ExtractError::Empty);
        }

        Ok(paragraphs.join("\n"))
    }

    fn find_container<'a>(&self, document: &'a Html) -> Result<ElementRef<'a>, ExtractError> {
        for (source, selector) in &self.container_selectors {
            if let Some(element) = document.select(selector).next() {
                debug!(selector = %source, "content container matched");
                return Ok(element);
            }
        }

        if self.policy == ExtractionPolicy::BodyFallback {
            if let Some(body) = document.select(&self.body_selector).next() {
                debug!("no container matched, falling back to <body>");
                return Ok(body);
            }
        }

        Err(ExtractError::NoContainer(
            self.container_selectors.iter().map(|(s, _)| s.clone()).collect(),
        ))
    }
}
