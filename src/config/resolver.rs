//! Document resolution and text extraction configuration

use serde::{Deserialize, Serialize};

/// What to do when none of the container selectors match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionPolicy {
    /// Fail the document; never risk including navigation chrome
    Strict,
    /// Fall back to the paragraphs of the whole `<body>`
    BodyFallback,
}

/// Heading labels delimiting the part of the document to keep
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionBounds {
    /// Text of the heading that opens the section (case-insensitive)
    pub start: String,
    /// Text of the heading that closes the section (case-insensitive)
    pub end: String,
}

/// Content resolver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Reference-language document page, `{celex}` is substituted
    pub reference_url_template: String,
    /// Target-language page used when the reference page has no cross-link
    pub target_url_template: String,
    /// Language code of the wanted edition (e.g. `NL`)
    pub target_language: String,
    /// Main-content selectors, tried in order
    pub container_selectors: Vec<String>,
    /// Behaviour when no container matches
    pub extraction: ExtractionPolicy,
    /// Optional sub-section restriction
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<SectionBounds>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            reference_url_template: "https://eur-lex.europa.eu/legal-content/EN/TXT/?uri=CELEX:{celex}"
                .to_string(),
            target_url_template:
                "https://eur-lex.europa.eu/legal-content/NL/TXT/HTML/?uri=CELEX:{celex}".to_string(),
            target_language: "NL".to_string(),
            container_selectors: vec![
                "#document1".to_string(),
                "div.tab-content".to_string(),
                "#Texte-integral".to_string(),
            ],
            extraction: ExtractionPolicy::Strict,
            section: None,
        }
    }
}
