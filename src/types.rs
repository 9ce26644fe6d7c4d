//! Core record type published to the remote dataset

use serde::{Deserialize, Serialize};

use crate::celex::CelexNumber;

/// Column holding the canonical document locator (unique key)
pub const URL_COLUMN: &str = "URL";
/// Column holding the extracted plain text
pub const CONTENT_COLUMN: &str = "Content";
/// Column holding the provenance label
pub const SOURCE_COLUMN: &str = "Source";

/// One row of the remote table
///
/// The field names are fixed by the published schema; `url` is the unique key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Canonical document locator
    #[serde(rename = "URL")]
    pub url: String,
    /// Extracted plain-text body
    #[serde(rename = "Content")]
    pub content: String,
    /// Provenance label, constant per run
    #[serde(rename = "Source")]
    pub source: String,
}

impl Record {
    /// Create a new record
    pub fn new(url: impl Into<String>, content: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            content: content.into(),
            source: source.into(),
        }
    }

    /// Recover the CELEX number embedded in the record URL, if any
    pub fn celex(&self) -> Option<CelexNumber> {
        let decoded = urlencoding::decode(&self.url)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| self.url.clone());
        CelexNumber::find_all(&decoded).into_iter().next()
    }
}
