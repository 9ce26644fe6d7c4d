//! CELEX identifiers for case-law documents
//!
//! A CELEX number for a court decision has a fixed shape:
//! `<sector digit><4-digit year><2-letter document type><4-digit sequence>`,
//! e.g. `62019CJ0123` (sector 6 = case law, 2019, CJ = Court of Justice
//! judgment, case 123). Every document has exactly one canonical form, which
//! is what this type stores.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use thiserror::Error;

/// Structural pattern of a canonical CELEX number (unanchored)
pub const CELEX_PATTERN: &str = r"[0-9][0-9]{4}[A-Z]{2}[0-9]{4}";

/// Length of every canonical CELEX number
pub const CELEX_LEN: usize = 11;

static CELEX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(CELEX_PATTERN).expect("CELEX pattern is a valid regex")
});

/// Errors produced when parsing a CELEX number
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CelexError {
    #[error("CELEX number must be {CELEX_LEN} characters, got {0}")]
    Length(usize),
    #[error("'{0}' does not match the CELEX structure")]
    Structure(String),
}

/// Canonical CELEX identifier of a single court document
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CelexNumber(String);

impl CelexNumber {
    /// Parse a canonical CELEX number. Surrounding whitespace is ignored and
    /// the document-type letters are upper-cased; anything else must already
    /// be in canonical form.
    pub fn parse(raw: &str) -> Result<Self, CelexError> {
        let candidate = raw.trim().to_ascii_uppercase();
        if candidate.len() != CELEX_LEN {
            return Err(CelexError::Length(candidate.len()));
        }
        match CELEX_RE.find(&candidate) {
            Some(m) if m.start() == 0 && m.end() == CELEX_LEN => Ok(Self(candidate)),
            _ => Err(CelexError::Structure(raw.to_string())),
        }
    }

    /// Find every standalone CELEX number inside arbitrary text.
    ///
    /// A match only counts when it is not glued to further letters or digits
    /// on either side, so `62019CJ01234` yields nothing rather than a
    /// truncated `62019CJ0123`.
    pub fn find_all(text: &str) -> Vec<CelexNumber> {
        let bytes = text.as_bytes();
        CELEX_RE
            .find_iter(text)
            .filter(|m| {
                let before_ok = m.start() == 0 || !bytes[m.start() - 1].is_ascii_alphanumeric();
                let after_ok = m.end() == bytes.len() || !bytes[m.end()].is_ascii_alphanumeric();
                before_ok && after_ok
            })
            .map(|m| CelexNumber(m.as_str().to_string()))
            .collect()
    }

    /// The canonical string form
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Sector (era) digit, `6` for case law
    pub fn sector(&self) -> char {
        // Canonical form is ASCII and exactly CELEX_LEN long
        self.0.as_bytes()[0] as char
    }

    /// Four-digit year of the case
    pub fn year(&self) -> u16 {
        self.0[1..5].parse().unwrap_or_default()
    }

    /// Two-letter document type code (`CJ`, `TJ`, `CC`, `CO`, ...)
    pub fn doc_type(&self) -> &str {
        &self.0[5..7]
    }

    /// Four-digit sequence number
    pub fn sequence(&self) -> u16 {
        self.0[7..].parse().unwrap_or_default()
    }

    /// Substitute this identifier into a `{celex}` URL template
    pub fn fill_template(&self, template: &str) -> String {
        template.replace("{celex}", &self.0)
    }
}

impl fmt::Display for CelexNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CelexNumber {
    type Err = CelexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CelexNumber {
    type Error = CelexError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CelexNumber> for String {
    fn from(value: CelexNumber) -> Self {
        value.0
    }
}

impl AsRef<str> for CelexNumber {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_canonical() {
        let celex = CelexNumber::parse("62019CJ0123").unwrap();
        assert_eq!(celex.as_str(), "62019CJ0123");
        assert_eq!(celex.sector(), '6');
        assert_eq!(celex.year(), 2019);
        assert_eq!(celex.doc_type(), "CJ");
        assert_eq!(celex.sequence(), 123);
    }

    #[test]
    fn test_parse_normalizes_case_and_whitespace() {
        let celex = CelexNumber::parse("  62021tj0042\n").unwrap();
        assert_eq!(celex.as_str(), "62021TJ0042");
    }

    #[test]
    fn test_parse_rejects_wrong_shapes() {
        assert_eq!(CelexNumber::parse("62019C0123"), Err(CelexError::Length(10)));
        assert!(matches!(
            CelexNumber::parse("6201XCJ0123"),
            Err(CelexError::Structure(_))
        ));
        assert!(matches!(
            CelexNumber::parse("62019CJ012A"),
            Err(CelexError::Structure(_))
        ));
    }

    #[test]
    fn test_find_all_skips_glued_matches() {
        let found = CelexNumber::find_all("CELEX:62019CJ0123 and 62019CJ01234 and X62020TJ0001");
        assert_eq!(found, vec![CelexNumber::parse("62019CJ0123").unwrap()]);
    }

    #[test]
    fn test_find_all_accepts_punctuation_boundaries() {
        let found = CelexNumber::find_all("uri=CELEX:62018CC0311&from=EN;(62020CO0007)");
        let ids: Vec<&str> = found.iter().map(|c| c.as_str()).collect();
        assert_eq!(ids, vec!["62018CC0311", "62020CO0007"]);
    }

    #[test]
    fn test_fill_template() {
        let celex = CelexNumber::parse("62019CJ0123").unwrap();
        assert_eq!(
            celex.fill_template("https://eur-lex.europa.eu/legal-content/NL/TXT/HTML/?uri=CELEX:{celex}"),
            "https://eur-lex.europa.eu/legal-content/NL/TXT/HTML/?uri=CELEX:62019CJ0123"
        );
    }

    #[test]
    fn test_serde_round_trip_validates() {
        let json = serde_json::to_string(&CelexNumber::parse("62019CJ0123").unwrap()).unwrap();
        assert_eq!(json, "\"62019CJ0123\"");
        let bad: Result<CelexNumber, _> = serde_json::from_str("\"not-a-celex\"");
        assert!(bad.is_err());
    }
}
