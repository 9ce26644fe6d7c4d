//! Listing discovery and batching configuration

use serde::{Deserialize, Serialize};

/// Harvest run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Listing pages scraped only on the first run (rarely change)
    pub static_listing_urls: Vec<String>,
    /// Listing pages scraped on every run
    pub dynamic_listing_urls: Vec<String>,
    /// Number of identifiers resolved and published per batch
    pub batch_size: usize,
    /// Cap on identifiers processed in one run (None = unlimited)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_per_run: Option<usize>,
    /// Politeness delay between consecutive requests (milliseconds)
    pub request_delay_ms: u64,
    /// Provenance label written to the `Source` column
    pub source_label: String,
    /// CELEX sector digits to keep (`6` = case law)
    pub celex_sectors: Vec<String>,
    /// On a first run, treat identifiers already present in the remote
    /// table as ingested
    pub seed_from_remote: bool,
}

impl HarvestConfig {
    /// Sector digits as chars, ignoring malformed entries
    pub fn sector_chars(&self) -> Vec<char> {
        self.celex_sectors
            .iter()
            .filter_map(|s| {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) if c.is_ascii_digit() => Some(c),
                    _ => None,
                }
            })
            .collect()
    }
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            static_listing_urls: vec![
                "https://curia.europa.eu/en/content/juris/c1_juris.htm".to_string(),
                "https://curia.europa.eu/en/content/juris/f1_juris.htm".to_string(),
            ],
            dynamic_listing_urls: vec![
                "https://curia.europa.eu/en/content/juris/t2_juris.htm".to_string(),
                "https://curia.europa.eu/en/content/juris/c2_juris.htm".to_string(),
            ],
            batch_size: 200,
            max_per_run: None,
            request_delay_ms: 1500,
            source_label: "Court of Justice of the European Union".to_string(),
            celex_sectors: vec!["6".to_string()],
            seed_from_remote: false,
        }
    }
}
