//! Configuration for the CELEX harvester

mod dataset;
mod fetch;
mod harvest;
mod logging;
mod resolver;

pub use dataset::{CheckpointConfig, DatasetConfig, PublishStrategy};
pub use fetch::FetchConfig;
pub use harvest::HarvestConfig;
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use resolver::{ExtractionPolicy, ResolverConfig, SectionBounds};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "celex-harvest.toml";

/// Default user agent for every HTTP request
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (compatible; celex-harvest/0.1)";

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Listing discovery and batching
    #[serde(default)]
    pub harvest: HarvestConfig,
    /// HTTP fetching and retry policy
    #[serde(default)]
    pub fetch: FetchConfig,
    /// Document resolution and text extraction
    #[serde(default)]
    pub resolver: ResolverConfig,
    /// Remote dataset
    #[serde(default)]
    pub dataset: DatasetConfig,
    /// Local checkpoint file
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
    /// Logging
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file and validate it.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file '{}': {}", path.display(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Load the file if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }

    /// Render this configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validate all configuration fields.
    ///
    /// Collects every problem and reports them together.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        // Harvest
        if self.harvest.batch_size == 0 {
            errors.push("harvest.batch_size must be positive".to_string());
        }
        if self.harvest.max_per_run == Some(0) {
            errors.push("harvest.max_per_run must be positive when set".to_string());
        }
        if self.harvest.source_label.trim().is_empty() {
            errors.push("harvest.source_label must not be empty".to_string());
        }
        if self.harvest.static_listing_urls.is_empty() && self.harvest.dynamic_listing_urls.is_empty() {
            errors.push("at least one listing URL must be configured".to_string());
        }
        for url in self
            .harvest
            .static_listing_urls
            .iter()
            .chain(&self.harvest.dynamic_listing_urls)
        {
            if url::Url::parse(url).is_err() {
                errors.push(format!("listing URL '{}' is not a valid absolute URL", url));
            }
        }
        if self.harvest.celex_sectors.is_empty() {
            errors.push("harvest.celex_sectors must list at least one sector digit".to_string());
        }
        for sector in &self.harvest.celex_sectors {
            if sector.len() != 1 || !sector.chars().all(|c| c.is_ascii_digit()) {
                errors.push(format!("CELEX sector '{}' must be a single digit", sector));
            }
        }

        // Fetch
        if self.fetch.retry_attempts == 0 {
            errors.push("fetch.retry_attempts must be at least 1".to_string());
        }
        if self.fetch.timeout_secs == 0 {
            errors.push("fetch.timeout_secs must be positive".to_string());
        }

        // Resolver
        for (name, template) in [
            ("resolver.reference_url_template", &self.resolver.reference_url_template),
            ("resolver.target_url_template", &self.resolver.target_url_template),
        ] {
            if !template.contains("{celex}") {
                errors.push(format!("{} must contain the {{celex}} placeholder", name));
            }
        }
        if self.resolver.target_language.trim().is_empty() {
            errors.push("resolver.target_language must not be empty".to_string());
        }
        if self.resolver.container_selectors.is_empty() {
            errors.push("resolver.container_selectors must not be empty".to_string());
        }
        for selector in &self.resolver.container_selectors {
            if scraper::Selector::parse(selector).is_err() {
                errors.push(format!("invalid container selector '{}'", selector));
            }
        }
        if let Some(section) = &self.resolver.section {
            if section.start.trim().is_empty() || section.end.trim().is_empty() {
                errors.push("resolver.section start and end markers must not be empty".to_string());
            }
        }

        // Dataset
        if !self.dataset.repo_id.contains('/') {
            errors.push(format!(
                "dataset.repo_id '{}' must have the form <owner>/<name>",
                self.dataset.repo_id
            ));
        }
        if self.dataset.split.trim().is_empty() {
            errors.push("dataset.split must not be empty".to_string());
        }
        if self.dataset.token_env.is_empty() {
            errors.push("dataset.token_env must name at least one environment variable".to_string());
        }
        if url::Url::parse(&self.dataset.endpoint).is_err() {
            errors.push(format!("dataset.endpoint '{}' is not a valid URL", self.dataset.endpoint));
        }

        // Checkpoint
        if self.checkpoint.path.as_os_str().is_empty() {
            errors.push("checkpoint.path must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            anyhow::bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            );
        }
    }
}
