//! celex-harvest: incremental harvester for EU court-case texts
//!
//! Discovers CELEX identifiers on curia listing pages, resolves each one to
//! its target-language EUR-Lex edition, extracts the judgment text and
//! publishes new records batch by batch to a remote dataset. A local
//! checkpoint makes repeated runs incremental.
//!
//! - `celex`: canonical identifiers
//! - `scraping`: listing scan, fetch with retries, resolution and extraction
//! - `checkpoint`: durable set of ingested identifiers
//! - `dataset`: remote table and merge strategies
//! - `harvest`: the run state machine

pub mod celex;
pub mod checkpoint;
pub mod config;
pub mod dataset;
pub mod harvest;
pub mod scraping;
pub mod types;
pub mod util;

pub use celex::CelexNumber;
pub use config::Config;
pub use types::*;
