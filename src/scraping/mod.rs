//! Retrieval side of the harvester
//!
//! Key components:
//! - `ListingScanner`: CELEX discovery on listing pages
//! - `ContentResolver`: CELEX → target-language URL and text
//! - `ContentExtractor`: main-container text extraction
//! - `RetryingFetcher`: bounded retries with constant backoff
//! - `Throttle`: politeness delay between requests

pub mod extractor;
pub mod fetcher;
pub mod listing;
pub mod politeness;
pub mod resolver;

pub use extractor::{ContentExtractor, ExtractError};
pub use fetcher::{FetchError, FetchStats, HttpTransport, Page, PageFetcher, RetryPolicy, RetryingFetcher, Transport};
pub use listing::ListingScanner;
pub use politeness::Throttle;
pub use resolver::{ContentResolver, ResolveError, ResolvedDocument};
