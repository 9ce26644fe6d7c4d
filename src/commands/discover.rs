use anyhow::{Context, Result};
use celex_harvest::{
    checkpoint::{CheckpointSet, CheckpointStore, FileCheckpointStore},
    config::Config,
    harvest::{discover, pending, HarvestOptions},
    scraping::{ListingScanner, RetryingFetcher, Throttle},
};
use tracing::info;

/// Print identifiers a run would process, without fetching any content
pub async fn list_pending(config: Config, ignore_checkpoint: bool) -> Result<()> {
    let options = HarvestOptions::from_config(&config.harvest)?;
    let fetcher = RetryingFetcher::from_config(&config.fetch).context("Failed to build HTTP client")?;
    let scanner = ListingScanner::new(options.sectors.clone());
    let mut throttle = Throttle::new(options.request_delay);

    let ingested = if ignore_checkpoint {
        CheckpointSet::new()
    } else {
        FileCheckpointStore::new(&config.checkpoint.path).load()
    };
    let first_run = ingested.is_empty();
    let urls = options.listing_urls(first_run);
    info!("Scanning {} listing pages (first run: {})", urls.len(), first_run);

    let discovered = discover(&fetcher, &scanner, &urls, &mut throttle).await;
    let (queue, deferred) = pending(&discovered, &ingested, options.max_per_run);

    for celex in &queue {
        println!("{}", celex);
    }

    eprintln!(
        "\n{} discovered, {} already ingested, {} pending{}",
        discovered.len(),
        discovered.len() - (queue.len() + deferred),
        queue.len(),
        if deferred > 0 {
            format!(" ({} more beyond the per-run cap)", deferred)
        } else {
            String::new()
        }
    );

    Ok(())
}
