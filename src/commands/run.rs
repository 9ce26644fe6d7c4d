use anyhow::{Context, Result};
use celex_harvest::{
    checkpoint::{CheckpointStore, FileCheckpointStore, MemoryCheckpointStore},
    config::Config,
    dataset::{DatasetSink, HubCredentials, HubTable, MemoryTable, RemoteTable},
    harvest::{HarvestError, HarvestOptions, HarvestReport, Harvester},
    scraping::{ContentResolver, HttpTransport, RetryingFetcher},
};
use std::path::PathBuf;
use tracing::{error, info};

/// Command-line overrides for a run
#[derive(Debug, Default)]
pub struct RunOverrides {
    pub max_docs: Option<usize>,
    pub batch_size: Option<usize>,
    pub checkpoint: Option<PathBuf>,
    pub dry_run: bool,
    pub quiet: bool,
}

impl RunOverrides {
    fn apply(&self, config: &mut Config) {
        if let Some(max) = self.max_docs {
            config.harvest.max_per_run = Some(max);
        }
        if let Some(size) = self.batch_size {
            config.harvest.batch_size = size;
        }
        if let Some(ref path) = self.checkpoint {
            config.checkpoint.path = path.clone();
        }
    }
}

pub async fn run_harvest(mut config: Config, overrides: RunOverrides) -> Result<()> {
    overrides.apply(&mut config);
    config.validate()?;

    let options = HarvestOptions::from_config(&config.harvest)?;
    let resolver = ContentResolver::new(config.resolver.clone()).context("Invalid resolver configuration")?;
    let fetcher = RetryingFetcher::from_config(&config.fetch).context("Failed to build HTTP client")?;
    let strategy = config.dataset.strategy;
    let file_store = FileCheckpointStore::new(&config.checkpoint.path);

    if overrides.dry_run {
        info!("Dry run: records go to an in-memory table and the checkpoint is not written");
        let checkpoint = MemoryCheckpointStore::with_set(file_store.load());
        let sink = DatasetSink::new(MemoryTable::new(), strategy);
        let harvester = Harvester::new(fetcher, checkpoint, sink, resolver, options).with_progress(!overrides.quiet);
        let report = execute(harvester).await?;
        println!(
            "\nDry run complete: {} records would have been published to {}",
            report.records_published, config.dataset.repo_id
        );
        return Ok(());
    }

    // The token is checked before any scraping starts
    let credentials = HubCredentials::from_env(&config.dataset.token_env)
        .context("An access token is required to publish (or use --dry-run)")?;
    let table = HubTable::new(&config.dataset, &config.fetch, credentials).context("Failed to build dataset client")?;
    let account = table.verify().await.context("Access token was rejected")?;
    info!(
        "Publishing to {} as {} ({:?} strategy)",
        table.repo_id(),
        account,
        strategy
    );

    let sink = DatasetSink::new(table, strategy);
    let harvester = Harvester::new(fetcher, file_store, sink, resolver, options).with_progress(!overrides.quiet);
    execute(harvester).await?;

    Ok(())
}

async fn execute<C, T>(mut harvester: Harvester<RetryingFetcher<HttpTransport>, C, T>) -> Result<HarvestReport>
where
    C: CheckpointStore,
    T: RemoteTable,
{
    match harvester.run().await {
        Ok(report) => {
            let stats = harvester.fetcher().stats();
            info!(
                "Fetched {} pages in {} attempts ({} failed, {:.0} ms average)",
                stats.total_fetches, stats.attempts, stats.failures, stats.avg_fetch_time_ms
            );
            report.print_summary();
            Ok(report)
        }
        Err(HarvestError::Publish { batch, source, report }) => {
            error!("Run aborted at stage {}: {}", harvester.stage(), source);
            report.print_summary();
            eprintln!(
                "\nBatch {} was not published. {} earlier batches are published and checkpointed; rerun to retry.",
                batch, report.batches_published
            );
            Err(HarvestError::Publish { batch, source, report }.into())
        }
        Err(e) => Err(e.into()),
    }
}
