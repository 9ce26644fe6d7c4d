//! End-to-end harvest runs against in-memory pages, checkpoint and table

use async_trait::async_trait;
use celex_harvest::{
    celex::CelexNumber,
    checkpoint::{CheckpointError, CheckpointSet, CheckpointStore, FileCheckpointStore, MemoryCheckpointStore},
    config::{PublishStrategy, ResolverConfig},
    dataset::{DatasetError, DatasetSink, MemoryTable, RemoteTable, TableState},
    harvest::{HarvestError, HarvestOptions, HarvestStage, Harvester},
    scraping::{ContentResolver, FetchError, Page, PageFetcher},
    types::Record,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

const STATIC_LISTING: &str = "https://curia.test/static.htm";
const DYNAMIC_LISTING: &str = "https://curia.test/dynamic.htm";
const SOURCE: &str = "Court of Justice of the European Union";

/// Canned web: exact URL → body, anything else is a 404
#[derive(Default)]
struct FakeWeb {
    pages: Mutex<HashMap<String, String>>,
    requests: Mutex<Vec<String>>,
}

impl FakeWeb {
    fn serve(&self, url: &str, body: String) {
        self.pages.lock().insert(url.to_string(), body);
    }

    fn requested(&self, url: &str) -> usize {
        self.requests.lock().iter().filter(|u| u.as_str() == url).count()
    }

    fn document_requests(&self) -> usize {
        self.requests.lock().iter().filter(|u| u.contains("eur-lex")).count()
    }

    fn clear_requests(&self) {
        self.requests.lock().clear();
    }
}

#[async_trait]
impl PageFetcher for FakeWeb {
    async fn fetch_with_timeout(&self, url: &Url, _timeout: Option<Duration>) -> Result<Page, FetchError> {
        self.requests.lock().push(url.to_string());
        match self.pages.lock().get(url.as_str()) {
            Some(body) => Ok(Page::new(url.clone(), body.clone())),
            None => Err(FetchError::Status {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}

/// Table that remembers how many rows each write carried
#[derive(Default)]
struct RecordingTable {
    appends: Mutex<Vec<usize>>,
}

#[async_trait]
impl RemoteTable for RecordingTable {
    async fn load(&self) -> Result<TableState, DatasetError> {
        Ok(TableState::Missing)
    }

    async fn replace(&self, _records: &[Record]) -> Result<(), DatasetError> {
        Err(DatasetError::Rejected("append only".to_string()))
    }

    async fn append(&self, records: &[Record], _batch: usize) -> Result<(), DatasetError> {
        self.appends.lock().push(records.len());
        Ok(())
    }
}

/// Checkpoint whose saves always fail
#[derive(Default)]
struct ReadOnlyCheckpoint;

impl CheckpointStore for ReadOnlyCheckpoint {
    fn load(&self) -> CheckpointSet {
        CheckpointSet::new()
    }

    fn save(&self, _set: &CheckpointSet) -> Result<(), CheckpointError> {
        Err(CheckpointError::Io {
            path: "/read-only/processed.json".into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
        })
    }
}

fn case_id(n: usize) -> String {
    format!("62020CJ{:04}", n)
}

fn nl_url(id: &str) -> String {
    format!("https://eur-lex.europa.eu/legal-content/NL/TXT/HTML/?uri=CELEX:{id}")
}

fn listing(ids: &[String]) -> String {
    let links: String = ids
        .iter()
        .map(|id| format!(r#"<li><a href="https://eur-lex.europa.eu/legal-content/EN/TXT/?uri=CELEX:{id}">Case</a></li>"#))
        .collect();
    format!("<html><body><ul>{links}</ul></body></html>")
}

/// Serve a listing page plus a target-language document for every id
fn web_with(listing_url: &str, ids: &[String]) -> Arc<FakeWeb> {
    let web = Arc::new(FakeWeb::default());
    web.serve(listing_url, listing(ids));
    for id in ids {
        web.serve(
            &nl_url(id),
            format!(r#"<html><body><div id="document1"><p>Arrest in zaak {id}</p></div></body></html>"#),
        );
    }
    web
}

fn options(batch_size: usize) -> HarvestOptions {
    HarvestOptions {
        static_listing_urls: vec![Url::parse(STATIC_LISTING).unwrap()],
        dynamic_listing_urls: vec![Url::parse(DYNAMIC_LISTING).unwrap()],
        batch_size,
        max_per_run: None,
        request_delay: Duration::ZERO,
        source_label: SOURCE.to_string(),
        sectors: vec!['6'],
        seed_from_remote: false,
    }
}

fn resolver() -> ContentResolver {
    ContentResolver::new(ResolverConfig::default()).unwrap()
}

fn ids(n: usize) -> Vec<String> {
    (1..=n).map(case_id).collect()
}

fn checkpoint_ids(store: &MemoryCheckpointStore) -> Vec<String> {
    store.snapshot().iter().map(|c| c.as_str().to_string()).collect()
}

#[tokio::test]
async fn rerun_without_changes_processes_nothing() {
    let web = web_with(DYNAMIC_LISTING, &ids(3));
    let checkpoint = Arc::new(MemoryCheckpointStore::new());
    let table = Arc::new(MemoryTable::new());

    let mut first = Harvester::new(
        Arc::clone(&web),
        Arc::clone(&checkpoint),
        DatasetSink::new(Arc::clone(&table), PublishStrategy::ReplaceWithUnion),
        resolver(),
        options(10),
    );
    let report = first.run().await.unwrap();
    assert_eq!(report.records_published, 3);
    assert_eq!(table.rows().len(), 3);
    assert_eq!(checkpoint_ids(&checkpoint), ids(3));

    web.clear_requests();
    let writes_before = table.write_count();
    let mut second = Harvester::new(
        Arc::clone(&web),
        Arc::clone(&checkpoint),
        DatasetSink::new(Arc::clone(&table), PublishStrategy::ReplaceWithUnion),
        resolver(),
        options(10),
    );
    let report = second.run().await.unwrap();

    assert_eq!(report.pending, 0);
    assert!(!report.first_run);
    assert_eq!(second.stage(), HarvestStage::Done);
    assert_eq!(web.document_requests(), 0);
    assert_eq!(table.write_count(), writes_before);
    assert_eq!(checkpoint.save_count(), 1);
}

#[tokio::test]
async fn publish_failure_keeps_only_earlier_batches_in_checkpoint() {
    let web = web_with(DYNAMIC_LISTING, &ids(6));
    let checkpoint = Arc::new(MemoryCheckpointStore::new());
    let table = Arc::new(MemoryTable::new());
    table.fail_from_write(2, "commit rejected");

    let mut harvester = Harvester::new(
        Arc::clone(&web),
        Arc::clone(&checkpoint),
        DatasetSink::new(Arc::clone(&table), PublishStrategy::ReplaceWithUnion),
        resolver(),
        options(2),
    );
    let err = harvester.run().await.unwrap_err();

    match &err {
        HarvestError::Publish { batch, report, .. } => {
            assert_eq!(*batch, 2);
            assert_eq!(report.batches_published, 1);
            assert_eq!(report.records_published, 2);
            assert_eq!(report.checkpoint_size, 2);
        }
        other => panic!("expected a publish failure, got {other:?}"),
    }
    assert_eq!(harvester.stage(), HarvestStage::ProcessBatch { index: 2, total: 3 });
    assert_eq!(checkpoint_ids(&checkpoint), ids(2));
    assert_eq!(table.rows().len(), 2);

    // Batch 3 was never attempted
    assert_eq!(web.requested(&nl_url(&case_id(5))), 0);
}

#[tokio::test]
async fn rerun_after_publish_failure_retries_the_failed_batch() {
    let web = web_with(DYNAMIC_LISTING, &ids(4));
    let checkpoint = Arc::new(MemoryCheckpointStore::new());
    let table = Arc::new(MemoryTable::new());
    table.fail_from_write(2, "service unavailable");

    let mut failing = Harvester::new(
        Arc::clone(&web),
        Arc::clone(&checkpoint),
        DatasetSink::new(Arc::clone(&table), PublishStrategy::ReplaceWithUnion),
        resolver(),
        options(2),
    );
    assert!(failing.run().await.is_err());

    let healthy = Arc::new(MemoryTable::with_records(table.rows()));
    let mut retry = Harvester::new(
        Arc::clone(&web),
        Arc::clone(&checkpoint),
        DatasetSink::new(Arc::clone(&healthy), PublishStrategy::ReplaceWithUnion),
        resolver(),
        options(2),
    );
    let report = retry.run().await.unwrap();

    assert_eq!(report.pending, 2);
    assert_eq!(report.records_published, 2);
    assert_eq!(checkpoint_ids(&checkpoint), ids(4));
    assert_eq!(healthy.rows().len(), 4);
}

#[tokio::test]
async fn two_full_batches_publish_twice() {
    let web = web_with(DYNAMIC_LISTING, &ids(6));
    let table = Arc::new(RecordingTable::default());

    let mut harvester = Harvester::new(
        Arc::clone(&web),
        MemoryCheckpointStore::new(),
        DatasetSink::new(Arc::clone(&table), PublishStrategy::Append),
        resolver(),
        options(3),
    );
    let report = harvester.run().await.unwrap();

    assert_eq!(*table.appends.lock(), vec![3, 3]);
    assert_eq!(report.batches_published, 2);
    assert_eq!(harvester.checkpoint().snapshot().len(), 6);
}

#[tokio::test]
async fn static_listings_only_on_first_run() {
    let web = web_with(DYNAMIC_LISTING, &ids(2));
    web.serve(STATIC_LISTING, listing(&[case_id(9)]));
    web.serve(
        &nl_url(&case_id(9)),
        r#"<div id="document1"><p>Oud arrest</p></div>"#.to_string(),
    );
    let checkpoint = Arc::new(MemoryCheckpointStore::new());
    let table = Arc::new(MemoryTable::new());

    let mut first = Harvester::new(
        Arc::clone(&web),
        Arc::clone(&checkpoint),
        DatasetSink::new(Arc::clone(&table), PublishStrategy::ReplaceWithUnion),
        resolver(),
        options(10),
    );
    let report = first.run().await.unwrap();
    assert!(report.first_run);
    assert_eq!(report.listing_pages, 2);
    assert_eq!(web.requested(STATIC_LISTING), 1);
    assert_eq!(report.records_published, 3);

    web.clear_requests();
    let mut second = Harvester::new(
        Arc::clone(&web),
        Arc::clone(&checkpoint),
        DatasetSink::new(Arc::clone(&table), PublishStrategy::ReplaceWithUnion),
        resolver(),
        options(10),
    );
    let report = second.run().await.unwrap();
    assert!(!report.first_run);
    assert_eq!(report.listing_pages, 1);
    assert_eq!(web.requested(STATIC_LISTING), 0);
    assert_eq!(web.requested(DYNAMIC_LISTING), 1);
}

#[tokio::test]
async fn per_run_cap_defers_the_rest() {
    let web = web_with(DYNAMIC_LISTING, &ids(5));
    let checkpoint = Arc::new(MemoryCheckpointStore::new());
    let table = Arc::new(MemoryTable::new());
    let capped = HarvestOptions {
        max_per_run: Some(2),
        ..options(10)
    };

    let mut harvester = Harvester::new(
        Arc::clone(&web),
        Arc::clone(&checkpoint),
        DatasetSink::new(Arc::clone(&table), PublishStrategy::ReplaceWithUnion),
        resolver(),
        capped.clone(),
    );
    let report = harvester.run().await.unwrap();
    assert_eq!(report.pending, 2);
    assert_eq!(report.deferred, 3);
    assert_eq!(checkpoint_ids(&checkpoint), ids(2));

    let mut next = Harvester::new(
        Arc::clone(&web),
        Arc::clone(&checkpoint),
        DatasetSink::new(Arc::clone(&table), PublishStrategy::ReplaceWithUnion),
        resolver(),
        capped,
    );
    let report = next.run().await.unwrap();
    assert_eq!(report.pending, 2);
    assert_eq!(report.deferred, 1);
    assert_eq!(checkpoint_ids(&checkpoint), ids(4));
}

#[tokio::test]
async fn unresolvable_documents_are_skipped_and_retried_later() {
    let all = ids(3);
    let web = web_with(DYNAMIC_LISTING, &all);
    // Document 2 has no recognisable container
    web.serve(&nl_url(&case_id(2)), "<html><body><nav>menu</nav></body></html>".to_string());
    let checkpoint = Arc::new(MemoryCheckpointStore::new());
    let table = Arc::new(MemoryTable::new());

    let mut harvester = Harvester::new(
        Arc::clone(&web),
        Arc::clone(&checkpoint),
        DatasetSink::new(Arc::clone(&table), PublishStrategy::ReplaceWithUnion),
        resolver(),
        options(10),
    );
    let report = harvester.run().await.unwrap();

    assert_eq!(report.resolved, 2);
    assert_eq!(report.skipped, 1);
    assert_eq!(checkpoint_ids(&checkpoint), vec![case_id(1), case_id(3)]);

    let rows = table.rows();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.source == SOURCE && !r.content.is_empty()));
    assert_eq!(rows[0].url, nl_url(&case_id(1)));
    assert_eq!(rows[0].content, format!("Arrest in zaak {}", case_id(1)));
}

#[tokio::test]
async fn empty_discovery_has_no_side_effects() {
    let web = Arc::new(FakeWeb::default());
    let checkpoint = Arc::new(MemoryCheckpointStore::new());
    let table = Arc::new(MemoryTable::new());

    let mut harvester = Harvester::new(
        Arc::clone(&web),
        Arc::clone(&checkpoint),
        DatasetSink::new(Arc::clone(&table), PublishStrategy::ReplaceWithUnion),
        resolver(),
        options(10),
    );
    let report = harvester.run().await.unwrap();

    assert!(report.is_noop());
    assert_eq!(harvester.stage(), HarvestStage::Done);
    assert_eq!(checkpoint.save_count(), 0);
    assert_eq!(table.write_count(), 0);
    assert_eq!(table.load_count(), 0);
}

#[tokio::test]
async fn seeding_from_remote_skips_known_documents() {
    let web = web_with(DYNAMIC_LISTING, &ids(3));
    let table = Arc::new(MemoryTable::with_records(vec![Record::new(
        nl_url(&case_id(1)),
        "al gepubliceerd",
        SOURCE,
    )]));
    let seeded = HarvestOptions {
        seed_from_remote: true,
        ..options(10)
    };

    let mut harvester = Harvester::new(
        Arc::clone(&web),
        MemoryCheckpointStore::new(),
        DatasetSink::new(Arc::clone(&table), PublishStrategy::ReplaceWithUnion),
        resolver(),
        seeded,
    );
    let report = harvester.run().await.unwrap();

    assert_eq!(report.seeded_from_remote, 1);
    assert_eq!(report.pending, 2);
    assert_eq!(web.requested(&nl_url(&case_id(1))), 0);
    assert_eq!(table.rows().len(), 3);
}

#[tokio::test]
async fn seeded_identifiers_stay_ingested_on_later_runs() {
    let web = web_with(DYNAMIC_LISTING, &ids(3));
    let checkpoint = Arc::new(MemoryCheckpointStore::new());
    let table = Arc::new(MemoryTable::with_records(vec![Record::new(
        nl_url(&case_id(1)),
        "al gepubliceerd",
        SOURCE,
    )]));
    let seeded = HarvestOptions {
        seed_from_remote: true,
        ..options(10)
    };

    let mut first = Harvester::new(
        Arc::clone(&web),
        Arc::clone(&checkpoint),
        DatasetSink::new(Arc::clone(&table), PublishStrategy::Append),
        resolver(),
        seeded.clone(),
    );
    let report = first.run().await.unwrap();
    assert_eq!(report.seeded_from_remote, 1);
    assert_eq!(report.pending, 2);
    assert_eq!(checkpoint_ids(&checkpoint), ids(3));

    web.clear_requests();
    let mut second = Harvester::new(
        Arc::clone(&web),
        Arc::clone(&checkpoint),
        DatasetSink::new(Arc::clone(&table), PublishStrategy::Append),
        resolver(),
        seeded,
    );
    let report = second.run().await.unwrap();

    assert!(!report.first_run);
    assert_eq!(report.pending, 0);
    assert_eq!(web.document_requests(), 0);

    let urls: Vec<String> = table.rows().into_iter().map(|r| r.url).collect();
    assert_eq!(urls, vec![nl_url(&case_id(1)), nl_url(&case_id(2)), nl_url(&case_id(3))]);
}

#[tokio::test]
async fn checkpoint_save_failure_is_reported_not_fatal() {
    let web = web_with(DYNAMIC_LISTING, &ids(4));
    let table = Arc::new(MemoryTable::new());

    let mut harvester = Harvester::new(
        Arc::clone(&web),
        ReadOnlyCheckpoint,
        DatasetSink::new(Arc::clone(&table), PublishStrategy::ReplaceWithUnion),
        resolver(),
        options(2),
    );
    let report = harvester.run().await.unwrap();

    assert_eq!(report.batches_published, 2);
    assert_eq!(report.checkpoint_save_failures, 2);
    assert_eq!(table.rows().len(), 4);
}

#[tokio::test]
async fn file_checkpoint_survives_between_runs() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("processed_celex_numbers.json");
    let web = web_with(DYNAMIC_LISTING, &ids(2));
    let table = Arc::new(MemoryTable::new());

    let mut harvester = Harvester::new(
        Arc::clone(&web),
        FileCheckpointStore::new(&path),
        DatasetSink::new(Arc::clone(&table), PublishStrategy::ReplaceWithUnion),
        resolver(),
        options(10),
    );
    harvester.run().await.unwrap();

    let stored: Vec<String> = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(stored, ids(2));

    let reloaded = FileCheckpointStore::new(&path).load();
    assert!(reloaded.contains(&CelexNumber::parse(&case_id(1)).unwrap()));
}
