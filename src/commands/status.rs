use anyhow::Result;
use celex_harvest::{
    checkpoint::{CheckpointStore, FileCheckpointStore},
    config::Config,
};
use std::collections::BTreeMap;

pub async fn show_status(config: Config) -> Result<()> {
    let path = &config.checkpoint.path;
    let store = FileCheckpointStore::new(path);

    println!("\nCheckpoint Status");
    println!("=================");
    println!("Path:        {}", path.display());

    if !path.exists() {
        println!("No checkpoint yet. The next run is a first run and will also scan static listing pages.");
        return Ok(());
    }

    let set = store.load();
    println!("Identifiers: {}", set.len());
    if let (Some(first), Some(last)) = (set.first(), set.last()) {
        println!("First:       {}", first);
        println!("Last:        {}", last);
    }

    let mut by_type: BTreeMap<&str, usize> = BTreeMap::new();
    for celex in &set {
        *by_type.entry(celex.doc_type()).or_default() += 1;
    }
    if !by_type.is_empty() {
        println!("\nBy document type:");
        for (doc_type, count) in by_type {
            println!("  {:<4} {}", doc_type, count);
        }
    }

    println!("\nDataset:     {} (split {})", config.dataset.repo_id, config.dataset.split);

    Ok(())
}
