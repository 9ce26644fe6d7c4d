//! Remote dataset and checkpoint configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How new records are merged into the remote table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishStrategy {
    /// Load the whole table, concatenate the batch and republish it
    ReplaceWithUnion,
    /// Publish only the batch as a new shard, never reading the table
    Append,
}

/// Remote dataset configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Dataset repository (`owner/name`)
    pub repo_id: String,
    /// Split the records are written to
    pub split: String,
    /// Create the dataset as private
    pub private: bool,
    /// Merge strategy
    pub strategy: PublishStrategy,
    /// Hub API endpoint
    pub endpoint: String,
    /// Branch or revision to commit to
    pub revision: String,
    /// Environment variables searched (in order) for the access token
    pub token_env: Vec<String>,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            repo_id: "vGassen/CJEU-Curia-Dutch-Court-Cases".to_string(),
            split: "train".to_string(),
            private: true,
            strategy: PublishStrategy::ReplaceWithUnion,
            endpoint: "https://huggingface.co".to_string(),
            revision: "main".to_string(),
            token_env: vec!["HF_TOKEN".to_string(), "HUGGING_FACE_HUB_TOKEN".to_string()],
        }
    }
}

/// Local checkpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    /// JSON array of already-ingested CELEX numbers
    pub path: PathBuf,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("processed_celex_numbers.json"),
        }
    }
}
