//! Checkpoint of already-ingested CELEX numbers
//!
//! The checkpoint is the local source of truth for incremental runs: a JSON
//! array of canonical CELEX strings, sorted, rewritten wholesale after every
//! published batch. A missing or unreadable file degrades to an empty set so
//! a damaged checkpoint never blocks a run.

use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::celex::CelexNumber;

/// Set of identifiers already ingested
pub type CheckpointSet = BTreeSet<CelexNumber>;

/// Errors raised when persisting the checkpoint
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Durable storage for the checkpoint set
pub trait CheckpointStore: Send + Sync {
    /// Load the stored set; absent or corrupt storage yields an empty set
    fn load(&self) -> CheckpointSet;

    /// Replace the stored set
    fn save(&self, set: &CheckpointSet) -> Result<(), CheckpointError>;
}

impl<S: CheckpointStore + ?Sized> CheckpointStore for Arc<S> {
    fn load(&self) -> CheckpointSet {
        (**self).load()
    }

    fn save(&self, set: &CheckpointSet) -> Result<(), CheckpointError> {
        (**self).save(set)
    }
}

/// JSON-file checkpoint written via temp file + rename
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    path: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> CheckpointError {
        CheckpointError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn load(&self) -> CheckpointSet {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "No checkpoint found, starting fresh");
                return CheckpointSet::new();
            }
            Err(e) => {
                warn!(path = %self.path.display(), "Checkpoint unreadable, starting fresh: {}", e);
                return CheckpointSet::new();
            }
        };

        let entries: Vec<String> = match serde_json::from_str(&contents) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %self.path.display(), "Checkpoint corrupt, starting fresh: {}", e);
                return CheckpointSet::new();
            }
        };

        let total = entries.len();
        let set: CheckpointSet = entries
            .iter()
            .filter_map(|entry| CelexNumber::parse(entry).ok())
            .collect();
        if set.len() < total {
            warn!(
                path = %self.path.display(),
                "Ignored {} checkpoint entries that are not CELEX numbers or are duplicates",
                total - set.len()
            );
        }

        info!(path = %self.path.display(), "Loaded checkpoint with {} identifiers", set.len());
        set
    }

    fn save(&self, set: &CheckpointSet) -> Result<(), CheckpointError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        let entries: Vec<&str> = set.iter().map(CelexNumber::as_str).collect();
        let encoded = serde_json::to_string_pretty(&entries)?;

        let temp_path = self.path.with_extension("json.tmp");
        let mut file = File::create(&temp_path).map_err(|e| self.io_error(e))?;
        file.write_all(encoded.as_bytes()).map_err(|e| self.io_error(e))?;
        file.sync_all().map_err(|e| self.io_error(e))?;
        fs::rename(&temp_path, &self.path).map_err(|e| self.io_error(e))?;

        debug!(path = %self.path.display(), count = set.len(), "checkpoint saved");
        Ok(())
    }
}

/// In-memory checkpoint for dry runs and tests
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    set: Mutex<CheckpointSet>,
    saves: Mutex<usize>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing set
    pub fn with_set(set: CheckpointSet) -> Self {
        Self {
            set: Mutex::new(set),
            saves: Mutex::new(0),
        }
    }

    /// Current contents
    pub fn snapshot(&self) -> CheckpointSet {
        self.set.lock().clone()
    }

    /// Number of successful saves
    pub fn save_count(&self) -> usize {
        *self.saves.lock()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn load(&self) -> CheckpointSet {
        self.set.lock().clone()
    }

    fn save(&self, set: &CheckpointSet) -> Result<(), CheckpointError> {
        *self.set.lock() = set.clone();
        *self.saves.lock() += 1;
        Ok(())
    }
}
