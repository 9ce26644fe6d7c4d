//! In-memory remote table for dry runs and tests

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{DatasetError, RemoteTable, TableState};
use crate::types::Record;

#[derive(Debug)]
struct Inner {
    state: TableState,
    loads: usize,
    writes: usize,
    /// Writes numbered at or above this (1-based) are rejected
    fail_from: Option<(usize, String)>,
}

/// A `RemoteTable` held in process memory
#[derive(Debug)]
pub struct MemoryTable {
    inner: Mutex<Inner>,
}

impl MemoryTable {
    /// A table that does not exist yet
    pub fn new() -> Self {
        Self::from_state(TableState::Missing)
    }

    /// An existing table with these rows
    pub fn with_records(records: Vec<Record>) -> Self {
        Self::from_state(TableState::Present(records))
    }

    fn from_state(state: TableState) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state,
                loads: 0,
                writes: 0,
                fail_from: None,
            }),
        }
    }

    /// Reject the next write and every one after it
    pub fn fail_next_write(&self, reason: impl Into<String>) {
        let mut inner = self.inner.lock();
        inner.fail_from = Some((inner.writes + 1, reason.into()));
    }

    /// Reject write number `n` (1-based) and every one after it
    pub fn fail_from_write(&self, n: usize, reason: impl Into<String>) {
        self.inner.lock().fail_from = Some((n, reason.into()));
    }

    pub fn state(&self) -> TableState {
        self.inner.lock().state.clone()
    }

    /// Current rows (empty when missing)
    pub fn rows(&self) -> Vec<Record> {
        self.inner.lock().state.records().to_vec()
    }

    pub fn load_count(&self) -> usize {
        self.inner.lock().loads
    }

    /// Successful writes so far
    pub fn write_count(&self) -> usize {
        self.inner.lock().writes
    }

    fn check_write(inner: &Inner) -> Result<(), DatasetError> {
        match &inner.fail_from {
            Some((n, reason)) if inner.writes + 1 >= *n => Err(DatasetError::Rejected(reason.clone())),
            _ => Ok(()),
        }
    }
}

impl Default for MemoryTable {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteTable for MemoryTable {
    async fn load(&self) -> Result<TableState, DatasetError> {
        let mut inner = self.inner.lock();
        inner.loads += 1;
        Ok(inner.state.clone())
    }

    async fn replace(&self, records: &[Record]) -> Result<(), DatasetError> {
        let mut inner = self.inner.lock();
        Self::check_write(&inner)?;
        inner.state = TableState::Present(records.to_vec());
        inner.writes += 1;
        Ok(())
    }

    async fn append(&self, records: &[Record], _batch: usize) -> Result<(), DatasetError> {
        let mut inner = self.inner.lock();
        Self::check_write(&inner)?;
        let mut rows = std::mem::replace(&mut inner.state, TableState::Missing).into_records();
        rows.extend_from_slice(records);
        inner.state = TableState::Present(rows);
        inner.writes += 1;
        Ok(())
    }
}
