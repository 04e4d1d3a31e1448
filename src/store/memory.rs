//! In-memory [`RepositoryStore`] for tests and dry runs.
//!
//! Records live in a `Vec` behind `std::sync::RwLock`, preserving
//! first-insertion order the same way the SQLite store does.

use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::RepositoryRecord;
use crate::rollup::{Level, RollupRow, Rollups};

use super::{RepositoryStore, RunRecord};

#[derive(Default)]
pub struct InMemoryStore {
    records: RwLock<Vec<RepositoryRecord>>,
    rollups: RwLock<Rollups>,
    runs: RwLock<Vec<RunRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-filled with `records`.
    pub fn with_records(records: Vec<RepositoryRecord>) -> Self {
        Self {
            records: RwLock::new(records),
            ..Self::default()
        }
    }
}

#[async_trait]
impl RepositoryStore for InMemoryStore {
    async fn load(&self) -> Result<Vec<RepositoryRecord>> {
        Ok(self.records.read().unwrap().clone())
    }

    async fn save(&self, records: &[RepositoryRecord]) -> Result<u64> {
        let mut stored = self.records.write().unwrap();
        for record in records {
            match stored
                .iter_mut()
                .find(|r| r.repository_id == record.repository_id)
            {
                Some(existing) => *existing = record.clone(),
                None => stored.push(record.clone()),
            }
        }
        Ok(records.len() as u64)
    }

    async fn save_rollups(&self, rollups: &Rollups) -> Result<()> {
        *self.rollups.write().unwrap() = rollups.clone();
        Ok(())
    }

    async fn load_rollup(&self, level: Level) -> Result<Vec<RollupRow>> {
        Ok(self.rollups.read().unwrap().level(level).to_vec())
    }

    async fn record_run(&self, run: &RunRecord) -> Result<()> {
        self.runs.write().unwrap().push(run.clone());
        Ok(())
    }

    async fn recent_runs(&self, limit: usize) -> Result<Vec<RunRecord>> {
        Ok(self
            .runs
            .read()
            .unwrap()
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }
}
