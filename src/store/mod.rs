//! Storage abstraction for the collected dataset and its rankings.
//!
//! The [`RepositoryStore`] trait is the only way commands reach persisted
//! state, so the pipeline runs unchanged against SQLite ([`SqliteStore`])
//! or an in-memory backend ([`InMemoryStore`]) in tests.
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`load`](RepositoryStore::load) | Every stored record, in first-insertion order |
//! | [`save`](RepositoryStore::save) | Upsert records by repository id (last write wins) |
//! | [`known_ids`](RepositoryStore::known_ids) | Ids used to seed deduplication |
//! | [`save_rollups`](RepositoryStore::save_rollups) | Replace the stored rankings |
//! | [`load_rollup`](RepositoryStore::load_rollup) | One level of the stored rankings |
//! | [`record_run`](RepositoryStore::record_run) | Append a run to the history |
//! | [`recent_runs`](RepositoryStore::recent_runs) | Newest runs first |

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::dedup::KnownIds;
use crate::models::RepositoryRecord;
use crate::rollup::{Level, RollupRow, Rollups};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Interrupted,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Completed => "completed",
            RunStatus::Interrupted => "interrupted",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "completed" => Ok(RunStatus::Completed),
            "interrupted" => Ok(RunStatus::Interrupted),
            other => bail!("Unknown run status: '{}'", other),
        }
    }
}

/// One `collect` or `score` invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunRecord {
    /// `"collect"` or `"score"`.
    pub kind: String,
    pub started_at: i64,
    pub finished_at: i64,
    pub status: RunStatus,
    /// Records collected or scored.
    pub records: i64,
    pub detail: Option<String>,
}

#[async_trait]
pub trait RepositoryStore: Send + Sync {
    /// Every stored record, in the order it was first saved.
    async fn load(&self) -> Result<Vec<RepositoryRecord>>;

    /// Insert or replace records keyed by `repository_id`.
    ///
    /// Returns the number of records written.
    async fn save(&self, records: &[RepositoryRecord]) -> Result<u64>;

    /// Ids of every stored record.
    async fn known_ids(&self) -> Result<KnownIds> {
        Ok(KnownIds::from_records(&self.load().await?))
    }

    /// Replace all stored rankings with `rollups`.
    async fn save_rollups(&self, rollups: &Rollups) -> Result<()>;

    /// Stored rows of one level, by rank.
    async fn load_rollup(&self, level: Level) -> Result<Vec<RollupRow>>;

    async fn record_run(&self, run: &RunRecord) -> Result<()>;

    /// Up to `limit` runs, newest first.
    async fn recent_runs(&self, limit: usize) -> Result<Vec<RunRecord>>;
}

/// Format a Unix timestamp as `2024-01-31T12:00:00Z`.
pub fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}
