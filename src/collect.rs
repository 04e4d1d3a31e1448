//! Taxonomy-driven collection.
//!
//! Walks every category of the taxonomy and every query of each category,
//! in the order given, and turns the search results into one deduplicated,
//! category-tagged dataset.
//!
//! # Flow
//!
//! ```text
//! for category, for query:
//!     search(query + scope modifiers)      ── lazy, at most N candidates
//!       → skip ids already known
//!       → normalize repository / owner / organization
//!       → tag with (category, query)
//!     fold batch ids into the known set     ── before the next query
//! ```
//!
//! The first query that finds an id gets credit for it. Any failure from
//! the search collaborator stops the run: the records of every completed
//! query are returned and the outcome is marked interrupted. The failing
//! query's own partial batch is discarded.

use anyhow::{bail, Result};
use chrono::Utc;

use crate::config::{CollectionConfig, Config};
use crate::dedup::KnownIds;
use crate::error::{NormalizeError, SearchError};
use crate::github::GitHubClient;
use crate::models::{EntityKind, RawEntity, RepositoryRecord, TaxonomyCategory};
use crate::normalize::{
    decode_organization, decode_owner, decode_repository, normalize, normalize_organization,
};
use crate::progress::{CollectProgressEvent, CollectProgressReporter, ProgressMode};
use crate::store::{RepositoryStore, RunRecord, RunStatus, SqliteStore};
use crate::traits::SearchClient;

/// Per-query counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryStats {
    pub category: String,
    pub query: String,
    pub examined: u64,
    pub accepted: u64,
    pub skipped_known: u64,
    pub dropped: u64,
    /// The search API flagged the results as partial.
    pub incomplete: bool,
}

impl QueryStats {
    fn new(category: &str, query: &str) -> Self {
        Self {
            category: category.to_string(),
            query: query.to_string(),
            examined: 0,
            accepted: 0,
            skipped_known: 0,
            dropped: 0,
            incomplete: false,
        }
    }
}

#[derive(Debug)]
pub enum CollectionStatus {
    /// Every planned query ran.
    Completed,
    /// The search collaborator failed on `query`; later queries never ran.
    Interrupted {
        category: String,
        query: String,
        error: SearchError,
    },
}

/// Result of a collection run: always carries the records gathered.
#[derive(Debug)]
pub struct CollectionOutcome {
    /// New records in discovery order.
    pub records: Vec<RepositoryRecord>,
    /// Stats of every query that completed.
    pub queries: Vec<QueryStats>,
    pub status: CollectionStatus,
}

impl CollectionOutcome {
    pub fn is_complete(&self) -> bool {
        matches!(self.status, CollectionStatus::Completed)
    }
}

/// Why a single candidate did not become a record.
enum RowError {
    Search(SearchError),
    Drop(NormalizeError),
}

impl From<SearchError> for RowError {
    fn from(err: SearchError) -> Self {
        RowError::Search(err)
    }
}

impl From<NormalizeError> for RowError {
    fn from(err: NormalizeError) -> Self {
        RowError::Drop(err)
    }
}

pub struct TaxonomyCollector<'a, C: SearchClient + ?Sized> {
    client: &'a C,
    settings: &'a CollectionConfig,
    reporter: &'a dyn CollectProgressReporter,
}

impl<'a, C: SearchClient + ?Sized> TaxonomyCollector<'a, C> {
    pub fn new(
        client: &'a C,
        settings: &'a CollectionConfig,
        reporter: &'a dyn CollectProgressReporter,
    ) -> Self {
        Self {
            client,
            settings,
            reporter,
        }
    }

    /// Run every query of `taxonomy` in order, growing `known` as batches
    /// are accepted.
    pub fn collect(
        &self,
        taxonomy: &[TaxonomyCategory],
        known: &mut KnownIds,
    ) -> CollectionOutcome {
        let total: u64 = taxonomy
            .iter()
            .map(|entry| self.queries_for(entry).count() as u64)
            .sum();

        let mut records = Vec::new();
        let mut queries = Vec::new();
        let mut n = 0u64;

        for entry in taxonomy {
            for query in self.queries_for(entry) {
                n += 1;
                self.reporter.report(CollectProgressEvent::QueryStarted {
                    category: entry.category.clone(),
                    query: query.clone(),
                    n,
                    total,
                });

                match self.collect_query(&entry.category, query, known) {
                    Ok((batch, stats)) => {
                        self.reporter.report(CollectProgressEvent::QueryFinished {
                            category: stats.category.clone(),
                            query: stats.query.clone(),
                            examined: stats.examined,
                            accepted: stats.accepted,
                            skipped_known: stats.skipped_known,
                            dropped: stats.dropped,
                        });
                        known.absorb(&batch);
                        records.extend(batch);
                        queries.push(stats);
                    }
                    Err(error) => {
                        self.reporter.report(CollectProgressEvent::Interrupted {
                            category: entry.category.clone(),
                            query: query.clone(),
                            reason: error.to_string(),
                        });
                        return CollectionOutcome {
                            records,
                            queries,
                            status: CollectionStatus::Interrupted {
                                category: entry.category.clone(),
                                query: query.clone(),
                                error,
                            },
                        };
                    }
                }
            }
        }

        CollectionOutcome {
            records,
            queries,
            status: CollectionStatus::Completed,
        }
    }

    fn queries_for<'t>(&self, entry: &'t TaxonomyCategory) -> impl Iterator<Item = &'t String> {
        let cap = self.settings.max_queries_per_category.unwrap_or(usize::MAX);
        entry.queries.iter().take(cap)
    }

    /// The query text sent to the collaborator.
    pub fn search_text(&self, query: &str) -> String {
        if self.settings.scope_modifiers.is_empty() {
            query.to_string()
        } else {
            format!("{} {}", query, self.settings.scope_modifiers.join(" "))
        }
    }

    fn collect_query(
        &self,
        category: &str,
        query: &str,
        known: &KnownIds,
    ) -> Result<(Vec<RepositoryRecord>, QueryStats), SearchError> {
        let mut stats = QueryStats::new(category, query);
        let mut batch = Vec::new();
        // Pages can shift while being read; guard against repeats in one batch.
        let mut batch_ids = KnownIds::new();

        let text = self.search_text(query);
        let hits = self
            .client
            .search(&text)
            .take(self.settings.max_candidates_per_query);

        for hit in hits {
            let entity = hit?;
            stats.examined += 1;

            if let Some(id) = entity.id() {
                if known.contains(id) || batch_ids.contains(id) {
                    stats.skipped_known += 1;
                    continue;
                }
            }

            match self.build_record(&entity, category, query) {
                Ok(record) => {
                    batch_ids.insert(record.repository_id);
                    batch.push(record);
                    stats.accepted += 1;
                }
                Err(RowError::Drop(reason)) => {
                    stats.dropped += 1;
                    self.reporter.report(CollectProgressEvent::RowDropped {
                        query: query.to_string(),
                        repository_id: entity.id(),
                        reason: reason.to_string(),
                    });
                }
                Err(RowError::Search(err)) => return Err(err),
            }
        }

        if self.client.take_incomplete(&text) {
            stats.incomplete = true;
            self.reporter.report(CollectProgressEvent::IncompleteResults {
                category: category.to_string(),
                query: query.to_string(),
            });
        }

        Ok((batch, stats))
    }

    fn build_record(
        &self,
        entity: &RawEntity,
        category: &str,
        query: &str,
    ) -> Result<RepositoryRecord, RowError> {
        let repository = decode_repository(&normalize(entity, EntityKind::Repository)?)?;

        let owner_entity = self.client.owner(entity)?;
        let owner = decode_owner(&normalize(&owner_entity, EntityKind::Owner)?)?;

        let organization_entity = self.client.organization(entity)?;
        let organization =
            decode_organization(&normalize_organization(organization_entity.as_ref()));

        Ok(RepositoryRecord::from_parts(
            repository,
            owner,
            organization,
            category,
            query,
        ))
    }
}

/// What a collect command did.
#[derive(Debug)]
pub struct CollectionReport {
    pub outcome: CollectionOutcome,
    /// Ids known before the run started.
    pub known_before: usize,
    /// Rows written to the store (0 on dry runs).
    pub saved: u64,
}

/// Seed the known ids from `store`, run the collector on a blocking worker
/// thread, then save what it gathered and record the run.
///
/// A dry run only reads the known ids: nothing is saved and no run is
/// recorded.
///
/// `make_client` runs on the worker thread, so blocking HTTP clients are
/// created and dropped outside the async runtime.
pub async fn collect_into<S, C, F>(
    store: &S,
    make_client: F,
    collection: CollectionConfig,
    taxonomy: Vec<TaxonomyCategory>,
    reporter: Box<dyn CollectProgressReporter>,
    dry_run: bool,
) -> Result<CollectionReport>
where
    S: RepositoryStore,
    C: SearchClient + 'static,
    F: FnOnce() -> Result<C> + Send + 'static,
{
    let started_at = Utc::now().timestamp();
    let mut known = store.known_ids().await?;
    let known_before = known.len();

    let outcome = tokio::task::spawn_blocking(move || -> Result<CollectionOutcome> {
        let client = make_client()?;
        let collector = TaxonomyCollector::new(&client, &collection, reporter.as_ref());
        Ok(collector.collect(&taxonomy, &mut known))
    })
    .await??;

    if dry_run {
        return Ok(CollectionReport {
            outcome,
            known_before,
            saved: 0,
        });
    }

    let saved = store.save(&outcome.records).await?;
    let (status, detail) = match &outcome.status {
        CollectionStatus::Completed => (RunStatus::Completed, None),
        CollectionStatus::Interrupted {
            category,
            query,
            error,
        } => (
            RunStatus::Interrupted,
            Some(format!("{} / '{}': {}", category, query, error)),
        ),
    };
    store
        .record_run(&RunRecord {
            kind: "collect".to_string(),
            started_at,
            finished_at: Utc::now().timestamp(),
            status,
            records: outcome.records.len() as i64,
            detail,
        })
        .await?;

    Ok(CollectionReport {
        outcome,
        known_before,
        saved,
    })
}

pub async fn run_collect(
    config: &Config,
    category: Option<&str>,
    dry_run: bool,
    progress: ProgressMode,
) -> Result<()> {
    let taxonomy = config.taxonomy_for(category)?;
    if taxonomy.is_empty() {
        bail!("No taxonomy configured. Add [[taxonomy]] entries to the config file.");
    }

    if std::env::var("GITHUB_TOKEN").map_or(true, |t| t.trim().is_empty()) {
        eprintln!("Warning: GITHUB_TOKEN not set. Unauthenticated search is heavily rate limited.");
    }

    let store = SqliteStore::open(config).await?;
    let github = config.github.clone();

    let report = collect_into(
        &store,
        move || GitHubClient::new(&github),
        config.collection.clone(),
        taxonomy,
        progress.reporter(),
        dry_run,
    )
    .await?;

    let outcome = &report.outcome;
    if dry_run {
        println!("collect (dry-run)");
    } else {
        println!("collect");
    }
    println!("  known before: {}", report.known_before);
    println!("  queries run: {}", outcome.queries.len());
    println!("  new repositories: {}", outcome.records.len());
    if !dry_run {
        println!("  saved: {}", report.saved);
    }
    match &outcome.status {
        CollectionStatus::Completed => println!("ok"),
        CollectionStatus::Interrupted {
            category,
            query,
            error,
        } => {
            println!("  stopped early at {} / '{}': {}", category, query, error);
            println!("partial");
        }
    }

    store.close().await;
    Ok(())
}
