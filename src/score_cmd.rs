//! The `score` command: features, weighted scores and level rollups over
//! the stored dataset.
//!
//! Scores are relative to the dataset being scored (min-max over the
//! current rows), so every run rescores everything and replaces the stored
//! rankings as a whole.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::features::{FeatureEngine, FeaturedRecord};
use crate::models::RepositoryRecord;
use crate::rollup::{aggregate, Level, RollupRow, Rollups};
use crate::score::{Contribution, ScoredRecord, Scorer};
use crate::store::{RepositoryStore, RunRecord, RunStatus, SqliteStore};

/// Everything one scoring pass produces.
#[derive(Debug)]
pub struct Ranking {
    /// Scored rows in dataset order.
    pub scored: Vec<ScoredRecord>,
    pub rollups: Rollups,
}

/// Derive features with one reference instant, score, and roll up.
pub fn rank_records(
    records: Vec<RepositoryRecord>,
    config: &Config,
    now: DateTime<Utc>,
) -> Result<Ranking> {
    let engine = FeatureEngine::new(&config.features, now)?;
    let scorer = Scorer::from_config(&config.scoring)?;
    let scored = scorer.score(engine.apply(records));
    let rollups = aggregate(&scored);
    Ok(Ranking { scored, rollups })
}

/// Per-feature breakdown of the top `top` repositories.
pub fn explain_top(
    ranking: &Ranking,
    config: &Config,
    top: usize,
) -> Result<Vec<(RollupRow, Vec<Contribution>)>> {
    let scorer = Scorer::from_config(&config.scoring)?;
    let featured: Vec<FeaturedRecord> = ranking
        .scored
        .iter()
        .cloned()
        .map(ScoredRecord::into_featured)
        .collect();

    Ok(ranking
        .rollups
        .repository
        .iter()
        .take(top)
        .filter_map(|row| {
            let index = ranking
                .scored
                .iter()
                .position(|s| s.record.repository_id.to_string() == row.id)?;
            Some((row.clone(), scorer.explain(&featured, index)))
        })
        .collect())
}

/// Score every record in `store`. Unless `dry_run`, save the rollups and
/// record the run.
pub async fn score_store<S: RepositoryStore>(
    store: &S,
    config: &Config,
    now: DateTime<Utc>,
    dry_run: bool,
) -> Result<Ranking> {
    let started_at = Utc::now().timestamp();
    let records = store.load().await?;
    let ranking = rank_records(records, config, now)?;

    if dry_run {
        return Ok(ranking);
    }

    store.save_rollups(&ranking.rollups).await?;
    store
        .record_run(&RunRecord {
            kind: "score".to_string(),
            started_at,
            finished_at: Utc::now().timestamp(),
            status: RunStatus::Completed,
            records: ranking.scored.len() as i64,
            detail: None,
        })
        .await?;

    Ok(ranking)
}

pub async fn run_score(config: &Config, top: usize, dry_run: bool, explain: bool) -> Result<()> {
    if config.scoring.weights.is_empty() {
        bail!("No scoring weights configured. Add a [scoring.weights] table to the config file.");
    }

    let store = SqliteStore::open(config).await?;
    let ranking = score_store(&store, config, Utc::now(), dry_run).await?;

    if ranking.scored.is_empty() {
        println!("No repositories collected yet. Run `sourcing collect` first.");
        store.close().await;
        return Ok(());
    }

    for level in Level::ALL {
        let rows = ranking.rollups.level(level);
        println!();
        println!("Top {} by {} ({} total)", top.min(rows.len()), level, rows.len());
        println!("  {:>4}  {:>10}  {:>5}  {}", "RANK", "SCORE", "REPOS", "NAME");
        for row in rows.iter().take(top) {
            println!(
                "  {:>4}  {:>10.4}  {:>5}  {}{}",
                row.rank,
                row.score,
                row.repository_count,
                display_name(row),
                if row.is_affiliated_with_known_entity {
                    "  *"
                } else {
                    ""
                }
            );
        }
    }

    if explain {
        println!();
        println!("Contributions");
        for (row, contributions) in explain_top(&ranking, config, top)? {
            println!("  {} ({:.4})", row.name, row.score);
            for c in contributions {
                println!(
                    "    {:<32} {:>8.3} x {:>6.4} = {:>9.4}",
                    c.feature, c.weight, c.normalized, c.contribution
                );
            }
        }
    }

    println!();
    if dry_run {
        println!("dry-run: rankings not saved");
    } else {
        println!("Saved rankings for {} repositories.", ranking.scored.len());
    }

    store.close().await;
    Ok(())
}

fn display_name(row: &RollupRow) -> String {
    match row.login.as_deref() {
        Some("") if row.name.is_empty() => "(none)".to_string(),
        Some(login) if !row.name.is_empty() && row.name != login => {
            format!("{} ({})", login, row.name)
        }
        Some(login) => login.to_string(),
        None => row.name.clone(),
    }
}
