//! Level rollups: per-repository, per-owner and per-organization rankings.
//!
//! The repository level is the identity projection of the scored rows.
//! Owner and organization levels group rows by `(id, login, name,
//! affiliation)` and sum their scores. Null identifiers group under the
//! empty string, so repositories without an organization share one bucket
//! instead of disappearing.
//!
//! Every level is sorted by score (desc) with a stable sort: ties keep the
//! order in which rows (or groups) first appeared.

use anyhow::{bail, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::score::ScoredRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Repository,
    Owner,
    Organization,
}

impl Level {
    pub const ALL: [Level; 3] = [Level::Repository, Level::Owner, Level::Organization];

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Repository => "repository",
            Level::Owner => "owner",
            Level::Organization => "organization",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "repository" => Ok(Level::Repository),
            "owner" => Ok(Level::Owner),
            "organization" => Ok(Level::Organization),
            other => bail!(
                "Unknown level: '{}'. Use repository, owner, or organization.",
                other
            ),
        }
    }
}

/// One ranked row of a level rollup.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RollupRow {
    /// 1-based position after sorting.
    pub rank: usize,
    /// Stable identifier of the entity; empty for the null bucket.
    pub id: String,
    /// Account login; `None` at the repository level.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login: Option<String>,
    pub name: String,
    pub is_affiliated_with_known_entity: bool,
    pub score: f64,
    /// Repository rows folded into this row.
    pub repository_count: usize,
}

/// The three ranked tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Rollups {
    pub repository: Vec<RollupRow>,
    pub owner: Vec<RollupRow>,
    pub organization: Vec<RollupRow>,
}

impl Rollups {
    pub fn level(&self, level: Level) -> &[RollupRow] {
        match level {
            Level::Repository => &self.repository,
            Level::Owner => &self.owner,
            Level::Organization => &self.organization,
        }
    }
}

pub fn aggregate(scored: &[ScoredRecord]) -> Rollups {
    Rollups {
        repository: repository_level(scored),
        owner: grouped_level(scored, |row| {
            let owner = &row.record.owner;
            GroupKey {
                id: owner.owner_id.to_string(),
                login: owner.login.clone(),
                name: owner.name.clone().unwrap_or_default(),
                affiliated: row.features.is_affiliated_with_known_entity,
            }
        }),
        organization: grouped_level(scored, |row| {
            let org = &row.record.organization;
            GroupKey {
                id: org
                    .organization_id
                    .map(|id| id.to_string())
                    .unwrap_or_default(),
                login: org.login.clone().unwrap_or_default(),
                name: org.name.clone().unwrap_or_default(),
                affiliated: row.features.is_affiliated_with_known_entity,
            }
        }),
    }
}

fn repository_level(scored: &[ScoredRecord]) -> Vec<RollupRow> {
    let rows = scored
        .iter()
        .map(|row| RollupRow {
            rank: 0,
            id: row.record.repository_id.to_string(),
            login: None,
            name: row.record.full_name.clone(),
            is_affiliated_with_known_entity: row.features.is_affiliated_with_known_entity,
            score: row.score,
            repository_count: 1,
        })
        .collect();
    ranked(rows)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct GroupKey {
    id: String,
    login: String,
    name: String,
    affiliated: bool,
}

fn grouped_level<F>(scored: &[ScoredRecord], key_of: F) -> Vec<RollupRow>
where
    F: Fn(&ScoredRecord) -> GroupKey,
{
    // Groups in first-appearance order.
    let mut index: HashMap<GroupKey, usize> = HashMap::new();
    let mut rows: Vec<RollupRow> = Vec::new();

    for row in scored {
        let key = key_of(row);
        match index.get(&key) {
            Some(&i) => {
                rows[i].score += row.score;
                rows[i].repository_count += 1;
            }
            None => {
                index.insert(key.clone(), rows.len());
                rows.push(RollupRow {
                    rank: 0,
                    id: key.id,
                    login: Some(key.login),
                    name: key.name,
                    is_affiliated_with_known_entity: key.affiliated,
                    score: row.score,
                    repository_count: 1,
                });
            }
        }
    }

    ranked(rows)
}

fn ranked(mut rows: Vec<RollupRow>) -> Vec<RollupRow> {
    rows.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    for (i, row) in rows.iter_mut().enumerate() {
        row.rank = i + 1;
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::tests::record;
    use crate::features::FeatureSet;

    fn scored(id: i64, owner_login: &str, score: f64) -> ScoredRecord {
        let mut record = record(id, &format!("{}/repo{}", owner_login, id));
        record.owner.owner_id = 1000 + owner_login.len() as i64;
        ScoredRecord {
            record,
            features: FeatureSet {
                is_affiliated_with_known_entity: false,
                is_priority_language: false,
                is_above_star_threshold: false,
                years_since_creation: 1.0,
                years_since_modification: None,
                contains_topic_keyword: false,
            },
            score,
        }
    }

    fn with_org(mut row: ScoredRecord, id: i64, login: &str) -> ScoredRecord {
        row.record.organization.organization_id = Some(id);
        row.record.organization.login = Some(login.to_string());
        row.record.organization.name = Some(login.to_uppercase());
        row
    }

    #[test]
    fn owner_scores_are_summed() {
        let rows = vec![scored(1, "acme", 3.0), scored(2, "acme", 4.0), scored(3, "zed", 5.0)];
        let rollups = aggregate(&rows);
        let acme = rollups
            .owner
            .iter()
            .find(|r| r.login.as_deref() == Some("acme"))
            .unwrap();
        assert!((acme.score - 7.0).abs() < 1e-9);
        assert_eq!(acme.repository_count, 2);
        assert_eq!(acme.rank, 1);
        assert_eq!(rollups.owner.len(), 2);
    }

    #[test]
    fn repository_level_is_identity_sorted() {
        let rows = vec![scored(1, "a", 0.0), scored(2, "b", 11.0)];
        let rollups = aggregate(&rows);
        assert_eq!(rollups.repository.len(), 2);
        assert_eq!(rollups.repository[0].id, "2");
        assert_eq!(rollups.repository[0].rank, 1);
        assert_eq!(rollups.repository[1].id, "1");
        assert!(rollups.repository[0].login.is_none());
    }

    #[test]
    fn missing_organization_forms_empty_bucket() {
        let rows = vec![
            with_org(scored(1, "a", 2.0), 77, "acme"),
            scored(2, "b", 1.0),
            scored(3, "c", 1.5),
        ];
        let rollups = aggregate(&rows);
        assert_eq!(rollups.organization.len(), 2);
        let bucket = rollups
            .organization
            .iter()
            .find(|r| r.id.is_empty())
            .unwrap();
        assert_eq!(bucket.login.as_deref(), Some(""));
        assert_eq!(bucket.name, "");
        assert_eq!(bucket.repository_count, 2);
        assert!((bucket.score - 2.5).abs() < 1e-9);
        assert_eq!(bucket.rank, 1);
    }

    #[test]
    fn ties_keep_input_order() {
        let rows = vec![scored(5, "e", 1.0), scored(3, "c", 1.0), scored(9, "i", 1.0)];
        let rollups = aggregate(&rows);
        let ids: Vec<&str> = rollups.repository.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["5", "3", "9"]);
    }

    #[test]
    fn affiliation_is_part_of_group_key() {
        let a = scored(1, "acme", 1.0);
        let mut b = scored(2, "acme", 1.0);
        b.features.is_affiliated_with_known_entity = true;
        let rollups = aggregate(&[a, b]);
        assert_eq!(rollups.owner.len(), 2);
    }

    #[test]
    fn level_parses() {
        assert_eq!("owner".parse::<Level>().unwrap(), Level::Owner);
        assert!("team".parse::<Level>().is_err());
    }
}
