//! Derived per-repository features.
//!
//! Every feature is a pure function of the base record, the feature
//! configuration and one reference instant shared by the whole run, so
//! recomputing features over the same dataset always gives the same values.
//!
//! | Feature | Definition |
//! |---------|------------|
//! | `is_affiliated_with_known_entity` | repo full name, owner name/login or organization name contains a known entity (case-insensitive substring) |
//! | `is_priority_language` | `language` is one of the priority languages (exact match) |
//! | `is_above_star_threshold` | `star_count > min_stars` |
//! | `years_since_creation` | `(now - created_at).days / 365` |
//! | `years_since_modification` | `(now - last_modified_at).days / 365` |
//! | `contains_topic_keyword` | description or a topic contains a keyword as a whole word |

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::config::FeaturesConfig;
use crate::models::RepositoryRecord;

/// Derived feature columns of one repository.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureSet {
    pub is_affiliated_with_known_entity: bool,
    pub is_priority_language: bool,
    pub is_above_star_threshold: bool,
    pub years_since_creation: f64,
    /// `None` when the source did not report a modification time.
    pub years_since_modification: Option<f64>,
    pub contains_topic_keyword: bool,
}

/// A repository with its derived features.
#[derive(Debug, Clone, PartialEq)]
pub struct FeaturedRecord {
    pub record: RepositoryRecord,
    pub features: FeatureSet,
}

pub struct FeatureEngine {
    known_entities: Vec<String>,
    priority_languages: HashSet<String>,
    min_stars: i64,
    keyword_pattern: Option<Regex>,
    now: DateTime<Utc>,
}

impl FeatureEngine {
    /// Build an engine evaluated against the single instant `now`.
    pub fn new(config: &FeaturesConfig, now: DateTime<Utc>) -> Result<Self> {
        let known_entities = config
            .known_entities
            .iter()
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();

        Ok(Self {
            known_entities,
            priority_languages: config.priority_languages.iter().cloned().collect(),
            min_stars: config.min_stars,
            keyword_pattern: build_keyword_pattern(&config.keywords)?,
            now,
        })
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Derive all features in canonical order.
    pub fn derive(&self, record: &RepositoryRecord) -> FeatureSet {
        FeatureSet {
            is_affiliated_with_known_entity: self.is_affiliated(record),
            is_priority_language: self.is_priority_language(record),
            is_above_star_threshold: self.is_above_star_threshold(record),
            years_since_creation: self.years_since(record.created_at),
            years_since_modification: record.last_modified_at.map(|ts| self.years_since(ts)),
            contains_topic_keyword: self.contains_topic_keyword(record),
        }
    }

    pub fn apply(&self, records: Vec<RepositoryRecord>) -> Vec<FeaturedRecord> {
        records
            .into_iter()
            .map(|record| {
                let features = self.derive(&record);
                FeaturedRecord { record, features }
            })
            .collect()
    }

    pub fn is_affiliated(&self, record: &RepositoryRecord) -> bool {
        let names = [
            Some(record.full_name.as_str()),
            record.owner.name.as_deref(),
            Some(record.owner.login.as_str()),
            record.organization.name.as_deref(),
        ];
        names
            .into_iter()
            .flatten()
            .any(|name| self.matches_known_entity(name))
    }

    fn matches_known_entity(&self, name: &str) -> bool {
        let lowered = name.to_lowercase();
        self.known_entities
            .iter()
            .any(|entity| lowered.contains(entity.as_str()))
    }

    pub fn is_priority_language(&self, record: &RepositoryRecord) -> bool {
        record
            .language
            .as_ref()
            .is_some_and(|lang| self.priority_languages.contains(lang))
    }

    pub fn is_above_star_threshold(&self, record: &RepositoryRecord) -> bool {
        record.star_count > self.min_stars
    }

    pub fn years_since(&self, ts: DateTime<Utc>) -> f64 {
        (self.now - ts).num_days() as f64 / 365.0
    }

    pub fn contains_topic_keyword(&self, record: &RepositoryRecord) -> bool {
        let Some(pattern) = &self.keyword_pattern else {
            return false;
        };
        let in_description = record
            .description
            .as_ref()
            .is_some_and(|d| pattern.is_match(&d.to_lowercase()));
        in_description
            || record
                .topics
                .iter()
                .any(|topic| pattern.is_match(&topic.to_lowercase()))
    }
}

/// Whole-word alternation over the escaped, lower-cased keywords.
fn build_keyword_pattern(keywords: &[String]) -> Result<Option<Regex>> {
    let alternatives: Vec<String> = keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .map(|k| regex::escape(&k))
        .collect();
    if alternatives.is_empty() {
        return Ok(None);
    }
    let pattern = format!(r"\b(?:{})\b", alternatives.join("|"));
    Ok(Some(Regex::new(&pattern)?))
}

/// A scorable column: a raw numeric attribute or a derived feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Feature {
    StarCount,
    WatcherCount,
    ForkCount,
    OpenIssueCount,
    Size,
    OwnerFollowerCount,
    OwnerPublicRepoCount,
    OrganizationFollowerCount,
    OrganizationPublicRepoCount,
    OrganizationCollaboratorCount,
    IsAffiliatedWithKnownEntity,
    IsPriorityLanguage,
    IsAboveStarThreshold,
    YearsSinceCreation,
    YearsSinceModification,
    ContainsTopicKeyword,
}

impl Feature {
    pub const ALL: [Feature; 16] = [
        Feature::StarCount,
        Feature::WatcherCount,
        Feature::ForkCount,
        Feature::OpenIssueCount,
        Feature::Size,
        Feature::OwnerFollowerCount,
        Feature::OwnerPublicRepoCount,
        Feature::OrganizationFollowerCount,
        Feature::OrganizationPublicRepoCount,
        Feature::OrganizationCollaboratorCount,
        Feature::IsAffiliatedWithKnownEntity,
        Feature::IsPriorityLanguage,
        Feature::IsAboveStarThreshold,
        Feature::YearsSinceCreation,
        Feature::YearsSinceModification,
        Feature::ContainsTopicKeyword,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Feature::StarCount => "star_count",
            Feature::WatcherCount => "watcher_count",
            Feature::ForkCount => "fork_count",
            Feature::OpenIssueCount => "open_issue_count",
            Feature::Size => "size",
            Feature::OwnerFollowerCount => "owner_follower_count",
            Feature::OwnerPublicRepoCount => "owner_public_repo_count",
            Feature::OrganizationFollowerCount => "organization_follower_count",
            Feature::OrganizationPublicRepoCount => "organization_public_repo_count",
            Feature::OrganizationCollaboratorCount => "organization_collaborator_count",
            Feature::IsAffiliatedWithKnownEntity => "is_affiliated_with_known_entity",
            Feature::IsPriorityLanguage => "is_priority_language",
            Feature::IsAboveStarThreshold => "is_above_star_threshold",
            Feature::YearsSinceCreation => "years_since_creation",
            Feature::YearsSinceModification => "years_since_modification",
            Feature::ContainsTopicKeyword => "contains_topic_keyword",
        }
    }

    /// Numeric value of this column for one row; `None` when missing.
    pub fn value(&self, row: &FeaturedRecord) -> Option<f64> {
        let r = &row.record;
        let f = &row.features;
        match self {
            Feature::StarCount => Some(r.star_count as f64),
            Feature::WatcherCount => Some(r.watcher_count as f64),
            Feature::ForkCount => Some(r.fork_count as f64),
            Feature::OpenIssueCount => Some(r.open_issue_count as f64),
            Feature::Size => Some(r.size as f64),
            Feature::OwnerFollowerCount => Some(r.owner.follower_count as f64),
            Feature::OwnerPublicRepoCount => Some(r.owner.public_repo_count as f64),
            Feature::OrganizationFollowerCount => r.organization.follower_count.map(|v| v as f64),
            Feature::OrganizationPublicRepoCount => {
                r.organization.public_repo_count.map(|v| v as f64)
            }
            Feature::OrganizationCollaboratorCount => {
                r.organization.collaborator_count.map(|v| v as f64)
            }
            Feature::IsAffiliatedWithKnownEntity => Some(flag(f.is_affiliated_with_known_entity)),
            Feature::IsPriorityLanguage => Some(flag(f.is_priority_language)),
            Feature::IsAboveStarThreshold => Some(flag(f.is_above_star_threshold)),
            Feature::YearsSinceCreation => Some(f.years_since_creation),
            Feature::YearsSinceModification => f.years_since_modification,
            Feature::ContainsTopicKeyword => Some(flag(f.contains_topic_keyword)),
        }
    }
}

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Feature {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match Feature::ALL.iter().find(|f| f.name() == s) {
            Some(feature) => Ok(*feature),
            None => {
                let names: Vec<&str> = Feature::ALL.iter().map(|f| f.name()).collect();
                bail!("Unknown feature: '{}'. Available: {}", s, names.join(", "))
            }
        }
    }
}
