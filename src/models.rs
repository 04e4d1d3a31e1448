//! Core data models used throughout the sourcing pipeline.
//!
//! Raw entities come from a search collaborator as loose JSON objects
//! ([`RawEntity`]). The normalizer projects them onto the declared attribute
//! lists below and the typed records are decoded from that projection, so a
//! record always has exactly the attributes its kind declares.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Attributes read from a repository entity, in record order.
pub const REPOSITORY_ATTRIBUTES: &[&str] = &[
    "id",
    "full_name",
    "description",
    "topics",
    "stargazers_count",
    "watchers_count",
    "forks_count",
    "open_issues_count",
    "size",
    "language",
    "visibility",
    "has_projects",
    "has_wiki",
    "has_downloads",
    "created_at",
    "updated_at",
];

/// Attributes read from an owner (user or organization account) entity.
pub const OWNER_ATTRIBUTES: &[&str] = &[
    "id",
    "name",
    "login",
    "type",
    "company",
    "location",
    "bio",
    "followers",
    "public_repos",
    "created_at",
];

/// Attributes read from an organization entity.
pub const ORGANIZATION_ATTRIBUTES: &[&str] = &[
    "id",
    "name",
    "login",
    "type",
    "description",
    "company",
    "blog",
    "location",
    "followers",
    "public_repos",
    "collaborators",
    "created_at",
];

/// The three entity levels a repository row is built from and scored at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Repository,
    Owner,
    Organization,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Repository => "repository",
            EntityKind::Owner => "owner",
            EntityKind::Organization => "organization",
        }
    }

    /// The declared attribute list for this kind.
    pub fn attributes(&self) -> &'static [&'static str] {
        match self {
            EntityKind::Repository => REPOSITORY_ATTRIBUTES,
            EntityKind::Owner => OWNER_ATTRIBUTES,
            EntityKind::Organization => ORGANIZATION_ATTRIBUTES,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One raw object as returned by a search collaborator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawEntity(Map<String, Value>);

impl RawEntity {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Wrap a JSON value; `None` if it is not an object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// Builder used by fakes and tests.
    pub fn with(mut self, key: &str, value: Value) -> Self {
        self.0.insert(key.to_string(), value);
        self
    }

    pub fn get(&self, attribute: &str) -> Option<&Value> {
        self.0.get(attribute)
    }

    pub fn contains(&self, attribute: &str) -> bool {
        self.0.contains_key(attribute)
    }

    pub fn insert(&mut self, attribute: &str, value: Value) {
        self.0.insert(attribute.to_string(), value);
    }

    pub fn id(&self) -> Option<i64> {
        self.0.get("id").and_then(Value::as_i64)
    }

    pub fn login(&self) -> Option<&str> {
        self.0.get("login").and_then(Value::as_str)
    }

    /// The nested owner reference of a repository entity.
    pub fn owner_ref(&self) -> Option<RawEntity> {
        self.0.get("owner").cloned().and_then(RawEntity::from_value)
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

/// Fixed-width projection of a raw entity onto its kind's attribute list.
///
/// `values[i]` is the value of `kind.attributes()[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    pub kind: EntityKind,
    pub values: Vec<Value>,
}

impl NormalizedRecord {
    /// A full-width record of nulls, used when an organization is absent.
    pub fn null(kind: EntityKind) -> Self {
        Self {
            kind,
            values: vec![Value::Null; kind.attributes().len()],
        }
    }

    pub fn is_null(&self) -> bool {
        self.values.iter().all(Value::is_null)
    }

    /// Attribute name to value, in declared order.
    pub fn to_object(&self) -> Map<String, Value> {
        self.kind
            .attributes()
            .iter()
            .zip(self.values.iter())
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }
}

/// The repository-kind attributes of a row, before tagging and embedding.
#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryFields {
    #[serde(rename = "id")]
    pub repository_id: i64,
    pub full_name: String,
    pub description: Option<String>,
    pub topics: Option<Vec<String>>,
    #[serde(rename = "stargazers_count")]
    pub star_count: i64,
    #[serde(rename = "watchers_count")]
    pub watcher_count: i64,
    #[serde(rename = "forks_count")]
    pub fork_count: i64,
    #[serde(rename = "open_issues_count")]
    pub open_issue_count: i64,
    pub size: i64,
    pub language: Option<String>,
    pub visibility: Option<String>,
    pub has_projects: Option<bool>,
    pub has_wiki: Option<bool>,
    pub has_downloads: Option<bool>,
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updated_at")]
    pub last_modified_at: Option<DateTime<Utc>>,
}

/// Owner account of a repository. The same owner repeats across rows.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OwnerRecord {
    #[serde(rename = "id")]
    pub owner_id: i64,
    pub name: Option<String>,
    pub login: String,
    #[serde(rename = "type")]
    pub owner_type: String,
    pub company: Option<String>,
    pub location: Option<String>,
    pub bio: Option<String>,
    #[serde(rename = "followers")]
    pub follower_count: i64,
    #[serde(rename = "public_repos")]
    pub public_repo_count: i64,
    pub created_at: Option<DateTime<Utc>>,
}

/// Organization a repository belongs to; every field is `None` when the
/// repository has no organization.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct OrganizationRecord {
    #[serde(rename = "id")]
    pub organization_id: Option<i64>,
    pub name: Option<String>,
    pub login: Option<String>,
    #[serde(rename = "type")]
    pub organization_type: Option<String>,
    pub description: Option<String>,
    pub company: Option<String>,
    pub blog: Option<String>,
    pub location: Option<String>,
    #[serde(rename = "followers")]
    pub follower_count: Option<i64>,
    #[serde(rename = "public_repos")]
    pub public_repo_count: Option<i64>,
    #[serde(rename = "collaborators")]
    pub collaborator_count: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
}

impl OrganizationRecord {
    pub fn is_absent(&self) -> bool {
        self.organization_id.is_none()
    }
}

/// One collected repository, unique by `repository_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct RepositoryRecord {
    pub repository_id: i64,
    pub full_name: String,
    pub description: Option<String>,
    pub topics: Vec<String>,
    pub star_count: i64,
    pub watcher_count: i64,
    pub fork_count: i64,
    pub open_issue_count: i64,
    pub size: i64,
    pub language: Option<String>,
    pub visibility: Option<String>,
    pub has_projects: bool,
    pub has_wiki: bool,
    pub has_downloads: bool,
    pub created_at: DateTime<Utc>,
    pub last_modified_at: Option<DateTime<Utc>>,
    pub owner: OwnerRecord,
    pub organization: OrganizationRecord,
    /// Taxonomy category of the query that first found this repository.
    pub category: String,
    /// The query string that first found this repository.
    pub query: String,
}

impl RepositoryRecord {
    pub fn from_parts(
        fields: RepositoryFields,
        owner: OwnerRecord,
        organization: OrganizationRecord,
        category: &str,
        query: &str,
    ) -> Self {
        Self {
            repository_id: fields.repository_id,
            full_name: fields.full_name,
            description: fields.description,
            topics: fields.topics.unwrap_or_default(),
            star_count: fields.star_count,
            watcher_count: fields.watcher_count,
            fork_count: fields.fork_count,
            open_issue_count: fields.open_issue_count,
            size: fields.size,
            language: fields.language,
            visibility: fields.visibility,
            has_projects: fields.has_projects.unwrap_or(false),
            has_wiki: fields.has_wiki.unwrap_or(false),
            has_downloads: fields.has_downloads.unwrap_or(false),
            created_at: fields.created_at,
            last_modified_at: fields.last_modified_at,
            owner,
            organization,
            category: category.to_string(),
            query: query.to_string(),
        }
    }
}

/// One taxonomy category and its query variants, in caller order.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TaxonomyCategory {
    pub category: String,
    pub queries: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn null_record_has_full_width() {
        let record = NormalizedRecord::null(EntityKind::Organization);
        assert_eq!(record.values.len(), ORGANIZATION_ATTRIBUTES.len());
        assert!(record.is_null());
    }

    #[test]
    fn null_organization_decodes_to_absent() {
        let record = NormalizedRecord::null(EntityKind::Organization);
        let org: OrganizationRecord =
            serde_json::from_value(Value::Object(record.to_object())).unwrap();
        assert!(org.is_absent());
        assert_eq!(org, OrganizationRecord::default());
    }

    #[test]
    fn raw_entity_owner_ref() {
        let repo = RawEntity::default()
            .with("id", json!(7))
            .with("owner", json!({"login": "acme", "type": "Organization"}));
        assert_eq!(repo.id(), Some(7));
        assert_eq!(repo.owner_ref().unwrap().login(), Some("acme"));
    }

    #[test]
    fn raw_entity_rejects_non_objects() {
        assert!(RawEntity::from_value(json!([1, 2])).is_none());
    }
}
