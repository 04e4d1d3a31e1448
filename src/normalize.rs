//! Raw entity normalization.
//!
//! Projects a [`RawEntity`] onto the declared attribute list of its kind,
//! then decodes the projection into the typed record. Repository and owner
//! entities must carry every declared attribute; an organization missing
//! one is replaced by a full-width null record instead of failing the row.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::NormalizeError;
use crate::models::{
    EntityKind, NormalizedRecord, OrganizationRecord, OwnerRecord, RawEntity, RepositoryFields,
};

/// Project `entity` onto `kind`'s declared attributes.
pub fn normalize(entity: &RawEntity, kind: EntityKind) -> Result<NormalizedRecord, NormalizeError> {
    normalize_with(entity, kind, kind.attributes())
}

/// Project `entity` onto an explicit attribute list, in that order.
pub fn normalize_with(
    entity: &RawEntity,
    kind: EntityKind,
    attributes: &[&str],
) -> Result<NormalizedRecord, NormalizeError> {
    let values = attributes
        .iter()
        .map(|attribute| {
            entity
                .get(attribute)
                .cloned()
                .ok_or_else(|| NormalizeError::MissingAttribute {
                    kind,
                    attribute: attribute.to_string(),
                })
        })
        .collect::<Result<Vec<Value>, _>>()?;

    Ok(NormalizedRecord { kind, values })
}

/// Normalize an optional organization, falling back to nulls when it is
/// absent or incomplete.
pub fn normalize_organization(entity: Option<&RawEntity>) -> NormalizedRecord {
    entity
        .and_then(|org| normalize(org, EntityKind::Organization).ok())
        .unwrap_or_else(|| NormalizedRecord::null(EntityKind::Organization))
}

pub fn decode_repository(record: &NormalizedRecord) -> Result<RepositoryFields, NormalizeError> {
    decode(record)
}

pub fn decode_owner(record: &NormalizedRecord) -> Result<OwnerRecord, NormalizeError> {
    decode(record)
}

/// Decode an organization record. A malformed organization decodes to the
/// absent organization, matching the missing-attribute policy.
pub fn decode_organization(record: &NormalizedRecord) -> OrganizationRecord {
    decode(record).unwrap_or_default()
}

fn decode<T: DeserializeOwned>(record: &NormalizedRecord) -> Result<T, NormalizeError> {
    serde_json::from_value(Value::Object(record.to_object())).map_err(|e| {
        NormalizeError::InvalidShape {
            kind: record.kind,
            message: e.to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn repository_entity() -> RawEntity {
        RawEntity::default()
            .with("id", json!(42))
            .with("full_name", json!("acme/widgets"))
            .with("description", json!("Differential privacy toolkit"))
            .with("topics", json!(["privacy", "ml"]))
            .with("stargazers_count", json!(120))
            .with("watchers_count", json!(120))
            .with("forks_count", json!(9))
            .with("open_issues_count", json!(3))
            .with("size", json!(2048))
            .with("language", Value::Null)
            .with("visibility", json!("public"))
            .with("has_projects", json!(true))
            .with("has_wiki", json!(false))
            .with("has_downloads", json!(true))
            .with("created_at", json!("2020-01-01T00:00:00Z"))
            .with("updated_at", json!("2023-06-01T12:00:00Z"))
            .with("owner", json!({"login": "acme"}))
    }

    #[test]
    fn values_follow_declared_order() {
        let entity = RawEntity::default()
            .with("b", json!(2))
            .with("a", json!(1))
            .with("c", json!(3));
        let record = normalize_with(&entity, EntityKind::Owner, &["c", "a", "b"]).unwrap();
        assert_eq!(record.values, vec![json!(3), json!(1), json!(2)]);
    }

    #[test]
    fn missing_attribute_is_reported() {
        let entity = RawEntity::default().with("id", json!(1));
        let err = normalize_with(&entity, EntityKind::Repository, &["id", "full_name"]).unwrap_err();
        assert_eq!(
            err,
            NormalizeError::MissingAttribute {
                kind: EntityKind::Repository,
                attribute: "full_name".to_string(),
            }
        );
    }

    #[test]
    fn null_value_is_not_missing() {
        let record = normalize(&repository_entity(), EntityKind::Repository).unwrap();
        let fields = decode_repository(&record).unwrap();
        assert_eq!(fields.repository_id, 42);
        assert_eq!(fields.language, None);
        assert_eq!(fields.star_count, 120);
        assert_eq!(fields.topics.unwrap(), vec!["privacy", "ml"]);
    }

    #[test]
    fn incomplete_organization_becomes_nulls() {
        let org = RawEntity::default()
            .with("id", json!(5))
            .with("login", json!("acme"));
        let record = normalize_organization(Some(&org));
        assert!(record.is_null());
        assert!(decode_organization(&record).is_absent());
    }

    #[test]
    fn absent_organization_becomes_nulls() {
        let record = normalize_organization(None);
        assert_eq!(record.kind, EntityKind::Organization);
        assert!(record.is_null());
    }

    #[test]
    fn wrong_type_is_invalid_shape() {
        let entity = repository_entity().with("stargazers_count", json!("many"));
        let record = normalize(&entity, EntityKind::Repository).unwrap();
        assert!(matches!(
            decode_repository(&record),
            Err(NormalizeError::InvalidShape { kind: EntityKind::Repository, .. })
        ));
    }
}
