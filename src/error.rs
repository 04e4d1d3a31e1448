//! Typed conditions raised by the collection pipeline.
//!
//! Command-level code uses `anyhow`; these types exist where a caller has
//! to tell conditions apart and recover locally: the collector substitutes
//! nulls on a missing organization attribute and ends the run on any
//! [`SearchError`].

use thiserror::Error;

use crate::models::EntityKind;

/// Failure to map a raw entity onto its declared attribute list.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    /// A declared attribute is absent from the raw entity.
    ///
    /// An attribute present with a JSON `null` value is not missing.
    #[error("{kind} entity is missing attribute '{attribute}'")]
    MissingAttribute { kind: EntityKind, attribute: String },

    /// The attributes were present but did not fit the record shape
    /// (e.g. a string where a count was expected).
    #[error("{kind} entity has an invalid shape: {message}")]
    InvalidShape { kind: EntityKind, message: String },
}

/// Failure signalled by a search collaborator.
///
/// Every variant is terminal for a collection run: the collector stops and
/// returns what it has gathered so far.
#[derive(Debug, Error)]
pub enum SearchError {
    /// The API refused the request because the quota is exhausted.
    #[error("rate limit exhausted{}", reset_suffix(.reset_at))]
    RateLimited { reset_at: Option<i64> },

    /// The API answered with a non-success status.
    #[error("search API error {status}: {message}")]
    Http { status: u16, message: String },

    /// The request never got an answer (DNS, TLS, timeout, ...).
    #[error("transport error: {0}")]
    Transport(String),

    /// The API answered but the payload could not be understood.
    #[error("malformed response: {0}")]
    Malformed(String),
}

fn reset_suffix(reset_at: &Option<i64>) -> String {
    match reset_at {
        Some(ts) => format!(" (resets at {})", crate::store::format_ts_iso(*ts)),
        None => String::new(),
    }
}

impl From<reqwest::Error> for SearchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SearchError::Malformed(err.to_string())
        } else {
            SearchError::Transport(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_attribute_names_kind_and_field() {
        let err = NormalizeError::MissingAttribute {
            kind: EntityKind::Organization,
            attribute: "collaborators".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "organization entity is missing attribute 'collaborators'"
        );
    }

    #[test]
    fn rate_limit_message_without_reset() {
        let err = SearchError::RateLimited { reset_at: None };
        assert_eq!(err.to_string(), "rate limit exhausted");
    }

    #[test]
    fn rate_limit_message_with_reset() {
        let err = SearchError::RateLimited {
            reset_at: Some(0),
        };
        assert_eq!(
            err.to_string(),
            "rate limit exhausted (resets at 1970-01-01T00:00:00Z)"
        );
    }
}
