//! Extension seam for search collaborators.
//!
//! The collector talks to a code-hosting search API only through
//! [`SearchClient`]. The built-in implementation is
//! [`GitHubClient`](crate::github::GitHubClient); tests and custom sources
//! implement the trait directly.
//!
//! # Usage
//!
//! ```rust
//! use repo_sourcing::error::SearchError;
//! use repo_sourcing::models::RawEntity;
//! use repo_sourcing::traits::{SearchClient, SearchResults};
//!
//! struct EmptySource;
//!
//! impl SearchClient for EmptySource {
//!     fn name(&self) -> &str { "empty" }
//!
//!     fn search<'a>(&'a self, _query: &str) -> SearchResults<'a> {
//!         Box::new(std::iter::empty())
//!     }
//!
//!     fn owner(&self, _repository: &RawEntity) -> Result<RawEntity, SearchError> {
//!         Err(SearchError::Malformed("no owners here".to_string()))
//!     }
//!
//!     fn organization(&self, _repository: &RawEntity) -> Result<Option<RawEntity>, SearchError> {
//!         Ok(None)
//!     }
//! }
//! ```

use crate::error::SearchError;
use crate::models::RawEntity;

/// Lazy, finite sequence of raw repository entities for one query.
///
/// An `Err` item means the search failed at that point; callers stop
/// consuming the sequence there.
pub type SearchResults<'a> = Box<dyn Iterator<Item = Result<RawEntity, SearchError>> + 'a>;

/// A code-hosting search API.
///
/// Calls are blocking. The collector issues them strictly one after the
/// other, so implementations need no internal synchronization beyond
/// `Send + Sync` for moving onto a blocking worker thread.
pub trait SearchClient: Send + Sync {
    /// Short label used in progress output (e.g. `"github"`).
    fn name(&self) -> &str;

    /// Search repositories. Pagination, if any, happens inside the
    /// returned iterator as it is consumed.
    fn search<'a>(&'a self, query: &str) -> SearchResults<'a>;

    /// Resolve the owner account of a repository entity.
    fn owner(&self, repository: &RawEntity) -> Result<RawEntity, SearchError>;

    /// Resolve the organization of a repository entity, `None` if the
    /// repository does not belong to one.
    fn organization(&self, repository: &RawEntity) -> Result<Option<RawEntity>, SearchError>;

    /// Whether the last `search` for `query` was answered with partial
    /// results (e.g. a server-side timeout). Clears the flag.
    fn take_incomplete(&self, _query: &str) -> bool {
        false
    }
}
