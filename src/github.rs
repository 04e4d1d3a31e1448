//! GitHub REST implementation of [`SearchClient`].
//!
//! - `search` → `GET /search/repositories`, paginated lazily
//! - `owner` → `GET /users/{login}`
//! - `organization` → `GET /orgs/{login}` when the owner is an organization
//!
//! Authentication uses `GITHUB_TOKEN` when set. Rate-limit refusals (HTTP
//! 429, or 403 with an exhausted quota) surface as
//! [`SearchError::RateLimited`] with the reset time from the response
//! headers. Nothing is retried: the collector ends the run on the first
//! error and keeps what it has.
//!
//! A search that times out on GitHub's side still answers 200 with
//! `incomplete_results: true`. Such queries are remembered and reported
//! through [`SearchClient::take_incomplete`].

use anyhow::Result;
use reqwest::blocking::Client;
use reqwest::header::HeaderMap;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use crate::config::{Config, GithubConfig};
use crate::error::SearchError;
use crate::models::RawEntity;
use crate::store::format_ts_iso;
use crate::traits::{SearchClient, SearchResults};

/// The search API never returns more than this many results per query.
const SEARCH_RESULT_CAP: u64 = 1000;

pub struct GitHubClient {
    http: Client,
    api_url: String,
    token: Option<String>,
    per_page: u32,
    incomplete: Mutex<HashSet<String>>,
}

/// One quota bucket from `GET /rate_limit`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Quota {
    pub limit: u64,
    pub remaining: u64,
    /// Unix seconds.
    pub reset: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub core: Quota,
    pub search: Quota,
}

impl GitHubClient {
    pub fn new(config: &GithubConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("repo-sourcing/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let token = std::env::var("GITHUB_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty());

        Ok(Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token,
            per_page: config.per_page,
            incomplete: Mutex::new(HashSet::new()),
        })
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Value, SearchError> {
        let url = format!("{}{}", self.api_url, path);
        let mut request = self
            .http
            .get(&url)
            .header("Accept", "application/vnd.github+json")
            .query(query);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send()?;
        let status = response.status();
        if status.is_success() {
            return Ok(response.json()?);
        }

        let headers = response.headers().clone();
        let body = response.text().unwrap_or_default();
        Err(classify_failure(
            status.as_u16(),
            header(&headers, "x-ratelimit-remaining"),
            header(&headers, "x-ratelimit-reset"),
            &body,
        ))
    }

    fn get_entity(&self, path: &str) -> Result<RawEntity, SearchError> {
        let value = self.get(path, &[])?;
        RawEntity::from_value(value)
            .ok_or_else(|| SearchError::Malformed(format!("{} did not return an object", path)))
    }

    /// Current quotas. Does not count against them.
    pub fn rate_limit(&self) -> Result<RateLimitStatus, SearchError> {
        let body = self.get("/rate_limit", &[])?;
        parse_rate_limit(&body)
    }
}

impl SearchClient for GitHubClient {
    fn name(&self) -> &str {
        "github"
    }

    fn search<'a>(&'a self, query: &str) -> SearchResults<'a> {
        if let Ok(mut incomplete) = self.incomplete.lock() {
            incomplete.remove(query);
        }
        let q = query.to_string();
        let per_page = self.per_page;
        let fetch = move |page: u32| {
            self.get(
                "/search/repositories",
                &[
                    ("q", q.clone()),
                    ("per_page", per_page.to_string()),
                    ("page", page.to_string()),
                ],
            )
        };
        Box::new(SearchPages::new(query, per_page, &self.incomplete, fetch))
    }

    fn take_incomplete(&self, query: &str) -> bool {
        self.incomplete
            .lock()
            .map(|mut incomplete| incomplete.remove(query))
            .unwrap_or(false)
    }

    fn owner(&self, repository: &RawEntity) -> Result<RawEntity, SearchError> {
        let owner = repository
            .owner_ref()
            .ok_or_else(|| SearchError::Malformed("repository has no owner".to_string()))?;
        let login = owner
            .login()
            .ok_or_else(|| SearchError::Malformed("repository owner has no login".to_string()))?;
        self.get_entity(&format!("/users/{}", login))
    }

    fn organization(&self, repository: &RawEntity) -> Result<Option<RawEntity>, SearchError> {
        let login = match organization_login(repository) {
            Some(login) => login,
            None => return Ok(None),
        };
        let mut org = self.get_entity(&format!("/orgs/{}", login))?;
        // Only members see the collaborator count.
        if !org.contains("collaborators") {
            org.insert("collaborators", Value::Null);
        }
        Ok(Some(org))
    }
}

/// Lazy page walker over `GET /search/repositories`.
///
/// `fetch` is called with the 1-based page number, only when the buffer
/// runs dry. After an error the iterator yields it once and then ends.
struct SearchPages<'a> {
    query: String,
    per_page: u32,
    page: u32,
    buffer: VecDeque<RawEntity>,
    done: bool,
    incomplete: &'a Mutex<HashSet<String>>,
    fetch: Box<dyn FnMut(u32) -> Result<Value, SearchError> + 'a>,
}

impl<'a> SearchPages<'a> {
    fn new(
        query: &str,
        per_page: u32,
        incomplete: &'a Mutex<HashSet<String>>,
        fetch: impl FnMut(u32) -> Result<Value, SearchError> + 'a,
    ) -> Self {
        Self {
            query: query.to_string(),
            per_page,
            page: 0,
            buffer: VecDeque::new(),
            done: false,
            incomplete,
            fetch: Box::new(fetch),
        }
    }

    fn fetch_next_page(&mut self) -> Result<(), SearchError> {
        self.page += 1;
        let page = parse_search_page((self.fetch)(self.page)?)?;

        if page.incomplete_results {
            if let Ok(mut incomplete) = self.incomplete.lock() {
                incomplete.insert(self.query.clone());
            }
        }
        if is_last_page(self.page, self.per_page, page.items.len(), page.total_count) {
            self.done = true;
        }
        self.buffer.extend(page.items);
        Ok(())
    }
}

/// Whether `page` (1-based) ends the walk: it came back short, or it
/// reached the smaller of `total` and the result ceiling.
fn is_last_page(page: u32, per_page: u32, items: usize, total: u64) -> bool {
    let reachable = total.min(SEARCH_RESULT_CAP);
    let fetched = u64::from(page) * u64::from(per_page);
    items < per_page as usize || fetched >= reachable
}

impl Iterator for SearchPages<'_> {
    type Item = Result<RawEntity, SearchError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Some(Ok(item));
            }
            if self.done {
                return None;
            }
            if let Err(err) = self.fetch_next_page() {
                self.done = true;
                return Some(Err(err));
            }
        }
    }
}

struct SearchPage {
    total_count: u64,
    incomplete_results: bool,
    items: Vec<RawEntity>,
}

fn parse_search_page(body: Value) -> Result<SearchPage, SearchError> {
    let total_count = body
        .get("total_count")
        .and_then(Value::as_u64)
        .ok_or_else(|| SearchError::Malformed("search response has no total_count".to_string()))?;

    let items = match body.get("items") {
        Some(Value::Array(items)) => items.clone(),
        _ => {
            return Err(SearchError::Malformed(
                "search response has no items array".to_string(),
            ))
        }
    };

    let items = items
        .into_iter()
        .map(|item| {
            RawEntity::from_value(item)
                .ok_or_else(|| SearchError::Malformed("search item is not an object".to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let incomplete_results = body
        .get("incomplete_results")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    Ok(SearchPage {
        total_count,
        incomplete_results,
        items,
    })
}

fn parse_rate_limit(body: &Value) -> Result<RateLimitStatus, SearchError> {
    let quota = |name: &str| -> Result<Quota, SearchError> {
        let value = body
            .pointer(&format!("/resources/{}", name))
            .cloned()
            .ok_or_else(|| SearchError::Malformed(format!("rate_limit has no '{}' bucket", name)))?;
        serde_json::from_value(value).map_err(|e| SearchError::Malformed(e.to_string()))
    };
    Ok(RateLimitStatus {
        core: quota("core")?,
        search: quota("search")?,
    })
}

/// Login of the organization owning `repository`, if its owner is one.
fn organization_login(repository: &RawEntity) -> Option<String> {
    let owner = repository.owner_ref()?;
    match owner.get("type").and_then(Value::as_str) {
        Some("Organization") => owner.login().map(str::to_string),
        _ => None,
    }
}

fn header<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn classify_failure(
    status: u16,
    remaining: Option<&str>,
    reset: Option<&str>,
    body: &str,
) -> SearchError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string());

    let exhausted = remaining.map(str::trim) == Some("0");
    let secondary = message.to_lowercase().contains("rate limit");
    if status == 429 || (status == 403 && (exhausted || secondary)) {
        return SearchError::RateLimited {
            reset_at: reset.and_then(|v| v.trim().parse().ok()),
        };
    }

    SearchError::Http { status, message }
}

/// Run the rate-limit command: print the core and search quotas.
pub async fn run_rate_limit(config: &Config) -> Result<()> {
    let github = config.github.clone();
    let (status, authenticated) = tokio::task::spawn_blocking(move || -> Result<_> {
        let client = GitHubClient::new(&github)?;
        let status = client.rate_limit()?;
        Ok((status, client.is_authenticated()))
    })
    .await??;

    println!(
        "GitHub API ({})",
        if authenticated {
            "authenticated"
        } else {
            "unauthenticated"
        }
    );
    for (label, quota) in [("core", &status.core), ("search", &status.search)] {
        println!(
            "  {:<8} {:>6} / {:<6} resets {}",
            label,
            quota.remaining,
            quota.limit,
            format_ts_iso(quota.reset)
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn exhausted_quota_is_rate_limited() {
        let err = classify_failure(403, Some("0"), Some("1700000000"), r#"{"message":"API rate limit exceeded"}"#);
        assert!(matches!(
            err,
            SearchError::RateLimited {
                reset_at: Some(1_700_000_000)
            }
        ));
    }

    #[test]
    fn too_many_requests_is_rate_limited() {
        let err = classify_failure(429, None, None, "");
        assert!(matches!(err, SearchError::RateLimited { reset_at: None }));
    }

    #[test]
    fn forbidden_with_quota_left_is_http() {
        let err = classify_failure(403, Some("12"), None, r#"{"message":"Resource not accessible"}"#);
        match err {
            SearchError::Http { status, message } => {
                assert_eq!(status, 403);
                assert_eq!(message, "Resource not accessible");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn unprocessable_query_keeps_plain_body() {
        let err = classify_failure(422, None, None, "Validation Failed ");
        assert_eq!(err.to_string(), "search API error 422: Validation Failed");
    }

    #[test]
    fn search_page_parses_items() {
        let page = parse_search_page(json!({
            "total_count": 2,
            "incomplete_results": false,
            "items": [{"id": 1}, {"id": 2}]
        }))
        .unwrap();
        assert_eq!(page.total_count, 2);
        assert!(!page.incomplete_results);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[1].id(), Some(2));
    }

    #[test]
    fn search_page_rejects_non_objects() {
        assert!(matches!(
            parse_search_page(json!({"total_count": 1, "items": [3]})),
            Err(SearchError::Malformed(_))
        ));
        assert!(matches!(
            parse_search_page(json!({"message": "oops"})),
            Err(SearchError::Malformed(_))
        ));
    }

    #[test]
    fn rate_limit_buckets() {
        let status = parse_rate_limit(&json!({
            "resources": {
                "core": {"limit": 5000, "remaining": 4999, "reset": 1700000000, "used": 1},
                "search": {"limit": 30, "remaining": 0, "reset": 1700000060, "used": 30}
            }
        }))
        .unwrap();
        assert_eq!(status.core.remaining, 4999);
        assert_eq!(status.search.remaining, 0);
        assert_eq!(status.search.reset, 1_700_000_060);
    }

    #[test]
    fn only_organization_owners_resolve() {
        let org_repo = RawEntity::default()
            .with("owner", json!({"login": "acme", "type": "Organization"}));
        let user_repo = RawEntity::default().with("owner", json!({"login": "bob", "type": "User"}));
        assert_eq!(organization_login(&org_repo).as_deref(), Some("acme"));
        assert_eq!(organization_login(&user_repo), None);
        assert_eq!(organization_login(&RawEntity::default()), None);
    }

    fn page_body(first_id: i64, count: usize, total: u64) -> Value {
        let items: Vec<Value> = (0..count as i64).map(|i| json!({"id": first_id + i})).collect();
        json!({"total_count": total, "incomplete_results": false, "items": items})
    }

    #[test]
    fn last_page_rules() {
        // short page
        assert!(is_last_page(1, 100, 40, 5000));
        // empty page
        assert!(is_last_page(3, 100, 0, 5000));
        // reached total_count
        assert!(is_last_page(2, 100, 100, 200));
        assert!(!is_last_page(1, 100, 100, 200));
        // result ceiling
        assert!(is_last_page(10, 100, 100, 50_000));
        assert!(!is_last_page(9, 100, 100, 50_000));
        assert!(is_last_page(34, 30, 30, 50_000));
        assert!(!is_last_page(33, 30, 30, 50_000));
    }

    #[test]
    fn pages_load_as_they_are_consumed() {
        let incomplete = Mutex::new(HashSet::new());
        let requested = std::cell::RefCell::new(Vec::new());
        let mut pages = SearchPages::new("privacy", 2, &incomplete, |page| {
            requested.borrow_mut().push(page);
            Ok(page_body(i64::from(page) * 10, 2, 5))
        });

        assert_eq!(pages.next().unwrap().unwrap().id(), Some(10));
        assert_eq!(*requested.borrow(), vec![1]);
        assert_eq!(pages.next().unwrap().unwrap().id(), Some(11));
        assert_eq!(*requested.borrow(), vec![1]);
        assert_eq!(pages.next().unwrap().unwrap().id(), Some(20));
        assert_eq!(*requested.borrow(), vec![1, 2]);
    }

    #[test]
    fn walk_stops_at_total_count_and_on_short_page() {
        let incomplete = Mutex::new(HashSet::new());
        let mut calls = 0;
        let ids: Vec<i64> = SearchPages::new("q", 2, &incomplete, |page| {
            calls += 1;
            Ok(page_body(i64::from(page) * 10, 2, 4))
        })
        .map(|item| item.unwrap().id().unwrap())
        .collect();
        assert_eq!(ids, vec![10, 11, 20, 21]);
        assert_eq!(calls, 2);

        let short: Vec<i64> = SearchPages::new("q", 3, &incomplete, |page| {
            assert_eq!(page, 1, "short page must end the walk");
            Ok(page_body(1, 2, 900))
        })
        .map(|item| item.unwrap().id().unwrap())
        .collect();
        assert_eq!(short, vec![1, 2]);
    }

    #[test]
    fn walk_stops_at_result_ceiling() {
        let incomplete = Mutex::new(HashSet::new());
        let mut last_page = 0;
        let count = SearchPages::new("q", 100, &incomplete, |page| {
            last_page = page;
            Ok(page_body(i64::from(page) * 1000, 100, 250_000))
        })
        .count();
        assert_eq!(count, 1000);
        assert_eq!(last_page, 10);
    }

    #[test]
    fn error_is_yielded_once_then_walk_ends() {
        let incomplete = Mutex::new(HashSet::new());
        let mut pages = SearchPages::new("q", 2, &incomplete, |page| match page {
            1 => Ok(page_body(1, 2, 100)),
            _ => Err(SearchError::RateLimited { reset_at: None }),
        });

        assert!(pages.next().unwrap().is_ok());
        assert!(pages.next().unwrap().is_ok());
        assert!(matches!(
            pages.next(),
            Some(Err(SearchError::RateLimited { reset_at: None }))
        ));
        assert!(pages.next().is_none());
        assert!(pages.next().is_none());
    }

    #[test]
    fn incomplete_results_are_remembered_per_query() {
        let incomplete = Mutex::new(HashSet::new());
        let count = SearchPages::new("slow query", 2, &incomplete, |_| {
            Ok(json!({"total_count": 10, "incomplete_results": true, "items": [{"id": 1}]}))
        })
        .count();
        assert_eq!(count, 1);
        assert!(incomplete.lock().unwrap().contains("slow query"));
    }
}
