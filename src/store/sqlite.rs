//! SQLite-backed [`RepositoryStore`].
//!
//! One `repositories` row per collected repository with owner and
//! organization columns inlined, one `rollups` row per ranked entity, and
//! an append-only `runs` history. Timestamps are stored as Unix seconds.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::dedup::KnownIds;
use crate::migrate;
use crate::models::{OrganizationRecord, OwnerRecord, RepositoryRecord};
use crate::rollup::{Level, RollupRow, Rollups};

use super::{RepositoryStore, RunRecord};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the configured database and make sure the schema exists.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn to_ts(value: i64, column: &str) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(value, 0)
        .ok_or_else(|| anyhow!("invalid timestamp in {}: {}", column, value))
}

fn to_opt_ts(value: Option<i64>, column: &str) -> Result<Option<DateTime<Utc>>> {
    value.map(|v| to_ts(v, column)).transpose()
}

fn row_to_record(row: &SqliteRow) -> Result<RepositoryRecord> {
    let topics_json: String = row.get("topics_json");
    let topics: Vec<String> = serde_json::from_str(&topics_json)
        .with_context(|| format!("invalid topics for repository {}", row.get::<i64, _>("repository_id")))?;

    Ok(RepositoryRecord {
        repository_id: row.get("repository_id"),
        full_name: row.get("full_name"),
        description: row.get("description"),
        topics,
        star_count: row.get("star_count"),
        watcher_count: row.get("watcher_count"),
        fork_count: row.get("fork_count"),
        open_issue_count: row.get("open_issue_count"),
        size: row.get("size"),
        language: row.get("language"),
        visibility: row.get("visibility"),
        has_projects: row.get("has_projects"),
        has_wiki: row.get("has_wiki"),
        has_downloads: row.get("has_downloads"),
        created_at: to_ts(row.get("created_at"), "created_at")?,
        last_modified_at: to_opt_ts(row.get("last_modified_at"), "last_modified_at")?,
        owner: OwnerRecord {
            owner_id: row.get("owner_id"),
            name: row.get("owner_name"),
            login: row.get("owner_login"),
            owner_type: row.get("owner_type"),
            company: row.get("owner_company"),
            location: row.get("owner_location"),
            bio: row.get("owner_bio"),
            follower_count: row.get("owner_follower_count"),
            public_repo_count: row.get("owner_public_repo_count"),
            created_at: to_opt_ts(row.get("owner_created_at"), "owner_created_at")?,
        },
        organization: OrganizationRecord {
            organization_id: row.get("org_id"),
            name: row.get("org_name"),
            login: row.get("org_login"),
            organization_type: row.get("org_type"),
            description: row.get("org_description"),
            company: row.get("org_company"),
            blog: row.get("org_blog"),
            location: row.get("org_location"),
            follower_count: row.get("org_follower_count"),
            public_repo_count: row.get("org_public_repo_count"),
            collaborator_count: row.get("org_collaborator_count"),
            created_at: to_opt_ts(row.get("org_created_at"), "org_created_at")?,
        },
        category: row.get("category"),
        query: row.get("query"),
    })
}

#[async_trait]
impl RepositoryStore for SqliteStore {
    async fn load(&self) -> Result<Vec<RepositoryRecord>> {
        let rows = sqlx::query("SELECT * FROM repositories ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_record).collect()
    }

    async fn save(&self, records: &[RepositoryRecord]) -> Result<u64> {
        let collected_at = Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        for r in records {
            let topics_json = serde_json::to_string(&r.topics)?;
            let org = &r.organization;
            sqlx::query(
                r#"
                INSERT INTO repositories (
                    repository_id, full_name, description, topics_json,
                    star_count, watcher_count, fork_count, open_issue_count, size,
                    language, visibility, has_projects, has_wiki, has_downloads,
                    created_at, last_modified_at,
                    owner_id, owner_name, owner_login, owner_type, owner_company,
                    owner_location, owner_bio, owner_follower_count,
                    owner_public_repo_count, owner_created_at,
                    org_id, org_name, org_login, org_type, org_description,
                    org_company, org_blog, org_location, org_follower_count,
                    org_public_repo_count, org_collaborator_count, org_created_at,
                    category, query, collected_at
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
                        ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(repository_id) DO UPDATE SET
                    full_name = excluded.full_name,
                    description = excluded.description,
                    topics_json = excluded.topics_json,
                    star_count = excluded.star_count,
                    watcher_count = excluded.watcher_count,
                    fork_count = excluded.fork_count,
                    open_issue_count = excluded.open_issue_count,
                    size = excluded.size,
                    language = excluded.language,
                    visibility = excluded.visibility,
                    has_projects = excluded.has_projects,
                    has_wiki = excluded.has_wiki,
                    has_downloads = excluded.has_downloads,
                    created_at = excluded.created_at,
                    last_modified_at = excluded.last_modified_at,
                    owner_id = excluded.owner_id,
                    owner_name = excluded.owner_name,
                    owner_login = excluded.owner_login,
                    owner_type = excluded.owner_type,
                    owner_company = excluded.owner_company,
                    owner_location = excluded.owner_location,
                    owner_bio = excluded.owner_bio,
                    owner_follower_count = excluded.owner_follower_count,
                    owner_public_repo_count = excluded.owner_public_repo_count,
                    owner_created_at = excluded.owner_created_at,
                    org_id = excluded.org_id,
                    org_name = excluded.org_name,
                    org_login = excluded.org_login,
                    org_type = excluded.org_type,
                    org_description = excluded.org_description,
                    org_company = excluded.org_company,
                    org_blog = excluded.org_blog,
                    org_location = excluded.org_location,
                    org_follower_count = excluded.org_follower_count,
                    org_public_repo_count = excluded.org_public_repo_count,
                    org_collaborator_count = excluded.org_collaborator_count,
                    org_created_at = excluded.org_created_at,
                    category = excluded.category,
                    query = excluded.query,
                    collected_at = excluded.collected_at
                "#,
            )
            .bind(r.repository_id)
            .bind(&r.full_name)
            .bind(&r.description)
            .bind(&topics_json)
            .bind(r.star_count)
            .bind(r.watcher_count)
            .bind(r.fork_count)
            .bind(r.open_issue_count)
            .bind(r.size)
            .bind(&r.language)
            .bind(&r.visibility)
            .bind(r.has_projects)
            .bind(r.has_wiki)
            .bind(r.has_downloads)
            .bind(r.created_at.timestamp())
            .bind(r.last_modified_at.map(|t| t.timestamp()))
            .bind(r.owner.owner_id)
            .bind(&r.owner.name)
            .bind(&r.owner.login)
            .bind(&r.owner.owner_type)
            .bind(&r.owner.company)
            .bind(&r.owner.location)
            .bind(&r.owner.bio)
            .bind(r.owner.follower_count)
            .bind(r.owner.public_repo_count)
            .bind(r.owner.created_at.map(|t| t.timestamp()))
            .bind(org.organization_id)
            .bind(&org.name)
            .bind(&org.login)
            .bind(&org.organization_type)
            .bind(&org.description)
            .bind(&org.company)
            .bind(&org.blog)
            .bind(&org.location)
            .bind(org.follower_count)
            .bind(org.public_repo_count)
            .bind(org.collaborator_count)
            .bind(org.created_at.map(|t| t.timestamp()))
            .bind(&r.category)
            .bind(&r.query)
            .bind(collected_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(records.len() as u64)
    }

    async fn known_ids(&self) -> Result<KnownIds> {
        let ids: Vec<i64> = sqlx::query_scalar("SELECT repository_id FROM repositories")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids.into_iter().collect())
    }

    async fn save_rollups(&self, rollups: &Rollups) -> Result<()> {
        let scored_at = Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM rollups").execute(&mut *tx).await?;

        for level in Level::ALL {
            for row in rollups.level(level) {
                sqlx::query(
                    r#"
                    INSERT INTO rollups (level, position, entity_id, login, name,
                                         is_affiliated, score, repository_count, scored_at)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(level.as_str())
                .bind(row.rank as i64)
                .bind(&row.id)
                .bind(&row.login)
                .bind(&row.name)
                .bind(row.is_affiliated_with_known_entity)
                .bind(row.score)
                .bind(row.repository_count as i64)
                .bind(scored_at)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn load_rollup(&self, level: Level) -> Result<Vec<RollupRow>> {
        let rows = sqlx::query(
            r#"
            SELECT position, entity_id, login, name, is_affiliated, score, repository_count
            FROM rollups
            WHERE level = ?
            ORDER BY position ASC
            "#,
        )
        .bind(level.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| RollupRow {
                rank: row.get::<i64, _>("position") as usize,
                id: row.get("entity_id"),
                login: row.get("login"),
                name: row.get("name"),
                is_affiliated_with_known_entity: row.get("is_affiliated"),
                score: row.get("score"),
                repository_count: row.get::<i64, _>("repository_count") as usize,
            })
            .collect())
    }

    async fn record_run(&self, run: &RunRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO runs (kind, started_at, finished_at, status, records, detail)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&run.kind)
        .bind(run.started_at)
        .bind(run.finished_at)
        .bind(run.status.as_str())
        .bind(run.records)
        .bind(&run.detail)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent_runs(&self, limit: usize) -> Result<Vec<RunRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT kind, started_at, finished_at, status, records, detail
            FROM runs
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<RunRecord> {
                let status: String = row.get("status");
                Ok(RunRecord {
                    kind: row.get("kind"),
                    started_at: row.get("started_at"),
                    finished_at: row.get("finished_at"),
                    status: status.parse()?,
                    records: row.get("records"),
                    detail: row.get("detail"),
                })
            })
            .collect()
    }
}
