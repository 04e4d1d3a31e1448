use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Create the schema on an open pool. Every statement is idempotent.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // One row per collected repository, owner and organization inlined
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS repositories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            repository_id INTEGER NOT NULL UNIQUE,
            full_name TEXT NOT NULL,
            description TEXT,
            topics_json TEXT NOT NULL DEFAULT '[]',
            star_count INTEGER NOT NULL,
            watcher_count INTEGER NOT NULL,
            fork_count INTEGER NOT NULL,
            open_issue_count INTEGER NOT NULL,
            size INTEGER NOT NULL,
            language TEXT,
            visibility TEXT,
            has_projects INTEGER NOT NULL DEFAULT 0,
            has_wiki INTEGER NOT NULL DEFAULT 0,
            has_downloads INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            last_modified_at INTEGER,
            owner_id INTEGER NOT NULL,
            owner_name TEXT,
            owner_login TEXT NOT NULL,
            owner_type TEXT NOT NULL,
            owner_company TEXT,
            owner_location TEXT,
            owner_bio TEXT,
            owner_follower_count INTEGER NOT NULL,
            owner_public_repo_count INTEGER NOT NULL,
            owner_created_at INTEGER,
            org_id INTEGER,
            org_name TEXT,
            org_login TEXT,
            org_type TEXT,
            org_description TEXT,
            org_company TEXT,
            org_blog TEXT,
            org_location TEXT,
            org_follower_count INTEGER,
            org_public_repo_count INTEGER,
            org_collaborator_count INTEGER,
            org_created_at INTEGER,
            category TEXT NOT NULL,
            query TEXT NOT NULL,
            collected_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Latest ranking per level
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS rollups (
            level TEXT NOT NULL,
            position INTEGER NOT NULL,
            entity_id TEXT NOT NULL,
            login TEXT,
            name TEXT NOT NULL,
            is_affiliated INTEGER NOT NULL,
            score REAL NOT NULL,
            repository_count INTEGER NOT NULL,
            scored_at INTEGER NOT NULL,
            PRIMARY KEY (level, position)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Run history
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            kind TEXT NOT NULL,
            started_at INTEGER NOT NULL,
            finished_at INTEGER NOT NULL,
            status TEXT NOT NULL,
            records INTEGER NOT NULL,
            detail TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_repositories_category ON repositories(category)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_repositories_owner ON repositories(owner_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_runs_finished_at ON runs(finished_at DESC)")
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}
