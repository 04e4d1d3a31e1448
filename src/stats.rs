//! Dataset statistics.
//!
//! A quick summary of what has been collected and ranked: repository
//! counts per category and language, organization coverage, rollup sizes,
//! and the latest runs. Used by `sourcing stats` to check that collection
//! is progressing as expected.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::rollup::Level;
use crate::store::{RepositoryStore, SqliteStore};

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let pool = store.pool();

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM repositories")
        .fetch_one(pool)
        .await?;
    let with_org: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM repositories WHERE org_id IS NOT NULL")
            .fetch_one(pool)
            .await?;
    let owners: i64 = sqlx::query_scalar("SELECT COUNT(DISTINCT owner_id) FROM repositories")
        .fetch_one(pool)
        .await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Repository Sourcing: Database Stats");
    println!("====================================");
    println!();
    println!("  Database:      {}", config.db.path.display());
    println!("  Size:          {}", format_bytes(db_size));
    println!();
    println!("  Repositories:  {}", total);
    println!("  Owners:        {}", owners);
    println!(
        "  With org:      {} / {} ({}%)",
        with_org,
        total,
        if total > 0 { (with_org * 100) / total } else { 0 }
    );

    let category_rows = sqlx::query(
        r#"
        SELECT category, COUNT(*) AS repo_count, MAX(collected_at) AS last_collected
        FROM repositories
        GROUP BY category
        ORDER BY repo_count DESC, category ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    if !category_rows.is_empty() {
        println!();
        println!("  By category:");
        println!("  {:<28} {:>8}   {}", "CATEGORY", "REPOS", "LAST COLLECTED");
        println!("  {}", "-".repeat(60));
        for row in &category_rows {
            let category: String = row.get("category");
            let count: i64 = row.get("repo_count");
            let last: Option<i64> = row.get("last_collected");
            println!(
                "  {:<28} {:>8}   {}",
                category,
                count,
                last.map(format_ts_relative)
                    .unwrap_or_else(|| "never".to_string())
            );
        }
    }

    let language_rows = sqlx::query(
        r#"
        SELECT COALESCE(language, '(none)') AS lang, COUNT(*) AS repo_count
        FROM repositories
        GROUP BY lang
        ORDER BY repo_count DESC, lang ASC
        LIMIT 10
        "#,
    )
    .fetch_all(pool)
    .await?;

    if !language_rows.is_empty() {
        println!();
        println!("  Top languages:");
        for row in &language_rows {
            let lang: String = row.get("lang");
            let count: i64 = row.get("repo_count");
            println!("  {:<28} {:>8}", lang, count);
        }
    }

    println!();
    println!("  Rankings:");
    for level in Level::ALL {
        let rows = store.load_rollup(level).await?;
        println!("  {:<28} {:>8}", level.as_str(), rows.len());
    }

    let runs = store.recent_runs(5).await?;
    if !runs.is_empty() {
        println!();
        println!("  Recent runs:");
        for run in &runs {
            println!(
                "  {:<8} {:<12} {:>6} records   {}{}",
                run.kind,
                run.status.as_str(),
                run.records,
                format_ts_relative(run.finished_at),
                run.detail
                    .as_deref()
                    .map(|d| format!("  ({})", d))
                    .unwrap_or_default()
            );
        }
    }

    println!();

    store.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    relative_to(chrono::Utc::now().timestamp(), ts)
}

fn relative_to(now: i64, ts: i64) -> String {
    let delta = now - ts;

    if delta < 0 {
        return format_ts_short(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_short(ts)
    }
}

fn format_ts_short(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn relative_times() {
        let now = 1_700_000_000;
        assert_eq!(relative_to(now, now - 10), "just now");
        assert_eq!(relative_to(now, now - 60), "1 min ago");
        assert_eq!(relative_to(now, now - 7200), "2 hours ago");
        assert_eq!(relative_to(now, now - 86400 * 3), "3 days ago");
        assert_eq!(relative_to(now, now - 86400 * 60), format_ts_short(now - 86400 * 60));
    }
}
