use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::{TimeZone, Utc};
use tempfile::TempDir;

use repo_sourcing::config::load_config;
use repo_sourcing::models::{OrganizationRecord, OwnerRecord, RepositoryRecord};
use repo_sourcing::store::{RepositoryStore, SqliteStore};

fn sourcing_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("sourcing");
    path
}

fn write_config(root: &Path, extra: &str) -> PathBuf {
    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    // Port 9 (discard) on localhost: nothing answers, so requests fail fast.
    let config_content = format!(
        r#"[db]
path = "{}/data/sourcing.sqlite"

[github]
api_url = "http://127.0.0.1:9"
timeout_secs = 5

[[taxonomy]]
category = "privacy"
queries = ["privacy", "data privacy"]

[[taxonomy]]
category = "fairness"
queries = ["fairness"]

[features]
known_entities = ["Microsoft"]
priority_languages = ["Python"]
keywords = ["machine learning"]
min_stars = 20

{}
"#,
        root.display(),
        extra
    );

    let config_path = config_dir.join("sourcing.toml");
    fs::write(&config_path, config_content).unwrap();
    config_path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let config_path = write_config(
        tmp.path(),
        "[scoring.weights]\nstar_count = 10.0\nis_priority_language = 1.0\n",
    );
    (tmp, config_path)
}

fn run_sourcing(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = sourcing_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .arg("--progress")
        .arg("off")
        .args(args)
        .env_remove("GITHUB_TOKEN")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run sourcing binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn repository(id: i64, owner: &str, stars: i64, language: Option<&str>) -> RepositoryRecord {
    RepositoryRecord {
        repository_id: id,
        full_name: format!("{}/repo-{}", owner, id),
        description: Some("machine learning toolkit".to_string()),
        topics: vec!["ml".to_string()],
        star_count: stars,
        watcher_count: stars,
        fork_count: 1,
        open_issue_count: 0,
        size: 10,
        language: language.map(str::to_string),
        visibility: Some("public".to_string()),
        has_projects: true,
        has_wiki: true,
        has_downloads: true,
        created_at: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
        last_modified_at: Some(Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap()),
        owner: OwnerRecord {
            owner_id: owner.len() as i64,
            name: None,
            login: owner.to_string(),
            owner_type: "User".to_string(),
            company: None,
            location: None,
            bio: None,
            follower_count: 3,
            public_repo_count: 2,
            created_at: None,
        },
        organization: OrganizationRecord::default(),
        category: "privacy".to_string(),
        query: "privacy".to_string(),
    }
}

/// Seed the database through the library so `score` has rows to rank.
fn seed(config_path: &Path, records: Vec<RepositoryRecord>) {
    let config = load_config(config_path).unwrap();
    let runtime = tokio::runtime::Runtime::new().unwrap();
    runtime.block_on(async {
        let store = SqliteStore::open(&config).await.unwrap();
        store.save(&records).await.unwrap();
        store.close().await;
    });
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_sourcing(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data").join("sourcing.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_sourcing(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_sourcing(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_sourcing(&tmp.path().join("nope.toml"), &["init"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

#[test]
fn test_unknown_weight_fails() {
    let tmp = TempDir::new().unwrap();
    let config_path = write_config(tmp.path(), "[scoring.weights]\nstargazers = 1.0\n");
    let (_, stderr, success) = run_sourcing(&config_path, &["init"]);
    assert!(!success);
    assert!(stderr.contains("stargazers"), "stderr: {}", stderr);
}

#[test]
fn test_collect_unreachable_api_stops_early() {
    let (_tmp, config_path) = setup_test_env();
    run_sourcing(&config_path, &["init"]);

    let (stdout, stderr, success) = run_sourcing(&config_path, &["collect"]);
    assert!(success, "collect should exit 0: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("stopped early at privacy / 'privacy'"), "stdout: {}", stdout);
    assert!(stdout.contains("new repositories: 0"));
    assert!(stdout.contains("partial"));
    assert!(stderr.contains("GITHUB_TOKEN not set"));
}

#[test]
fn test_collect_unknown_category_fails() {
    let (_tmp, config_path) = setup_test_env();
    let (_, stderr, success) = run_sourcing(&config_path, &["collect", "--category", "ethics"]);
    assert!(!success);
    assert!(stderr.contains("Unknown taxonomy category"));
}

#[test]
fn test_score_ranks_seeded_rows() {
    let (_tmp, config_path) = setup_test_env();
    run_sourcing(&config_path, &["init"]);
    seed(
        &config_path,
        vec![
            repository(1, "bob", 10, Some("Go")),
            repository(2, "microsoft", 100, Some("Python")),
        ],
    );

    let (stdout, stderr, success) = run_sourcing(&config_path, &["score", "--top", "5"]);
    assert!(success, "score failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Top 2 by repository"));
    let first_row = stdout
        .lines()
        .find(|l| l.contains("microsoft/repo-2"))
        .expect("top repository printed");
    assert!(first_row.contains("11.0000"), "row: {}", first_row);
    assert!(stdout.contains("Saved rankings for 2 repositories."));
}

#[test]
fn test_score_without_weights_fails() {
    let tmp = TempDir::new().unwrap();
    let config_path = write_config(tmp.path(), "");
    let (_, stderr, success) = run_sourcing(&config_path, &["score"]);
    assert!(!success);
    assert!(stderr.contains("No scoring weights configured"));
}

#[test]
fn test_export_after_score() {
    let (tmp, config_path) = setup_test_env();
    run_sourcing(&config_path, &["init"]);
    seed(
        &config_path,
        vec![
            repository(1, "acme", 50, Some("Python")),
            repository(2, "acme", 5, None),
            repository(3, "zed", 1, None),
        ],
    );
    run_sourcing(&config_path, &["score"]);

    let out = tmp.path().join("out").join("owners.json");
    let (_, stderr, success) = run_sourcing(
        &config_path,
        &["export", "--level", "owner", "--output", out.to_str().unwrap()],
    );
    assert!(success, "export failed: {}", stderr);

    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
    let owners = json["owner"].as_array().unwrap();
    assert_eq!(owners.len(), 2);
    assert_eq!(owners[0]["login"], "acme");
    assert_eq!(owners[0]["repository_count"], 2);
    assert_eq!(owners[0]["rank"], 1);
    assert!(json.get("repository").is_none());
}

#[test]
fn test_export_unknown_level_fails() {
    let (_tmp, config_path) = setup_test_env();
    let (_, stderr, success) = run_sourcing(&config_path, &["export", "--level", "team"]);
    assert!(!success);
    assert!(stderr.contains("Unknown level"));
}

#[test]
fn test_stats_reports_counts() {
    let (_tmp, config_path) = setup_test_env();
    run_sourcing(&config_path, &["init"]);
    seed(
        &config_path,
        vec![
            repository(1, "acme", 50, Some("Python")),
            repository(2, "zed", 5, None),
        ],
    );

    let (stdout, stderr, success) = run_sourcing(&config_path, &["stats"]);
    assert!(success, "stats failed: {}", stderr);
    assert!(stdout.contains("Repositories:  2"));
    assert!(stdout.contains("privacy"));
    assert!(stdout.contains("(none)"));
}

#[test]
fn test_completions_without_config() {
    let tmp = TempDir::new().unwrap();
    let (stdout, _, success) = run_sourcing(&tmp.path().join("missing.toml"), &["completions", "bash"]);
    assert!(success);
    assert!(stdout.contains("sourcing"));
}
