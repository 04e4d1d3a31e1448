//! Export stored rankings as JSON.
//!
//! Produces one object keyed by level (`repository`, `owner`,
//! `organization`), each holding its ranked rows, for use in spreadsheets
//! or downstream curation scripts.

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::path::Path;

use crate::config::Config;
use crate::rollup::Level;
use crate::store::{RepositoryStore, SqliteStore};

/// Build the export document for `levels` from `store`.
pub async fn export_value<S: RepositoryStore>(store: &S, levels: &[Level]) -> Result<Value> {
    let mut out = Map::new();
    for level in levels {
        let rows = store.load_rollup(*level).await?;
        out.insert(level.as_str().to_string(), serde_json::to_value(rows)?);
    }
    Ok(Value::Object(out))
}

/// Export rankings as JSON.
///
/// `level` of `None` exports every level. If `output` is `Some`, writes to
/// that file path. Otherwise writes to stdout for piping.
pub async fn run_export(config: &Config, output: Option<&Path>, level: Option<Level>) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let levels: Vec<Level> = match level {
        Some(level) => vec![level],
        None => Level::ALL.to_vec(),
    };

    let data = export_value(&store, &levels).await?;
    let row_count: usize = data
        .as_object()
        .map(|o| o.values().filter_map(Value::as_array).map(Vec::len).sum())
        .unwrap_or(0);
    let json = serde_json::to_string_pretty(&data)?;

    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, &json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!(
                "Exported {} ranked rows ({} level{}) to {}",
                row_count,
                levels.len(),
                if levels.len() == 1 { "" } else { "s" },
                path.display()
            );
        }
        None => {
            println!("{}", json);
        }
    }

    store.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rollup::{RollupRow, Rollups};
    use crate::store::InMemoryStore;

    #[tokio::test]
    async fn exports_selected_levels() {
        let store = InMemoryStore::new();
        store
            .save_rollups(&Rollups {
                organization: vec![RollupRow {
                    rank: 1,
                    id: String::new(),
                    login: Some(String::new()),
                    name: String::new(),
                    is_affiliated_with_known_entity: false,
                    score: 1.5,
                    repository_count: 2,
                }],
                ..Rollups::default()
            })
            .await
            .unwrap();

        let value = export_value(&store, &[Level::Organization]).await.unwrap();
        assert_eq!(value["organization"][0]["repository_count"], 2);
        assert_eq!(value["organization"][0]["login"], "");
        assert!(value.get("owner").is_none());

        let all = export_value(&store, &Level::ALL).await.unwrap();
        assert_eq!(all["repository"].as_array().unwrap().len(), 0);
    }
}
