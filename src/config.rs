use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use crate::features::Feature;
use crate::models::TaxonomyCategory;
use crate::score::FeatureWeight;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub github: GithubConfig,
    #[serde(default)]
    pub collection: CollectionConfig,
    #[serde(default)]
    pub taxonomy: Vec<TaxonomyCategory>,
    #[serde(default)]
    pub features: FeaturesConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GithubConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            timeout_secs: default_timeout_secs(),
            per_page: default_per_page(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_per_page() -> u32 {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct CollectionConfig {
    /// Ceiling on queries issued per category; `None` issues all of them.
    #[serde(default)]
    pub max_queries_per_category: Option<usize>,
    /// Ceiling on candidates examined per query.
    #[serde(default = "default_max_candidates")]
    pub max_candidates_per_query: usize,
    /// Appended to every query, e.g. to search readmes and descriptions.
    #[serde(default = "default_scope_modifiers")]
    pub scope_modifiers: Vec<String>,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            max_queries_per_category: None,
            max_candidates_per_query: default_max_candidates(),
            scope_modifiers: default_scope_modifiers(),
        }
    }
}

fn default_max_candidates() -> usize {
    250
}
fn default_scope_modifiers() -> Vec<String> {
    vec!["in:readme".to_string(), "in:description".to_string()]
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct FeaturesConfig {
    #[serde(default)]
    pub known_entities: Vec<String>,
    #[serde(default)]
    pub priority_languages: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub min_stars: i64,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ScoringConfig {
    /// Feature name to signed weight.
    #[serde(default)]
    pub weights: BTreeMap<String, f64>,
}

impl ScoringConfig {
    /// Resolve weight keys to features, rejecting unknown names.
    pub fn feature_weights(&self) -> Result<Vec<FeatureWeight>> {
        self.weights
            .iter()
            .map(|(name, weight)| {
                let feature: Feature = name.parse()?;
                if !weight.is_finite() {
                    anyhow::bail!("scoring.weights.{} must be a finite number", name);
                }
                Ok(FeatureWeight {
                    feature,
                    weight: *weight,
                })
            })
            .collect()
    }
}

impl Config {
    /// Taxonomy restricted to one category, or the whole taxonomy.
    pub fn taxonomy_for(&self, category: Option<&str>) -> Result<Vec<TaxonomyCategory>> {
        match category {
            None => Ok(self.taxonomy.clone()),
            Some(name) => {
                let selected: Vec<TaxonomyCategory> = self
                    .taxonomy
                    .iter()
                    .filter(|c| c.category == name)
                    .cloned()
                    .collect();
                if selected.is_empty() {
                    let available: Vec<&str> =
                        self.taxonomy.iter().map(|c| c.category.as_str()).collect();
                    anyhow::bail!(
                        "Unknown taxonomy category: '{}'. Available: {}",
                        name,
                        available.join(", ")
                    );
                }
                Ok(selected)
            }
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Validate github
    if config.github.per_page == 0 || config.github.per_page > 100 {
        anyhow::bail!("github.per_page must be in [1, 100]");
    }
    if config.github.timeout_secs == 0 {
        anyhow::bail!("github.timeout_secs must be > 0");
    }

    // Validate collection
    if config.collection.max_candidates_per_query == 0 {
        anyhow::bail!("collection.max_candidates_per_query must be > 0");
    }
    if config.collection.max_queries_per_category == Some(0) {
        anyhow::bail!("collection.max_queries_per_category must be > 0 when set");
    }

    // Validate taxonomy
    let mut seen = HashSet::new();
    for entry in &config.taxonomy {
        if entry.category.trim().is_empty() {
            anyhow::bail!("taxonomy category names must not be empty");
        }
        if !seen.insert(entry.category.as_str()) {
            anyhow::bail!("duplicate taxonomy category: '{}'", entry.category);
        }
        if entry.queries.iter().any(|q| q.trim().is_empty()) {
            anyhow::bail!("taxonomy '{}' contains an empty query", entry.category);
        }
    }

    // Validate scoring
    config
        .scoring
        .feature_weights()
        .with_context(|| "Invalid scoring.weights")?;

    Ok(())
}
