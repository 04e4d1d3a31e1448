//! Weighted relevance scoring.
//!
//! # Algorithm
//!
//! 1. Select exactly the features that carry a weight.
//! 2. Min-max normalize each selected feature to `[0, 1]` across the
//!    current dataset (scores are relative to the batch being scored).
//! 3. `score = Σ weight × normalized value`. Weights may be negative.
//!
//! A feature with zero range normalizes to `0.0` for every row. Missing
//! values are left out of the min/max and contribute `0.0`.

use anyhow::Result;
use serde::Serialize;

use crate::config::ScoringConfig;
use crate::features::{Feature, FeatureSet, FeaturedRecord};
use crate::models::RepositoryRecord;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureWeight {
    pub feature: Feature,
    pub weight: f64,
}

/// A repository with its features and relevance score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecord {
    pub record: RepositoryRecord,
    pub features: FeatureSet,
    pub score: f64,
}

impl ScoredRecord {
    /// Drop the score, e.g. to rescore under different weights.
    pub fn into_featured(self) -> FeaturedRecord {
        FeaturedRecord {
            record: self.record,
            features: self.features,
        }
    }
}

/// Per-feature contribution breakdown, printed by `score --explain`.
#[derive(Debug, Clone, Serialize)]
pub struct Contribution {
    pub feature: String,
    pub weight: f64,
    pub normalized: f64,
    pub contribution: f64,
}

pub struct Scorer {
    weights: Vec<FeatureWeight>,
}

impl Scorer {
    pub fn new(weights: Vec<FeatureWeight>) -> Self {
        Self { weights }
    }

    pub fn from_config(config: &ScoringConfig) -> Result<Self> {
        Ok(Self::new(config.feature_weights()?))
    }

    pub fn weights(&self) -> &[FeatureWeight] {
        &self.weights
    }

    /// One normalized column per weighted feature, in weight order.
    fn normalized_columns(&self, rows: &[FeaturedRecord]) -> Vec<Vec<f64>> {
        self.weights
            .iter()
            .map(|w| {
                let raw: Vec<Option<f64>> = rows.iter().map(|row| w.feature.value(row)).collect();
                normalize_column(&raw)
            })
            .collect()
    }

    /// Compute the score of every row, in row order.
    pub fn scores(&self, rows: &[FeaturedRecord]) -> Vec<f64> {
        let columns = self.normalized_columns(rows);
        (0..rows.len())
            .map(|i| {
                self.weights
                    .iter()
                    .zip(columns.iter())
                    .map(|(w, column)| w.weight * column[i])
                    .sum::<f64>()
            })
            .collect()
    }

    /// Score a dataset. Any previous score is discarded, not accumulated.
    pub fn score(&self, rows: Vec<FeaturedRecord>) -> Vec<ScoredRecord> {
        let scores = self.scores(&rows);
        rows.into_iter()
            .zip(scores)
            .map(|(row, score)| ScoredRecord {
                record: row.record,
                features: row.features,
                score,
            })
            .collect()
    }

    /// Contribution of each weighted feature to row `index`'s score.
    pub fn explain(&self, rows: &[FeaturedRecord], index: usize) -> Vec<Contribution> {
        let columns = self.normalized_columns(rows);
        self.weights
            .iter()
            .zip(columns.iter())
            .filter_map(|(w, column)| {
                column.get(index).map(|normalized| Contribution {
                    feature: w.feature.name().to_string(),
                    weight: w.weight,
                    normalized: *normalized,
                    contribution: w.weight * normalized,
                })
            })
            .collect()
    }
}

/// Min-max normalize a column to `[0.0, 1.0]`.
///
/// Missing values map to `0.0`. If the present values have zero range,
/// every value maps to `0.0`.
pub fn normalize_column(values: &[Option<f64>]) -> Vec<f64> {
    let present = values.iter().flatten().copied();
    let s_min = present.clone().fold(f64::INFINITY, f64::min);
    let s_max = present.fold(f64::NEG_INFINITY, f64::max);
    let range = s_max - s_min;

    values
        .iter()
        .map(|value| match value {
            Some(v) if range.is_finite() && range.abs() >= f64::EPSILON => (v - s_min) / range,
            _ => 0.0,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeaturesConfig;
    use crate::features::tests::record;
    use crate::features::FeatureEngine;
    use chrono::{TimeZone, Utc};

    fn featured(records: Vec<RepositoryRecord>) -> Vec<FeaturedRecord> {
        let config = FeaturesConfig {
            priority_languages: vec!["Python".to_string()],
            ..Default::default()
        };
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        FeatureEngine::new(&config, now).unwrap().apply(records)
    }

    fn weights(pairs: &[(Feature, f64)]) -> Vec<FeatureWeight> {
        pairs
            .iter()
            .map(|(feature, weight)| FeatureWeight {
                feature: *feature,
                weight: *weight,
            })
            .collect()
    }

    #[test]
    fn test_normalize_empty() {
        assert!(normalize_column(&[]).is_empty());
    }

    #[test]
    fn test_normalize_range() {
        let result = normalize_column(&[Some(10.0), Some(5.0), Some(0.0)]);
        assert!((result[0] - 1.0).abs() < 1e-9);
        assert!((result[1] - 0.5).abs() < 1e-9);
        assert!((result[2] - 0.0).abs() < 1e-9);
    }

    #[test]
    fn test_normalize_constant_is_zero() {
        let result = normalize_column(&[Some(3.0), Some(3.0), Some(3.0)]);
        assert!(result.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_normalize_missing_is_zero() {
        let result = normalize_column(&[Some(-5.0), None, Some(5.0)]);
        assert_eq!(result, vec![0.0, 0.0, 1.0]);
        let all_missing = normalize_column(&[None, None]);
        assert_eq!(all_missing, vec![0.0, 0.0]);
    }

    #[test]
    fn test_normalize_always_in_unit() {
        let result = normalize_column(&[Some(-5.0), Some(100.0), Some(42.0)]);
        for v in result {
            assert!((0.0..=1.0).contains(&v), "out of range: {}", v);
        }
    }

    #[test]
    fn stars_and_language_example() {
        let mut a = record(1, "a/a");
        a.star_count = 100;
        a.language = Some("Python".to_string());
        let mut b = record(2, "b/b");
        b.star_count = 10;
        b.language = Some("Go".to_string());

        let scorer = Scorer::new(weights(&[
            (Feature::StarCount, 10.0),
            (Feature::IsPriorityLanguage, 1.0),
        ]));
        let scored = scorer.score(featured(vec![a, b]));
        assert!((scored[0].score - 11.0).abs() < 1e-9);
        assert!(scored[1].score.abs() < 1e-9);
    }

    #[test]
    fn constant_feature_contributes_nothing() {
        let mut a = record(1, "a/a");
        a.star_count = 50;
        let mut b = record(2, "b/b");
        b.star_count = 50;
        let scorer = Scorer::new(weights(&[(Feature::StarCount, 7.0)]));
        let scored = scorer.score(featured(vec![a, b]));
        for row in &scored {
            assert_eq!(row.score, 0.0);
            assert!(!row.score.is_nan());
        }
    }

    #[test]
    fn negative_weight_penalizes() {
        let mut old = record(1, "a/a");
        old.created_at = Utc.with_ymd_and_hms(2010, 1, 1, 0, 0, 0).unwrap();
        let young = record(2, "b/b");
        let scorer = Scorer::new(weights(&[(Feature::YearsSinceCreation, -2.0)]));
        let scored = scorer.score(featured(vec![old, young]));
        assert!((scored[0].score + 2.0).abs() < 1e-9);
        assert_eq!(scored[1].score, 0.0);
    }

    #[test]
    fn unweighted_features_are_ignored() {
        let mut a = record(1, "a/a");
        a.fork_count = 1000;
        let b = record(2, "b/b");
        let scorer = Scorer::new(weights(&[(Feature::StarCount, 1.0)]));
        let scored = scorer.score(featured(vec![a, b]));
        assert!(scored.iter().all(|r| r.score == 0.0));
    }

    #[test]
    fn rescoring_replaces_previous_score() {
        let mut a = record(1, "a/a");
        a.star_count = 100;
        let b = record(2, "b/b");
        let scorer = Scorer::new(weights(&[(Feature::StarCount, 3.0)]));
        let first = scorer.score(featured(vec![a, b]));
        let again: Vec<FeaturedRecord> = first.into_iter().map(|r| r.into_featured()).collect();
        let second = scorer.score(again);
        assert!((second[0].score - 3.0).abs() < 1e-9);
    }

    #[test]
    fn missing_organization_counts_as_zero() {
        let mut a = record(1, "a/a");
        a.organization.organization_id = Some(9);
        a.organization.follower_count = Some(500);
        let mut b = record(2, "b/b");
        b.organization.organization_id = Some(10);
        b.organization.follower_count = Some(100);
        let c = record(3, "c/c");
        let scorer = Scorer::new(weights(&[(Feature::OrganizationFollowerCount, 1.0)]));
        let scores = scorer.scores(&featured(vec![a, b, c]));
        assert_eq!(scores, vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn explain_sums_to_score() {
        let mut a = record(1, "a/a");
        a.star_count = 100;
        a.language = Some("Python".to_string());
        let b = record(2, "b/b");
        let rows = featured(vec![a, b]);
        let scorer = Scorer::new(weights(&[
            (Feature::StarCount, 2.0),
            (Feature::IsPriorityLanguage, 0.5),
        ]));
        let total: f64 = scorer.explain(&rows, 0).iter().map(|c| c.contribution).sum();
        assert!((total - scorer.scores(&rows)[0]).abs() < 1e-9);
    }
}
