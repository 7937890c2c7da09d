//! Minimum distance classifier
//!
//! Assigns each pixel to the class whose mean feature vector (centroid) is
//! nearest in Euclidean distance. Simple and fast but does not account for
//! class variance. Deterministic.

use serde::{Deserialize, Serialize};

use super::{Classifier, Model, TrainingData};
use landsight_core::{Error, Result};

/// Mean feature vector of one class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassSignature {
    /// Class label (output value)
    pub label: u8,
    /// Per-band mean of the class samples
    pub mean: Vec<f64>,
    /// Number of samples the mean was computed from
    pub samples: usize,
}

/// Nearest-centroid classifier configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MinimumDistance;

/// Trained nearest-centroid model
#[derive(Debug, Clone, PartialEq)]
pub struct MinimumDistanceModel {
    signatures: Vec<ClassSignature>,
}

impl MinimumDistanceModel {
    pub fn signatures(&self) -> &[ClassSignature] {
        &self.signatures
    }
}

impl Model for MinimumDistanceModel {
    fn predict(&self, features: &[f64]) -> u8 {
        let mut best_dist = f64::INFINITY;
        let mut best_label = 0;
        for sig in &self.signatures {
            let dist: f64 = sig
                .mean
                .iter()
                .zip(features)
                .map(|(m, v)| (v - m).powi(2))
                .sum();
            if dist < best_dist {
                best_dist = dist;
                best_label = sig.label;
            }
        }
        best_label
    }
}

/// Per-class centroids from training data, sorted by label
pub fn signatures_from_training(data: &TrainingData) -> Vec<ClassSignature> {
    let n = data.feature_count();
    let mut sums: std::collections::BTreeMap<u8, (Vec<f64>, usize)> = std::collections::BTreeMap::new();

    for (row, label) in data.features().iter().zip(data.labels()) {
        let entry = sums.entry(*label).or_insert_with(|| (vec![0.0; n], 0));
        for (acc, v) in entry.0.iter_mut().zip(row) {
            *acc += v;
        }
        entry.1 += 1;
    }

    sums.into_iter()
        .map(|(label, (sum, count))| ClassSignature {
            label,
            mean: sum.iter().map(|s| s / count as f64).collect(),
            samples: count,
        })
        .collect()
}

impl Classifier for MinimumDistance {
    type Model = MinimumDistanceModel;

    fn name(&self) -> &'static str {
        "minimum_distance"
    }

    fn fit(&self, data: &TrainingData) -> Result<MinimumDistanceModel> {
        let signatures = signatures_from_training(data);
        if signatures.len() < 2 {
            return Err(Error::Training(
                "minimum distance requires at least 2 classes".into(),
            ));
        }
        Ok(MinimumDistanceModel { signatures })
    }
}
