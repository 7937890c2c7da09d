//! Random forest classifier
//!
//! An ensemble of CART trees grown on bootstrap samples with a random
//! feature subset per split (Gini impurity). Prediction is a majority vote;
//! ties go to the lowest label.
//!
//! Training is stochastic. With `seed: Some(_)` the forest is fully
//! reproducible; with `seed: None` the generator is seeded from the OS and
//! two runs on the same data may disagree.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Classifier, Model, TrainingData};
use crate::maybe_rayon::*;
use landsight_core::{Error, Result};

/// Random forest hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomForest {
    /// Number of trees
    pub trees: usize,
    /// Maximum tree depth
    pub max_depth: usize,
    /// Smallest node that may still be split
    pub min_samples_split: usize,
    /// Features tried per split; `None` means `sqrt(features)`
    pub features_per_split: Option<usize>,
    /// Seed for bootstrap and feature sampling
    pub seed: Option<u64>,
}

impl Default for RandomForest {
    fn default() -> Self {
        Self {
            trees: 50,
            max_depth: 16,
            min_samples_split: 2,
            features_per_split: None,
            seed: None,
        }
    }
}

impl RandomForest {
    pub fn with_trees(mut self, trees: usize) -> Self {
        self.trees = trees;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Leaf(u8),
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// One CART tree stored as a flat node list; index 0 is the root
#[derive(Debug, Clone, PartialEq)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn predict(&self, features: &[f64]) -> u8 {
        let mut i = 0;
        loop {
            match &self.nodes[i] {
                Node::Leaf(label) => return *label,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let v = features.get(*feature).copied().unwrap_or(f64::NAN);
                    i = if v <= *threshold { *left } else { *right };
                }
            }
        }
    }
}

/// A trained forest
#[derive(Debug, Clone, PartialEq)]
pub struct RandomForestModel {
    trees: Vec<Tree>,
    class_count: usize,
}

impl RandomForestModel {
    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }
}

impl Model for RandomForestModel {
    fn predict(&self, features: &[f64]) -> u8 {
        let mut votes = vec![0usize; self.class_count];
        for tree in &self.trees {
            let label = tree.predict(features) as usize;
            if label < votes.len() {
                votes[label] += 1;
            }
        }
        // first maximum: ties resolve to the lowest label
        let mut best = 0;
        for (label, count) in votes.iter().enumerate() {
            if *count > votes[best] {
                best = label;
            }
        }
        best as u8
    }
}

impl Classifier for RandomForest {
    type Model = RandomForestModel;

    fn name(&self) -> &'static str {
        "random_forest"
    }

    fn fit(&self, data: &TrainingData) -> Result<RandomForestModel> {
        if self.trees == 0 {
            return Err(Error::InvalidParameter {
                name: "trees",
                value: "0".into(),
                reason: "forest needs at least one tree".into(),
            });
        }
        if data.is_empty() {
            return Err(Error::Training("no training samples".into()));
        }
        if data.feature_count() == 0 {
            return Err(Error::Training("no input features".into()));
        }

        let n_features = data.feature_count();
        let mtry = self
            .features_per_split
            .unwrap_or_else(|| (n_features as f64).sqrt().round() as usize)
            .clamp(1, n_features.max(1));
        let class_count = data.labels().iter().copied().max().map_or(0, |m| m as usize + 1);

        // per-tree seeds drawn up front so parallel growth stays deterministic
        let mut master = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let seeds: Vec<u64> = (0..self.trees).map(|_| master.gen()).collect();

        let trees: Vec<Tree> = seeds
            .into_par_iter()
            .map(|seed| {
                let mut rng = StdRng::seed_from_u64(seed);
                let n = data.len();
                let sample: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                let mut builder = TreeBuilder {
                    data,
                    params: self,
                    mtry,
                    class_count,
                    rng,
                    nodes: Vec::new(),
                };
                builder.grow(sample, 0);
                Tree {
                    nodes: builder.nodes,
                }
            })
            .collect();

        debug!(
            "random forest: {} trees, {} features, mtry {}",
            trees.len(),
            n_features,
            mtry
        );
        Ok(RandomForestModel { trees, class_count })
    }
}

struct TreeBuilder<'a> {
    data: &'a TrainingData,
    params: &'a RandomForest,
    mtry: usize,
    class_count: usize,
    rng: StdRng,
    nodes: Vec<Node>,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    impurity: f64,
}

impl TreeBuilder<'_> {
    /// Grow a subtree over `samples` and return its node index
    fn grow(&mut self, samples: Vec<usize>, depth: usize) -> usize {
        let counts = self.class_counts(&samples);
        let majority = majority(&counts);
        let pure = counts.iter().filter(|c| **c > 0).count() <= 1;

        if pure || depth >= self.params.max_depth || samples.len() < self.params.min_samples_split {
            return self.push(Node::Leaf(majority));
        }

        let parent = gini(&counts, samples.len());
        let split = match self.best_split(&samples) {
            Some(s) if s.impurity < parent => s,
            _ => return self.push(Node::Leaf(majority)),
        };

        let data = self.data;
        let features = data.features();
        let (left, right): (Vec<usize>, Vec<usize>) = samples
            .into_iter()
            .partition(|&i| features[i][split.feature] <= split.threshold);

        // reserve this node, then fill in children
        let index = self.push(Node::Leaf(majority));
        let l = self.grow(left, depth + 1);
        let r = self.grow(right, depth + 1);
        self.nodes[index] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left: l,
            right: r,
        };
        index
    }

    fn push(&mut self, node: Node) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    fn class_counts(&self, samples: &[usize]) -> Vec<usize> {
        let labels = self.data.labels();
        let mut counts = vec![0usize; self.class_count];
        for &i in samples {
            counts[labels[i] as usize] += 1;
        }
        counts
    }

    fn best_split(&mut self, samples: &[usize]) -> Option<BestSplit> {
        let data = self.data;
        let n_features = data.feature_count();
        let candidates = rand::seq::index::sample(&mut self.rng, n_features, self.mtry).into_vec();
        let features = data.features();
        let labels = data.labels();
        let n = samples.len();

        let mut best: Option<BestSplit> = None;
        let mut order = samples.to_vec();

        for feature in candidates {
            order.sort_by(|a, b| features[*a][feature].total_cmp(&features[*b][feature]));

            let mut left = vec![0usize; self.class_count];
            let mut right = self.class_counts(&order);

            for k in 0..n - 1 {
                let label = labels[order[k]] as usize;
                left[label] += 1;
                right[label] -= 1;

                let v = features[order[k]][feature];
                let next = features[order[k + 1]][feature];
                if next <= v {
                    continue;
                }

                let nl = k + 1;
                let nr = n - nl;
                let impurity = (nl as f64 * gini(&left, nl) + nr as f64 * gini(&right, nr)) / n as f64;
                if best.as_ref().map_or(true, |b| impurity < b.impurity) {
                    best = Some(BestSplit {
                        feature,
                        threshold: (v + next) / 2.0,
                        impurity,
                    });
                }
            }
        }
        best
    }
}

fn gini(counts: &[usize], total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let t = total as f64;
    1.0 - counts.iter().map(|c| (*c as f64 / t).powi(2)).sum::<f64>()
}

fn majority(counts: &[usize]) -> u8 {
    let mut best = 0;
    for (label, count) in counts.iter().enumerate() {
        if *count > counts[best] {
            best = label;
        }
    }
    best as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_band_classes() -> TrainingData {
        let mut features = Vec::new();
        let mut labels = Vec::new();
        for i in 0..10 {
            let j = i as f64 * 0.01;
            features.push(vec![0.1 + j, 0.8 - j]);
            labels.push(0);
            features.push(vec![0.5 + j, 0.5 + j]);
            labels.push(1);
            features.push(vec![0.9 - j, 0.1 + j]);
            labels.push(2);
        }
        TrainingData::new(vec!["a".into(), "b".into()], features, labels).unwrap()
    }

    #[test]
    fn test_forest_separates_classes() {
        let model = RandomForest::default().with_trees(20).with_seed(7).fit(&two_band_classes()).unwrap();
        assert_eq!(model.tree_count(), 20);
        assert_eq!(model.predict(&[0.12, 0.78]), 0);
        assert_eq!(model.predict(&[0.52, 0.53]), 1);
        assert_eq!(model.predict(&[0.88, 0.12]), 2);
    }

    #[test]
    fn test_seeded_forest_is_reproducible() {
        let rf = RandomForest::default().with_trees(10).with_seed(42);
        let a = rf.fit(&two_band_classes()).unwrap();
        let b = rf.fit(&two_band_classes()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_zero_trees_rejected() {
        assert!(RandomForest::default().with_trees(0).fit(&two_band_classes()).is_err());
    }

    #[test]
    fn test_gini() {
        assert!((gini(&[5, 5], 10) - 0.5).abs() < 1e-12);
        assert_eq!(gini(&[4, 0], 4), 0.0);
    }
}
