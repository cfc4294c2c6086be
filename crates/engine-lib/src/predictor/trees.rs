//! Tree-based predictors
//!
//! `TreeEnsemblePredictor` averages shallow regression trees grown on
//! deterministic row and feature subsets. `GradientBoostedPredictor` adds
//! shallow trees fitted to logistic-loss gradients. Both share the same
//! variance-reduction tree builder.

use super::features::NUM_FEATURES;
use super::math::{
    check_feature_vector, check_training_input, estimate_time_to_failure, margin_confidence,
    sigmoid, single_class_rate, trigger_metrics,
};
use super::{FallbackPredictor, Forecast, Predictor};
use crate::config::ModelKind;
use crate::models::FeatureVector;
use anyhow::Result;

const FOREST_TREES: usize = 25;
const FOREST_MAX_DEPTH: usize = 3;
const BOOSTING_ROUNDS: usize = 40;
const BOOSTING_MAX_DEPTH: usize = 2;
const LEARNING_RATE: f64 = 0.3;
const MIN_LEAF: usize = 5;

/// Newton leaf values are clipped to keep single rounds from dominating
const MAX_LEAF_STEP: f64 = 4.0;

#[derive(Debug, Clone)]
enum Node {
    Leaf(f64),
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn evaluate(&self, values: &[f64]) -> f64 {
        let mut node = self;
        loop {
            match node {
                Node::Leaf(value) => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if values[*feature] <= *threshold {
                        left
                    } else {
                        right
                    };
                }
            }
        }
    }
}

struct TreeBuilder<'a, L: Fn(&[usize]) -> f64> {
    rows: &'a [FeatureVector],
    targets: &'a [f64],
    features: &'a [usize],
    max_depth: usize,
    leaf_value: L,
}

impl<'a, L: Fn(&[usize]) -> f64> TreeBuilder<'a, L> {
    fn build(&self, indices: &[usize], depth: usize) -> Node {
        if depth >= self.max_depth || indices.len() < 2 * MIN_LEAF {
            return Node::Leaf((self.leaf_value)(indices));
        }
        match self.best_split(indices) {
            Some((feature, threshold)) => {
                let (left, right): (Vec<usize>, Vec<usize>) = indices
                    .iter()
                    .copied()
                    .partition(|&i| self.rows[i].values[feature] <= threshold);
                Node::Split {
                    feature,
                    threshold,
                    left: Box::new(self.build(&left, depth + 1)),
                    right: Box::new(self.build(&right, depth + 1)),
                }
            }
            None => Node::Leaf((self.leaf_value)(indices)),
        }
    }

    /// Split minimizing the summed squared error of the two children
    fn best_split(&self, indices: &[usize]) -> Option<(usize, f64)> {
        let n = indices.len();
        let total: f64 = indices.iter().map(|&i| self.targets[i]).sum();
        let total_sq: f64 = indices.iter().map(|&i| self.targets[i].powi(2)).sum();
        let parent_sse = total_sq - total * total / n as f64;

        let mut best: Option<(f64, usize, f64)> = None;
        for &feature in self.features {
            let mut pairs: Vec<(f64, f64)> = indices
                .iter()
                .map(|&i| (self.rows[i].values[feature], self.targets[i]))
                .collect();
            pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut sum_left = 0.0;
            let mut sq_left = 0.0;
            for k in 1..n {
                let (value, target) = pairs[k - 1];
                sum_left += target;
                sq_left += target * target;

                if k < MIN_LEAF || n - k < MIN_LEAF {
                    continue;
                }
                let next = pairs[k].0;
                if next <= value {
                    continue;
                }

                let n_left = k as f64;
                let n_right = (n - k) as f64;
                let sum_right = total - sum_left;
                let sq_right = total_sq - sq_left;
                let sse = (sq_left - sum_left * sum_left / n_left)
                    + (sq_right - sum_right * sum_right / n_right);

                if best.map_or(true, |(b, _, _)| sse < b) {
                    best = Some((sse, feature, (value + next) / 2.0));
                }
            }
        }

        best.filter(|(sse, _, _)| *sse < parent_sse - 1e-12)
            .map(|(_, feature, threshold)| (feature, threshold))
    }
}

/// Bagged regression trees over deterministic subsets
#[derive(Debug, Clone, Default)]
pub struct TreeEnsemblePredictor {
    trees: Vec<Node>,
}

impl TreeEnsemblePredictor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows and features used by tree `t`, roughly 80% and 75% respectively
    fn subsets(t: usize, rows: usize) -> (Vec<usize>, Vec<usize>) {
        let mut row_subset: Vec<usize> = (0..rows).filter(|i| (i * 7 + t * 11) % 5 != 0).collect();
        if row_subset.len() < 2 * MIN_LEAF {
            row_subset = (0..rows).collect();
        }
        let feature_subset = (0..NUM_FEATURES)
            .filter(|j| (j * 5 + t * 3) % 4 != 0)
            .collect();
        (row_subset, feature_subset)
    }
}

impl Predictor for TreeEnsemblePredictor {
    fn kind(&self) -> ModelKind {
        ModelKind::TreeEnsemble
    }

    fn is_trained(&self) -> bool {
        !self.trees.is_empty()
    }

    fn train(&mut self, features: &[FeatureVector], labels: &[u8]) -> Result<()> {
        let positives = check_training_input(features, labels)?;
        if let Some(rate) = single_class_rate(positives, labels.len()) {
            self.trees = vec![Node::Leaf(rate)];
            return Ok(());
        }

        let targets: Vec<f64> = labels.iter().map(|&l| l as f64).collect();
        let positive_rate = |indices: &[usize]| {
            let positives: f64 = indices.iter().map(|&i| targets[i]).sum();
            (positives + 1.0) / (indices.len() as f64 + 2.0)
        };

        let trees = (0..FOREST_TREES)
            .map(|t| {
                let (rows, feature_subset) = Self::subsets(t, features.len());
                TreeBuilder {
                    rows: features,
                    targets: &targets,
                    features: &feature_subset,
                    max_depth: FOREST_MAX_DEPTH,
                    leaf_value: positive_rate,
                }
                .build(&rows, 0)
            })
            .collect();

        self.trees = trees;
        Ok(())
    }

    fn predict(&self, features: &FeatureVector) -> Result<Forecast> {
        if self.trees.is_empty() {
            return Ok(FallbackPredictor::predict(features));
        }
        check_feature_vector(features)?;

        let votes: f64 = self
            .trees
            .iter()
            .map(|tree| tree.evaluate(&features.values))
            .sum();
        let probability = (votes / self.trees.len() as f64).clamp(0.0, 1.0);

        Ok(Forecast {
            probability,
            time_to_failure: estimate_time_to_failure(probability, features),
            confidence: margin_confidence(probability),
            trigger_metrics: trigger_metrics(features),
        })
    }

    fn fork(&self) -> Box<dyn Predictor> {
        Box::new(self.clone())
    }
}

#[derive(Debug, Clone)]
struct BoostedModel {
    base_score: f64,
    trees: Vec<Node>,
}

/// Additive trees fitted to logistic-loss gradients with Newton leaves
#[derive(Debug, Clone, Default)]
pub struct GradientBoostedPredictor {
    model: Option<BoostedModel>,
}

impl GradientBoostedPredictor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Predictor for GradientBoostedPredictor {
    fn kind(&self) -> ModelKind {
        ModelKind::GradientBoosted
    }

    fn is_trained(&self) -> bool {
        self.model.is_some()
    }

    fn train(&mut self, features: &[FeatureVector], labels: &[u8]) -> Result<()> {
        let positives = check_training_input(features, labels)?;
        let n = labels.len();
        if let Some(rate) = single_class_rate(positives, n) {
            self.model = Some(BoostedModel {
                base_score: (rate / (1.0 - rate)).ln(),
                trees: Vec::new(),
            });
            return Ok(());
        }

        let base_rate = positives as f64 / n as f64;
        let base_score = (base_rate / (1.0 - base_rate)).ln();
        let all_rows: Vec<usize> = (0..n).collect();
        let all_features: Vec<usize> = (0..NUM_FEATURES).collect();

        let mut scores = vec![base_score; n];
        let mut trees = Vec::with_capacity(BOOSTING_ROUNDS);
        for _ in 0..BOOSTING_ROUNDS {
            let probs: Vec<f64> = scores.iter().map(|s| sigmoid(*s)).collect();
            let gradients: Vec<f64> = labels
                .iter()
                .zip(&probs)
                .map(|(&y, p)| y as f64 - p)
                .collect();
            let hessians: Vec<f64> = probs.iter().map(|p| p * (1.0 - p)).collect();

            let newton_step = |indices: &[usize]| {
                let g: f64 = indices.iter().map(|&i| gradients[i]).sum();
                let h: f64 = indices.iter().map(|&i| hessians[i]).sum();
                (g / (h + 1e-6)).clamp(-MAX_LEAF_STEP, MAX_LEAF_STEP)
            };

            let tree = TreeBuilder {
                rows: features,
                targets: &gradients,
                features: &all_features,
                max_depth: BOOSTING_MAX_DEPTH,
                leaf_value: newton_step,
            }
            .build(&all_rows, 0);

            for (score, row) in scores.iter_mut().zip(features) {
                *score += LEARNING_RATE * tree.evaluate(&row.values);
            }
            trees.push(tree);
        }

        self.model = Some(BoostedModel { base_score, trees });
        Ok(())
    }

    fn predict(&self, features: &FeatureVector) -> Result<Forecast> {
        let model = match &self.model {
            Some(m) => m,
            None => return Ok(FallbackPredictor::predict(features)),
        };
        check_feature_vector(features)?;

        let score = model.base_score
            + model
                .trees
                .iter()
                .map(|tree| LEARNING_RATE * tree.evaluate(&features.values))
                .sum::<f64>();
        let probability = sigmoid(score);

        Ok(Forecast {
            probability,
            time_to_failure: estimate_time_to_failure(probability, features),
            confidence: margin_confidence(probability),
            trigger_metrics: trigger_metrics(features),
        })
    }

    fn fork(&self) -> Box<dyn Predictor> {
        Box::new(self.clone())
    }
}
