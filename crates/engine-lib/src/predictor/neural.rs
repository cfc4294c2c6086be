//! Feed-forward network predictor
//!
//! One tanh hidden layer and a sigmoid output, trained with full-batch
//! gradient descent on class-weighted cross entropy. Weights are
//! initialized deterministically so identical data gives identical models.

use super::features::NUM_FEATURES;
use super::math::{
    check_feature_vector, check_training_input, estimate_time_to_failure, margin_confidence,
    sigmoid, single_class_rate, trigger_metrics, Standardizer,
};
use super::{FallbackPredictor, Forecast, Predictor};
use crate::config::ModelKind;
use crate::models::FeatureVector;
use anyhow::{bail, Result};

const HIDDEN_UNITS: usize = 8;
const EPOCHS: usize = 200;
const LEARNING_RATE: f64 = 0.5;
const INIT_SCALE: f64 = 0.5;

#[derive(Debug, Clone)]
struct Network {
    scaler: Standardizer,
    hidden_weights: Vec<Vec<f64>>,
    hidden_bias: Vec<f64>,
    output_weights: Vec<f64>,
    output_bias: f64,
}

impl Network {
    fn initial(scaler: Standardizer) -> Self {
        let hidden_weights = (0..HIDDEN_UNITS)
            .map(|h| {
                (0..NUM_FEATURES)
                    .map(|j| {
                        let step = ((h * NUM_FEATURES + j) * 37 % 101) as f64 / 101.0;
                        (step - 0.5) * INIT_SCALE
                    })
                    .collect()
            })
            .collect();
        let output_weights = (0..HIDDEN_UNITS)
            .map(|h| ((h * 53 % 17) as f64 / 17.0 - 0.5) * INIT_SCALE)
            .collect();

        Self {
            scaler,
            hidden_weights,
            hidden_bias: vec![0.0; HIDDEN_UNITS],
            output_weights,
            output_bias: 0.0,
        }
    }

    fn forward(&self, inputs: &[f64]) -> (Vec<f64>, f64) {
        let hidden: Vec<f64> = self
            .hidden_weights
            .iter()
            .zip(&self.hidden_bias)
            .map(|(weights, bias)| {
                let z: f64 = weights.iter().zip(inputs).map(|(w, x)| w * x).sum();
                (z + bias).tanh()
            })
            .collect();
        let z: f64 = self
            .output_weights
            .iter()
            .zip(&hidden)
            .map(|(w, a)| w * a)
            .sum();
        (hidden, sigmoid(z + self.output_bias))
    }

    fn is_finite(&self) -> bool {
        self.output_bias.is_finite()
            && self.output_weights.iter().all(|w| w.is_finite())
            && self.hidden_bias.iter().all(|b| b.is_finite())
            && self
                .hidden_weights
                .iter()
                .all(|row| row.iter().all(|w| w.is_finite()))
    }
}

#[derive(Debug, Clone)]
enum Fitted {
    /// Single-class training set
    Constant(f64),
    Network(Network),
}

#[derive(Debug, Clone, Default)]
pub struct FeedForwardPredictor {
    fitted: Option<Fitted>,
}

impl FeedForwardPredictor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Predictor for FeedForwardPredictor {
    fn kind(&self) -> ModelKind {
        ModelKind::FeedForward
    }

    fn is_trained(&self) -> bool {
        self.fitted.is_some()
    }

    fn train(&mut self, features: &[FeatureVector], labels: &[u8]) -> Result<()> {
        let positives = check_training_input(features, labels)?;
        if let Some(rate) = single_class_rate(positives, labels.len()) {
            self.fitted = Some(Fitted::Constant(rate));
            return Ok(());
        }

        let n = labels.len() as f64;
        let positive_weight = n / (2.0 * positives as f64);
        let negative_weight = n / (2.0 * (labels.len() - positives) as f64);

        let scaler = Standardizer::fit(features);
        let inputs: Vec<Vec<f64>> = features.iter().map(|f| scaler.transform(f)).collect();
        let mut net = Network::initial(scaler);

        for _ in 0..EPOCHS {
            let mut grad_hidden = vec![vec![0.0; NUM_FEATURES]; HIDDEN_UNITS];
            let mut grad_hidden_bias = vec![0.0; HIDDEN_UNITS];
            let mut grad_output = vec![0.0; HIDDEN_UNITS];
            let mut grad_output_bias = 0.0;

            for (x, &y) in inputs.iter().zip(labels) {
                let (hidden, p) = net.forward(x);
                let weight = if y == 1 { positive_weight } else { negative_weight };
                let delta = (p - y as f64) * weight;

                grad_output_bias += delta;
                for h in 0..HIDDEN_UNITS {
                    grad_output[h] += delta * hidden[h];
                    let delta_hidden =
                        delta * net.output_weights[h] * (1.0 - hidden[h] * hidden[h]);
                    grad_hidden_bias[h] += delta_hidden;
                    for (g, xj) in grad_hidden[h].iter_mut().zip(x) {
                        *g += delta_hidden * xj;
                    }
                }
            }

            let step = LEARNING_RATE / n;
            net.output_bias -= step * grad_output_bias;
            for h in 0..HIDDEN_UNITS {
                net.output_weights[h] -= step * grad_output[h];
                net.hidden_bias[h] -= step * grad_hidden_bias[h];
                for (w, g) in net.hidden_weights[h].iter_mut().zip(&grad_hidden[h]) {
                    *w -= step * g;
                }
            }
        }

        if !net.is_finite() {
            bail!("Network weights diverged during training");
        }
        self.fitted = Some(Fitted::Network(net));
        Ok(())
    }

    fn predict(&self, features: &FeatureVector) -> Result<Forecast> {
        let fitted = match &self.fitted {
            Some(f) => f,
            None => return Ok(FallbackPredictor::predict(features)),
        };
        check_feature_vector(features)?;

        let probability = match fitted {
            Fitted::Constant(rate) => *rate,
            Fitted::Network(net) => net.forward(&net.scaler.transform(features)).1,
        };

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
