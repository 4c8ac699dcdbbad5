use pulse_core::Category;
use serde::{Deserialize, Serialize};

use crate::encoder::SparseVector;
use crate::error::{ArtifactError, ModelError};

#[derive(Debug, Clone, Copy)]
pub struct LogisticOptions {
    /// Inverse L2 regularisation strength.
    pub c: f64,
    pub max_iter: usize,
    pub learning_rate: f64,
    pub tolerance: f64,
}

impl Default for LogisticOptions {
    fn default() -> Self {
        Self {
            c: 1.0,
            max_iter: 500,
            learning_rate: 1.0,
            tolerance: 1e-5,
        }
    }
}

/// Multinomial logistic regression over sparse features.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    classes: Vec<Category>,
    dims: usize,
    weights: Vec<Vec<f64>>,
    intercepts: Vec<f64>,
}

impl LogisticRegression {
    pub fn fit(
        rows: &[SparseVector],
        labels: &[Category],
        options: LogisticOptions,
    ) -> Result<Self, ArtifactError> {
        if rows.is_empty() || rows.len() != labels.len() {
            return Err(ArtifactError::EmptyCorpus);
        }

        let mut classes = labels.to_vec();
        classes.sort();
        classes.dedup();
        if classes.len() < 2 {
            return Err(ArtifactError::TooFewClasses(classes.len()));
        }

        let targets = labels
            .iter()
            .map(|label| classes.binary_search(label).unwrap_or_default())
            .collect::<Vec<_>>();

        let dims = rows[0].dims();
        let n = rows.len() as f64;
        let penalty = 1.0 / (options.c * n);

        let mut model = Self {
            weights: vec![vec![0.0; dims]; classes.len()],
            intercepts: vec![0.0; classes.len()],
            classes,
            dims,
        };

        for _ in 0..options.max_iter {
            let mut grad_w = model
                .weights
                .iter()
                .map(|row| row.iter().map(|w| w * penalty).collect::<Vec<_>>())
                .collect::<Vec<_>>();
            let mut grad_b = vec![0.0; model.classes.len()];

            for (row, target) in rows.iter().zip(&targets) {
                let probs = model.probabilities(row);
                for (class, prob) in probs.iter().enumerate() {
                    let residual = (prob - if class == *target { 1.0 } else { 0.0 }) / n;
                    grad_b[class] += residual;
                    for (index, value) in row.entries() {
                        grad_w[class][*index] += residual * value;
                    }
                }
            }

            let mut largest = 0.0_f64;
            for (class, grads) in grad_w.iter().enumerate() {
                for (index, grad) in grads.iter().enumerate() {
                    model.weights[class][index] -= options.learning_rate * grad;
                    largest = largest.max(grad.abs());
                }
                model.intercepts[class] -= options.learning_rate * grad_b[class];
                largest = largest.max(grad_b[class].abs());
            }

            if largest < options.tolerance {
                break;
            }
        }

        Ok(model)
    }

    pub fn classes(&self) -> &[Category] {
        &self.classes
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Class probabilities in [`Self::classes`] order.
    pub fn predict_proba(&self, row: &SparseVector) -> Result<Vec<f64>, ModelError> {
        if self.classes.is_empty() {
            return Err(ModelError::NoClasses);
        }
        if row.dims() != self.dims {
            return Err(ModelError::DimensionMismatch {
                expected: self.dims,
                found: row.dims(),
            });
        }

        let probs = self.probabilities(row);
        if probs.iter().any(|p| !p.is_finite()) {
            return Err(ModelError::NonFinite);
        }
        Ok(probs)
    }

    pub(crate) fn is_consistent(&self) -> bool {
        !self.classes.is_empty()
            && self.weights.len() == self.classes.len()
            && self.intercepts.len() == self.classes.len()
            && self.weights.iter().all(|row| row.len() == self.dims)
    }

    fn probabilities(&self, row: &SparseVector) -> Vec<f64> {
        let logits = self
            .weights
            .iter()
            .zip(&self.intercepts)
            .map(|(weights, bias)| row.dot(weights) + bias)
            .collect::<Vec<_>>();
        softmax(&logits)
    }
}

fn softmax(logits: &[f64]) -> Vec<f64> {
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps = logits.iter().map(|l| (l - max).exp()).collect::<Vec<_>>();
    let total = exps.iter().sum::<f64>();
    exps.into_iter().map(|e| e / total).collect()
}
