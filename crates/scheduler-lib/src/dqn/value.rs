//! Value-function models
//!
//! The agent keeps two instances of the same model: the online one is fitted
//! on every learning step, the target one is a periodically synced copy.

use crate::error::ModelError;
use crate::models::{ClusterState, FEATURE_COUNT};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default gradient step size for the linear model
pub const DEFAULT_LEARNING_RATE: f32 = 0.01;

/// Trait for per-node value estimators
pub trait ValueFunction: Send + Sync {
    /// Predict one value per row of `state`
    fn predict(&self, state: &ClusterState) -> Result<Vec<f32>, ModelError>;

    /// Fit the model toward `targets`, one target vector per state
    ///
    /// A failed fit must leave the weights untouched.
    fn fit_batch(&mut self, states: &[&ClusterState], targets: &[Vec<f32>])
        -> Result<(), ModelError>;

    /// Overwrite this model's weights with `source`'s
    fn copy_weights_from(&mut self, source: &Self)
    where
        Self: Sized;

    /// Weight-version marker, bumped by every successful fit
    fn version(&self) -> u64;
}

/// Weights of the shared linear head
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LinearWeights {
    pub weights: [f32; FEATURE_COUNT],
    pub bias: f32,
}

impl LinearWeights {
    fn apply(&self, row: &[f32; FEATURE_COUNT]) -> f32 {
        self.weights
            .iter()
            .zip(row.iter())
            .map(|(w, x)| w * x)
            .sum::<f32>()
            + self.bias
    }
}

/// Linear value function shared across nodes: `q_i = w · x_i + b`
///
/// Rows are normalized column-wise per state before scoring, so the same
/// weights apply regardless of how many nodes a cycle offers.
#[derive(Debug, Clone)]
pub struct LinearValueFunction {
    params: LinearWeights,
    learning_rate: f32,
    version: u64,
}

impl LinearValueFunction {
    pub fn new(learning_rate: f32) -> Self {
        Self::with_weights(LinearWeights::default(), learning_rate)
    }

    pub fn with_weights(params: LinearWeights, learning_rate: f32) -> Self {
        Self {
            params,
            learning_rate,
            version: 0,
        }
    }

    pub fn weights(&self) -> &LinearWeights {
        &self.params
    }

    pub fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    fn checked_rows(state: &ClusterState) -> Result<Vec<[f32; FEATURE_COUNT]>, ModelError> {
        if state.is_empty() {
            return Err(ModelError::EmptyState);
        }
        let rows = state.normalized();
        for (row, values) in rows.iter().enumerate() {
            if let Some(column) = values.iter().position(|v| !v.is_finite()) {
                return Err(ModelError::NonFiniteFeature { row, column });
            }
        }
        Ok(rows)
    }
}

impl Default for LinearValueFunction {
    fn default() -> Self {
        Self::new(DEFAULT_LEARNING_RATE)
    }
}

impl ValueFunction for LinearValueFunction {
    fn predict(&self, state: &ClusterState) -> Result<Vec<f32>, ModelError> {
        let rows = Self::checked_rows(state)?;
        Ok(rows.iter().map(|row| self.params.apply(row)).collect())
    }

    fn fit_batch(
        &mut self,
        states: &[&ClusterState],
        targets: &[Vec<f32>],
    ) -> Result<(), ModelError> {
        if states.len() != targets.len() {
            return Err(ModelError::ShapeMismatch {
                expected: states.len(),
                actual: targets.len(),
            });
        }
        if states.is_empty() {
            return Err(ModelError::EmptyState);
        }

        let mut grad_w = [0.0f32; FEATURE_COUNT];
        let mut grad_b = 0.0f32;
        let mut count = 0usize;

        for (state, target) in states.iter().zip(targets) {
            let rows = Self::checked_rows(state)?;
            if rows.len() != target.len() {
                return Err(ModelError::ShapeMismatch {
                    expected: rows.len(),
                    actual: target.len(),
                });
            }
            for (row, t) in rows.iter().zip(target) {
                let err = self.params.apply(row) - t;
                for (g, x) in grad_w.iter_mut().zip(row.iter()) {
                    *g += err * x;
                }
                grad_b += err;
                count += 1;
            }
        }

        // d/dθ of mean squared error
        let step = 2.0 * self.learning_rate / count as f32;
        let mut next = self.params;
        for (w, g) in next.weights.iter_mut().zip(grad_w.iter()) {
            *w -= step * g;
        }
        next.bias -= step * grad_b;

        if next.weights.iter().any(|w| !w.is_finite()) || !next.bias.is_finite() {
            return Err(ModelError::Diverged);
        }

        self.params = next;
        self.version += 1;
        debug!(version = self.version, samples = count, "Value function fitted");
        Ok(())
    }

    fn copy_weights_from(&mut self, source: &Self) {
        self.params = source.params;
        self.version = source.version;
    }

    fn version(&self) -> u64 {
        self.version
    }
}
