//! Per-cycle scheduling context
//!
//! A `CycleState` is created empty by the host for every pod it places,
//! filled by Pre-Score and read by Score and Normalize-Score. It is dropped
//! when the cycle ends; nothing in it survives into the next cycle.

use super::RAW_SCORE_SCALE;
use crate::error::SchedulerError;
use crate::models::ClusterState;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct Prepared {
    state: ClusterState,
    candidates: HashMap<String, usize>,
    prediction: Arc<[f32]>,
}

/// Typed context shared by the phases of one scheduling cycle
#[derive(Debug, Clone, Default)]
pub struct CycleState {
    prepared: Option<Prepared>,
}

impl CycleState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record what Pre-Score captured
    ///
    /// `nodes` is the candidate order the host passed in; the node at
    /// position `i` owns row `i` of `state` and entry `i` of `prediction`.
    pub(crate) fn prepare(&mut self, state: ClusterState, nodes: &[String], prediction: Vec<f32>) {
        let candidates = nodes
            .iter()
            .enumerate()
            .map(|(index, node)| (node.clone(), index))
            .collect();
        self.prepared = Some(Prepared {
            state,
            candidates,
            prediction: prediction.into(),
        });
    }

    /// True once Pre-Score has cached a prediction
    pub fn is_prepared(&self) -> bool {
        self.prepared.is_some()
    }

    /// Cluster state captured by Pre-Score
    pub fn state(&self) -> Option<&ClusterState> {
        self.prepared.as_ref().map(|p| &p.state)
    }

    pub fn prediction(&self) -> Option<Arc<[f32]>> {
        self.prepared.as_ref().map(|p| Arc::clone(&p.prediction))
    }

    /// Action index of `node` within this cycle
    pub fn candidate_index(&self, node: &str) -> Result<usize, SchedulerError> {
        let prepared = self.require_prepared()?;
        prepared
            .candidates
            .get(node)
            .copied()
            .ok_or_else(|| SchedulerError::UnknownNode(node.to_string()))
    }

    /// Fixed-point raw score of `node`
    pub fn raw_score(&self, node: &str) -> Result<i64, SchedulerError> {
        let index = self.candidate_index(node)?;
        let prepared = self.require_prepared()?;
        let value = prepared.prediction.get(index).copied().ok_or_else(|| {
            SchedulerError::MissingCycleState(format!(
                "prediction has no entry for node {} at index {}",
                node, index
            ))
        })?;
        Ok((value * RAW_SCORE_SCALE).round() as i64)
    }

    fn require_prepared(&self) -> Result<&Prepared, SchedulerError> {
        self.prepared.as_ref().ok_or_else(|| {
            SchedulerError::MissingCycleState("no prediction cached by Pre-Score".to_string())
        })
    }
}
