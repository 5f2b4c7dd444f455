//! Scheduling decision protocol
//!
//! One pod placement is one cycle of three ordered phases:
//!
//! 1. **Pre-Score** queries the cluster state, completes and learns from the
//!    previous decision, and caches a per-node prediction in the cycle.
//! 2. **Score** reads a node's raw score from the cached prediction. It is a
//!    pure read and may run concurrently for every candidate.
//! 3. **Normalize-Score** picks the node (epsilon-greedy), records the reward
//!    and the pending decision, and rescales all scores into the host range.

mod cycle;
mod drl;

pub use cycle::CycleState;
pub use drl::{
    DecisionConfig, DrlScheduler, DrlSchedulerBuilder, PendingDecision, SchedulerStats,
    ScoreNormalization, DEFAULT_EXPLORATION_BONUS,
};

use crate::dqn::LearnOutcome;
use crate::error::SchedulerError;
use crate::models::{NodeScore, PodInfo};
use async_trait::async_trait;
use serde::Serialize;

/// Name the plugin registers under
pub const PLUGIN_NAME: &str = "DRLScheduler";

/// Fixed-point factor between predicted values and raw integer scores
pub const RAW_SCORE_SCALE: f32 = 1000.0;

/// Result of the Pre-Score phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreScoreOutcome {
    /// No candidate nodes; nothing was queried or changed
    Skipped,
    Predicted {
        nodes: usize,
        /// Learning step run for the previous decision, if one was pending
        learned: Option<LearnOutcome>,
    },
}

/// Decision taken by Normalize-Score
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizeOutcome {
    pub chosen_node: String,
    /// Action index of the chosen node in this cycle's state
    pub chosen_index: usize,
    pub explored: bool,
    /// Score of the chosen node before rescaling, exploration bonus included
    pub chosen_raw_score: i64,
    pub reward: f64,
}

/// Scoring extension points of the host scheduler framework
#[async_trait]
pub trait ScorePlugin: Send + Sync {
    fn name(&self) -> &'static str;

    async fn pre_score(
        &self,
        cycle: &mut CycleState,
        pod: &PodInfo,
        nodes: &[String],
    ) -> Result<PreScoreOutcome, SchedulerError>;

    fn score(&self, cycle: &CycleState, pod: &PodInfo, node: &str) -> Result<i64, SchedulerError>;

    /// Rescale `scores` in place; `None` when there was nothing to decide
    async fn normalize_score(
        &self,
        cycle: &CycleState,
        pod: &PodInfo,
        scores: &mut [NodeScore],
    ) -> Result<Option<NormalizeOutcome>, SchedulerError>;
}
