//! Learned node scorer built on the DQN agent

use super::{CycleState, NormalizeOutcome, PreScoreOutcome, ScorePlugin, PLUGIN_NAME};
use crate::collector::ClusterMetricsSource;
use crate::dqn::{ActionChoice, Agent, AgentStats, LearnOutcome, ValueFunction};
use crate::error::{ModelError, SchedulerError};
use crate::health::{components, HealthRegistry};
use crate::models::{
    ClusterState, NodeScore, PodInfo, Transition, MAX_NODE_SCORE, MIN_NODE_SCORE,
    ROLE_NAME_LABEL, SERVICE_NAME_LABEL,
};
use crate::observability::{SchedulerMetrics, StructuredLogger};
use crate::reward::{BalanceReward, RewardAggregator, RewardFunction, RewardSummary, ServiceRole};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// Score added above the current maximum when a random node is explored
pub const DEFAULT_EXPLORATION_BONUS: i64 = 5;

/// How raw scores are mapped into `[MIN_NODE_SCORE, MAX_NODE_SCORE]`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreNormalization {
    /// `(s - min) * MAX / (max - min)`; a flat list maps to `MAX`
    #[default]
    MinMax,
    /// `s * MAX / max` with negatives floored at 0; a non-positive max maps to `MIN`
    RatioToMax,
}

impl ScoreNormalization {
    pub fn apply(self, scores: &mut [NodeScore]) {
        let Some(max) = scores.iter().map(|s| s.score).max() else {
            return;
        };
        let min = scores.iter().map(|s| s.score).min().unwrap_or(max);

        match self {
            ScoreNormalization::MinMax => {
                if max == min {
                    scores.iter_mut().for_each(|s| s.score = MAX_NODE_SCORE);
                    return;
                }
                let range = max as i128 - min as i128;
                for s in scores.iter_mut() {
                    let scaled = (s.score as i128 - min as i128) * MAX_NODE_SCORE as i128 / range;
                    s.score = scaled as i64;
                }
            }
            ScoreNormalization::RatioToMax => {
                if max <= 0 {
                    scores.iter_mut().for_each(|s| s.score = MIN_NODE_SCORE);
                    return;
                }
                for s in scores.iter_mut() {
                    let scaled = s.score.max(0) as i128 * MAX_NODE_SCORE as i128 / max as i128;
                    s.score = scaled as i64;
                }
            }
        }
    }
}

/// Knobs of the Normalize-Score decision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionConfig {
    pub exploration_bonus: i64,
    pub normalization: ScoreNormalization,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            exploration_bonus: DEFAULT_EXPLORATION_BONUS,
            normalization: ScoreNormalization::MinMax,
        }
    }
}

/// Decision awaiting its next state, carried from one cycle to the next
#[derive(Debug, Clone, PartialEq)]
pub struct PendingDecision {
    pub state: ClusterState,
    pub action: usize,
    pub reward: f64,
}

impl From<Transition> for PendingDecision {
    fn from(transition: Transition) -> Self {
        Self {
            state: transition.state,
            action: transition.action,
            reward: transition.reward,
        }
    }
}

/// Diagnostic view served on the debug endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerStats {
    #[serde(flatten)]
    pub agent: AgentStats,
    pub pending_decision: bool,
    pub reward_keys: usize,
}

/// DQN-backed implementation of the scoring extension points
///
/// Lock order is agent, then pending decision.
pub struct DrlScheduler<V: ValueFunction> {
    agent: Arc<RwLock<Agent<V>>>,
    pending: Mutex<Option<PendingDecision>>,
    source: Arc<dyn ClusterMetricsSource>,
    reward_fn: Arc<dyn RewardFunction>,
    rewards: Arc<RewardAggregator>,
    config: DecisionConfig,
    health: HealthRegistry,
    metrics: SchedulerMetrics,
    logger: StructuredLogger,
}

impl<V: ValueFunction> DrlScheduler<V> {
    pub fn builder() -> DrlSchedulerBuilder<V> {
        DrlSchedulerBuilder::new()
    }

    pub fn agent(&self) -> &Arc<RwLock<Agent<V>>> {
        &self.agent
    }

    pub fn rewards(&self) -> &Arc<RewardAggregator> {
        &self.rewards
    }

    pub fn config(&self) -> &DecisionConfig {
        &self.config
    }

    pub fn health(&self) -> &HealthRegistry {
        &self.health
    }

    pub async fn pending_decision(&self) -> Option<PendingDecision> {
        self.pending.lock().await.clone()
    }

    pub async fn stats(&self) -> SchedulerStats {
        let agent = self.agent.read().await;
        let pending = self.pending.lock().await;
        SchedulerStats {
            agent: agent.stats(),
            pending_decision: pending.is_some(),
            reward_keys: self.rewards.len(),
        }
    }

    pub fn reward_summaries(&self) -> Vec<RewardSummary> {
        self.rewards.summaries()
    }

    /// Complete the pending decision, learn from it and predict `state`
    ///
    /// On failure the freshly remembered transition is discarded and the
    /// pending decision restored, so the next cycle retries it.
    fn advance(
        &self,
        agent: &mut Agent<V>,
        pending: &mut Option<PendingDecision>,
        state: &ClusterState,
    ) -> Result<(Vec<f32>, Option<LearnOutcome>), SchedulerError> {
        let mut learned = None;

        if let Some(prior) = pending.take() {
            agent.remember(Transition::new(
                prior.state,
                prior.action,
                prior.reward,
                state.clone(),
            ));

            let started = Instant::now();
            match agent.learn() {
                Ok(outcome) => {
                    self.record_learning(agent, outcome, started.elapsed());
                    learned = Some(outcome);
                }
                Err(e) => {
                    Self::roll_back(agent, pending);
                    return Err(e);
                }
            }
        }

        let prediction = agent.predict(state).and_then(|values| {
            if values.len() == state.len() {
                Ok(values)
            } else {
                Err(SchedulerError::Prediction(ModelError::ShapeMismatch {
                    expected: state.len(),
                    actual: values.len(),
                }))
            }
        });

        match prediction {
            Ok(values) => {
                self.metrics
                    .set_agent_state(agent.memory().len(), agent.epsilon());
                Ok((values, learned))
            }
            Err(e) => {
                // A trained step is not undone: the retry fits this transition
                // again and advances `steps` a second time.
                if learned.is_some() {
                    Self::roll_back(agent, pending);
                }
                Err(e)
            }
        }
    }

    fn roll_back(agent: &mut Agent<V>, pending: &mut Option<PendingDecision>) {
        if let Some(transition) = agent.forget_newest() {
            debug!(
                action = transition.action,
                "Rolled back remembered transition, decision stays pending"
            );
            *pending = Some(transition.into());
        }
    }

    fn record_learning(&self, agent: &Agent<V>, outcome: LearnOutcome, elapsed: Duration) {
        if let LearnOutcome::Trained {
            step,
            target_synced,
        } = outcome
        {
            let secs = elapsed.as_secs_f64();
            self.metrics.observe_learn_latency(secs);
            self.metrics.inc_learning_steps();
            self.logger
                .log_learning_step(step, agent.memory().len(), agent.epsilon(), secs);

            if target_synced {
                self.metrics.inc_target_syncs();
                self.logger.log_target_synced(step, agent.target().version());
            }
        }
    }

    fn failed(&self, pod: &PodInfo, phase: &str, error: SchedulerError) -> SchedulerError {
        self.metrics.inc_decision_errors(error.kind());
        self.logger
            .log_decision_failed(&pod.key(), phase, error.kind(), &error.to_string());
        error
    }

    async fn decide(
        &self,
        cycle: &CycleState,
        pod: &PodInfo,
        scores: &mut [NodeScore],
    ) -> Result<NormalizeOutcome, SchedulerError> {
        let state = cycle.state().ok_or_else(|| {
            SchedulerError::MissingCycleState("no cluster state captured by Pre-Score".to_string())
        })?;
        let indices = scores
            .iter()
            .map(|s| cycle.candidate_index(&s.name))
            .collect::<Result<Vec<_>, _>>()?;

        let mut agent = self.agent.write().await;
        let choice = agent.choose_action(scores.len());
        let epsilon = agent.epsilon();

        let (position, explored) = match choice {
            ActionChoice::Explore(position) => (position, true),
            ActionChoice::Exploit => (top_ranked(scores), false),
        };

        let service = pod
            .service_name()
            .ok_or_else(|| SchedulerError::MissingServiceLabel {
                pod: pod.key(),
                label: SERVICE_NAME_LABEL,
            })?;
        let role = pod
            .role_name()
            .ok_or_else(|| SchedulerError::MissingServiceLabel {
                pod: pod.key(),
                label: ROLE_NAME_LABEL,
            })?;

        let action = indices[position];
        let key = ServiceRole::new(service, role);
        let reward = self.reward_fn.reward(state, action, &self.rewards, &key);
        self.rewards.record_reward(service, role, reward);
        self.rewards
            .record_placement(service, role, &scores[position].name);

        {
            let mut pending = self.pending.lock().await;
            if pending.is_some() {
                debug!(pod = %pod.key(), "Replacing a pending decision no cycle consumed");
            }
            *pending = Some(PendingDecision {
                state: state.clone(),
                action,
                reward,
            });
        }
        drop(agent);

        if explored {
            let max = scores.iter().map(|s| s.score).max().unwrap_or(0);
            scores[position].score = max.saturating_add(self.config.exploration_bonus);
            self.metrics.inc_explorations();
        }

        let chosen_node = scores[position].name.clone();
        let chosen_raw_score = scores[position].score;
        self.config.normalization.apply(scores);

        self.metrics.set_last_reward(reward);
        self.logger.log_decision(
            &pod.key(),
            service,
            role,
            &chosen_node,
            explored,
            reward,
            epsilon,
        );

        Ok(NormalizeOutcome {
            chosen_node,
            chosen_index: action,
            explored,
            chosen_raw_score,
            reward,
        })
    }
}

/// Position of the first highest score
fn top_ranked(scores: &[NodeScore]) -> usize {
    let mut best = 0;
    for (i, s) in scores.iter().enumerate().skip(1) {
        if s.score > scores[best].score {
            best = i;
        }
    }
    best
}

#[async_trait]
impl<V: ValueFunction + 'static> ScorePlugin for DrlScheduler<V> {
    fn name(&self) -> &'static str {
        PLUGIN_NAME
    }

    async fn pre_score(
        &self,
        cycle: &mut CycleState,
        pod: &PodInfo,
        nodes: &[String],
    ) -> Result<PreScoreOutcome, SchedulerError> {
        if nodes.is_empty() {
            debug!(pod = %pod.key(), "No candidate nodes, skipping Pre-Score");
            return Ok(PreScoreOutcome::Skipped);
        }
        let started = Instant::now();

        let state = match self.source.query_cluster_features(nodes).await {
            Ok(state) => {
                self.health.record_success(components::METRICS_SOURCE).await;
                state
            }
            Err(e) => {
                self.health
                    .record_failure(components::METRICS_SOURCE, e.to_string())
                    .await;
                return Err(self.failed(pod, "pre_score", e));
            }
        };

        let advanced = {
            let mut agent = self.agent.write().await;
            let mut pending = self.pending.lock().await;
            self.advance(&mut agent, &mut pending, &state)
        };

        let (prediction, learned) = match advanced {
            Ok(result) => {
                self.health.record_success(components::AGENT).await;
                result
            }
            Err(e) => {
                self.health
                    .record_failure(components::AGENT, e.to_string())
                    .await;
                return Err(self.failed(pod, "pre_score", e));
            }
        };

        cycle.prepare(state, nodes, prediction);
        self.metrics
            .observe_decision_latency(started.elapsed().as_secs_f64());

        Ok(PreScoreOutcome::Predicted {
            nodes: nodes.len(),
            learned,
        })
    }

    fn score(&self, cycle: &CycleState, pod: &PodInfo, node: &str) -> Result<i64, SchedulerError> {
        cycle
            .raw_score(node)
            .map_err(|e| self.failed(pod, "score", e))
    }

    async fn normalize_score(
        &self,
        cycle: &CycleState,
        pod: &PodInfo,
        scores: &mut [NodeScore],
    ) -> Result<Option<NormalizeOutcome>, SchedulerError> {
        if scores.is_empty() {
            return Ok(None);
        }
        let started = Instant::now();

        match self.decide(cycle, pod, scores).await {
            Ok(outcome) => {
                self.metrics
                    .observe_decision_latency(started.elapsed().as_secs_f64());
                Ok(Some(outcome))
            }
            Err(e) => Err(self.failed(pod, "normalize_score", e)),
        }
    }
}

/// Builder wiring a [`DrlScheduler`] together
pub struct DrlSchedulerBuilder<V: ValueFunction> {
    agent: Option<Agent<V>>,
    source: Option<Arc<dyn ClusterMetricsSource>>,
    reward_fn: Option<Arc<dyn RewardFunction>>,
    rewards: Option<Arc<RewardAggregator>>,
    config: DecisionConfig,
    health: Option<HealthRegistry>,
}

impl<V: ValueFunction> DrlSchedulerBuilder<V> {
    pub fn new() -> Self {
        Self {
            agent: None,
            source: None,
            reward_fn: None,
            rewards: None,
            config: DecisionConfig::default(),
            health: None,
        }
    }

    pub fn agent(mut self, agent: Agent<V>) -> Self {
        self.agent = Some(agent);
        self
    }

    pub fn source(mut self, source: Arc<dyn ClusterMetricsSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Reward function, [`BalanceReward`] when unset
    pub fn reward_function(mut self, reward_fn: Arc<dyn RewardFunction>) -> Self {
        self.reward_fn = Some(reward_fn);
        self
    }

    pub fn rewards(mut self, rewards: Arc<RewardAggregator>) -> Self {
        self.rewards = Some(rewards);
        self
    }

    pub fn config(mut self, config: DecisionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn build(self) -> Result<DrlScheduler<V>, SchedulerError> {
        let agent = self
            .agent
            .ok_or_else(|| SchedulerError::InvalidConfig("agent is required".to_string()))?;
        let source = self.source.ok_or_else(|| {
            SchedulerError::InvalidConfig("metrics source is required".to_string())
        })?;
        if self.config.exploration_bonus < 0 {
            return Err(SchedulerError::InvalidConfig(format!(
                "exploration_bonus must not be negative, got {}",
                self.config.exploration_bonus
            )));
        }

        Ok(DrlScheduler {
            agent: Arc::new(RwLock::new(agent)),
            pending: Mutex::new(None),
            source,
            reward_fn: self
                .reward_fn
                .unwrap_or_else(|| Arc::new(BalanceReward::new())),
            rewards: self.rewards.unwrap_or_default(),
            config: self.config,
            health: self.health.unwrap_or_default(),
            metrics: SchedulerMetrics::new(),
            logger: StructuredLogger::new(PLUGIN_NAME),
        })
    }
}

impl<V: ValueFunction> Default for DrlSchedulerBuilder<V> {
    fn default() -> Self {
        Self::new()
    }
}
