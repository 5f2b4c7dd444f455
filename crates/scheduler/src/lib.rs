//! DRL scheduler service
//!
//! Hosts the learned node scorer behind the kube-scheduler extender
//! protocol, together with health, metrics and debug endpoints.

pub mod api;
pub mod config;

use anyhow::{Context, Result};
use scheduler_lib::collector::ClusterMetricsSource;
use scheduler_lib::dqn::{seeded_rng, Agent, DecaySchedule, LinearValueFunction};
use scheduler_lib::plugin::DrlScheduler;
use scheduler_lib::reward::BalanceReward;
use scheduler_lib::HealthRegistry;
use std::sync::Arc;

/// Scheduler type served by this binary
pub type Scheduler = DrlScheduler<LinearValueFunction>;

/// Wire the agent and decision protocol from configuration
pub fn build_scheduler(
    config: &config::SchedulerConfig,
    source: Arc<dyn ClusterMetricsSource>,
    health: HealthRegistry,
) -> Result<Scheduler> {
    let schedule = DecaySchedule::new(
        config.epsilon_initial,
        config.epsilon_floor,
        config.epsilon_decay,
    );
    let agent = Agent::new(
        config.hyperparameters(),
        Box::new(schedule),
        LinearValueFunction::new(config.learning_rate),
        LinearValueFunction::new(config.learning_rate),
        seeded_rng(config.rng_seed),
    )
    .context("Invalid agent hyperparameters")?;

    let reward = BalanceReward::new()
        .with_pod_load(config.reward_pod_load)
        .with_spread_weight(config.reward_spread_weight)
        .with_baseline_window(config.reward_baseline_window);

    DrlScheduler::builder()
        .agent(agent)
        .source(source)
        .reward_function(Arc::new(reward))
        .config(config.decision_config())
        .health(health)
        .build()
        .context("Failed to build scheduler")
}
