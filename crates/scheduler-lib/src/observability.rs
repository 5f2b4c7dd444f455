//! Observability infrastructure for the scheduler
//!
//! Provides:
//! - Prometheus metrics (decision and learning latency, replay occupancy, epsilon)
//! - Structured JSON logging with tracing

use prometheus::{
    register_gauge, register_histogram, register_int_counter, register_int_counter_vec,
    register_int_gauge, Gauge, Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 10.0,
];

static GLOBAL_METRICS: OnceLock<SchedulerMetricsInner> = OnceLock::new();

struct SchedulerMetricsInner {
    decision_latency_seconds: Histogram,
    learn_latency_seconds: Histogram,
    replay_memory_items: IntGauge,
    epsilon: Gauge,
    learning_steps: IntCounter,
    target_syncs: IntCounter,
    explorations: IntCounter,
    decision_errors: IntCounterVec,
    last_reward: Gauge,
}

impl SchedulerMetricsInner {
    fn new() -> Self {
        Self {
            decision_latency_seconds: register_histogram!(
                "drl_scheduler_decision_latency_seconds",
                "Time spent in a scheduling phase, metrics query included",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register decision_latency_seconds"),

            learn_latency_seconds: register_histogram!(
                "drl_scheduler_learn_latency_seconds",
                "Time spent in a single learning step",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register learn_latency_seconds"),

            replay_memory_items: register_int_gauge!(
                "drl_scheduler_replay_memory_items",
                "Transitions currently held in replay memory"
            )
            .expect("Failed to register replay_memory_items"),

            epsilon: register_gauge!(
                "drl_scheduler_epsilon",
                "Current exploration probability"
            )
            .expect("Failed to register epsilon"),

            learning_steps: register_int_counter!(
                "drl_scheduler_learning_steps_total",
                "Learning steps that fitted the online value function"
            )
            .expect("Failed to register learning_steps_total"),

            target_syncs: register_int_counter!(
                "drl_scheduler_target_syncs_total",
                "Times the target value function was synced from the online one"
            )
            .expect("Failed to register target_syncs_total"),

            explorations: register_int_counter!(
                "drl_scheduler_explorations_total",
                "Decisions that picked a random node"
            )
            .expect("Failed to register explorations_total"),

            decision_errors: register_int_counter_vec!(
                "drl_scheduler_decision_errors_total",
                "Failed scheduling phases by error kind",
                &["kind"]
            )
            .expect("Failed to register decision_errors_total"),

            last_reward: register_gauge!(
                "drl_scheduler_last_reward",
                "Reward of the most recent decision"
            )
            .expect("Failed to register last_reward"),
        }
    }
}

/// Handle to the process-wide scheduler metrics
///
/// Clones share the same underlying metrics.
#[derive(Clone)]
pub struct SchedulerMetrics {
    _private: (),
}

impl Default for SchedulerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedulerMetrics {
    /// Create a handle, registering the global metrics on first use
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(SchedulerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &SchedulerMetricsInner {
        GLOBAL_METRICS.get_or_init(SchedulerMetricsInner::new)
    }

    pub fn observe_decision_latency(&self, duration_secs: f64) {
        self.inner().decision_latency_seconds.observe(duration_secs);
    }

    pub fn observe_learn_latency(&self, duration_secs: f64) {
        self.inner().learn_latency_seconds.observe(duration_secs);
    }

    /// Refresh the gauges derived from agent state
    pub fn set_agent_state(&self, memory_items: usize, epsilon: f64) {
        self.inner().replay_memory_items.set(memory_items as i64);
        self.inner().epsilon.set(epsilon);
    }

    pub fn inc_learning_steps(&self) {
        self.inner().learning_steps.inc();
    }

    pub fn inc_target_syncs(&self) {
        self.inner().target_syncs.inc();
    }

    pub fn inc_explorations(&self) {
        self.inner().explorations.inc();
    }

    pub fn inc_decision_errors(&self, kind: &str) {
        self.inner().decision_errors.with_label_values(&[kind]).inc();
    }

    pub fn set_last_reward(&self, reward: f64) {
        self.inner().last_reward.set(reward);
    }
}

/// Structured logger for scheduling events
#[derive(Clone)]
pub struct StructuredLogger {
    scheduler_name: String,
}

impl StructuredLogger {
    pub fn new(scheduler_name: impl Into<String>) -> Self {
        Self {
            scheduler_name: scheduler_name.into(),
        }
    }

    /// Log a completed Normalize-Score decision
    #[allow(clippy::too_many_arguments)]
    pub fn log_decision(
        &self,
        pod: &str,
        service: &str,
        role: &str,
        chosen_node: &str,
        explored: bool,
        reward: f64,
        epsilon: f64,
    ) {
        info!(
            event = "decision_made",
            scheduler = %self.scheduler_name,
            pod = %pod,
            service = %service,
            role = %role,
            chosen_node = %chosen_node,
            explored = explored,
            reward = reward,
            epsilon = epsilon,
            "Placement decision recorded"
        );
    }

    /// Log a learning step that fitted the online model
    pub fn log_learning_step(&self, step: u64, memory_items: usize, epsilon: f64, latency_secs: f64) {
        info!(
            event = "learning_step",
            scheduler = %self.scheduler_name,
            step = step,
            memory_items = memory_items,
            epsilon = epsilon,
            latency_secs = latency_secs,
            "Online value function trained"
        );
    }

    pub fn log_target_synced(&self, step: u64, version: u64) {
        info!(
            event = "target_synced",
            scheduler = %self.scheduler_name,
            step = step,
            version = version,
            "Target value function synced from online"
        );
    }

    /// Log a failed scheduling phase
    pub fn log_decision_failed(&self, pod: &str, phase: &str, kind: &str, error: &str) {
        warn!(
            event = "decision_failed",
            scheduler = %self.scheduler_name,
            pod = %pod,
            phase = %phase,
            kind = %kind,
            error = %error,
            "Scheduling phase failed"
        );
    }

    pub fn log_startup(&self, version: &str, prometheus_address: &str) {
        info!(
            event = "scheduler_started",
            scheduler = %self.scheduler_name,
            version = %version,
            prometheus_address = %prometheus_address,
            "DRL scheduler started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "scheduler_shutdown",
            scheduler = %self.scheduler_name,
            reason = %reason,
            "DRL scheduler shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduler_metrics_observe() {
        let metrics = SchedulerMetrics::new();

        metrics.observe_decision_latency(0.004);
        metrics.observe_learn_latency(0.001);
        metrics.set_agent_state(42, 0.5);
        metrics.inc_learning_steps();
        metrics.inc_target_syncs();
        metrics.inc_explorations();
        metrics.inc_decision_errors("metrics_query");
        metrics.set_last_reward(0.75);

        let families = prometheus::gather();
        let names: Vec<&str> = families.iter().map(|f| f.get_name()).collect();
        assert!(names.contains(&"drl_scheduler_epsilon"));
        assert!(names.contains(&"drl_scheduler_decision_errors_total"));
    }

    #[test]
    fn test_handles_share_registration() {
        let a = SchedulerMetrics::new();
        let b = a.clone();
        a.inc_explorations();
        b.inc_explorations();
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("DRLScheduler");
        assert_eq!(logger.scheduler_name, "DRLScheduler");
    }
}
