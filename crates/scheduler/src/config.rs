//! Scheduler configuration
//!
//! Read once at startup from an optional TOML file (`DRL_CONFIG_FILE`,
//! default `drl-scheduler.toml`) overlaid by `DRL_`-prefixed environment
//! variables, e.g. `DRL_BATCH_SIZE=32`.

use anyhow::{bail, Context, Result};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use scheduler_lib::dqn::{
    Hyperparameters, LearningTarget, DEFAULT_CAPACITY, DEFAULT_EPSILON_DECAY,
    DEFAULT_EPSILON_FLOOR, DEFAULT_EPSILON_INITIAL, DEFAULT_LEARNING_RATE,
};
use scheduler_lib::health::DEFAULT_FAILURE_THRESHOLD;
use scheduler_lib::plugin::{DecisionConfig, ScoreNormalization, DEFAULT_EXPLORATION_BONUS};
use scheduler_lib::reward::{DEFAULT_POD_LOAD, DEFAULT_SPREAD_WEIGHT};
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "drl-scheduler.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Port of the extender, health and metrics server
    pub api_port: u16,

    /// Base URL of the Prometheus server
    pub prometheus_address: String,

    /// Timeout of a single PromQL query
    pub query_timeout_secs: u64,

    pub gamma: f32,
    pub epsilon_initial: f64,
    pub epsilon_floor: f64,
    pub epsilon_decay: f64,
    pub target_sync_interval: u64,
    pub replay_capacity: usize,
    pub batch_size: usize,
    pub learning_rate: f32,
    pub learning_target: LearningTarget,

    pub exploration_bonus: i64,
    pub normalization: ScoreNormalization,

    /// Recent rewards subtracted as a baseline (0 disables)
    pub reward_baseline_window: usize,

    /// Utilization one pod adds to its node when scoring a decision
    pub reward_pod_load: f64,

    /// Penalty weight for stacking a service's pods on one node
    pub reward_spread_weight: f64,

    /// Fixed seed for reproducible runs; OS entropy when unset
    pub rng_seed: Option<u64>,

    /// Consecutive failures before a component is reported unhealthy
    pub failure_threshold: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        let hyperparameters = Hyperparameters::default();
        let decision = DecisionConfig::default();
        Self {
            api_port: 8888,
            prometheus_address: "http://prometheus-server.monitoring:9090".to_string(),
            query_timeout_secs: 10,
            gamma: hyperparameters.gamma,
            epsilon_initial: DEFAULT_EPSILON_INITIAL,
            epsilon_floor: DEFAULT_EPSILON_FLOOR,
            epsilon_decay: DEFAULT_EPSILON_DECAY,
            target_sync_interval: hyperparameters.target_sync_interval,
            replay_capacity: DEFAULT_CAPACITY,
            batch_size: hyperparameters.batch_size,
            learning_rate: DEFAULT_LEARNING_RATE,
            learning_target: hyperparameters.learning_target,
            exploration_bonus: DEFAULT_EXPLORATION_BONUS,
            normalization: decision.normalization,
            reward_baseline_window: 0,
            reward_pod_load: DEFAULT_POD_LOAD,
            reward_spread_weight: DEFAULT_SPREAD_WEIGHT,
            rng_seed: None,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
        }
    }
}

impl SchedulerConfig {
    /// Load configuration from the config file and environment
    pub fn load() -> Result<Self> {
        let path =
            std::env::var("DRL_CONFIG_FILE").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());

        let builder = Config::builder()
            .add_source(File::with_name(&path).required(false))
            .add_source(Environment::with_prefix("DRL").try_parsing(true));

        Self::from_builder(builder)
            .with_context(|| format!("Failed to load configuration (file: {})", path))
    }

    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let config: Self = builder
            .build()
            .context("Failed to read configuration sources")?
            .try_deserialize()
            .context("Failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.prometheus_address.trim().is_empty() {
            bail!("prometheus_address must be set");
        }
        if self.query_timeout_secs == 0 {
            bail!("query_timeout_secs must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.epsilon_initial) {
            bail!("epsilon_initial must be within [0, 1], got {}", self.epsilon_initial);
        }
        if !(0.0..=self.epsilon_initial).contains(&self.epsilon_floor) {
            bail!(
                "epsilon_floor must be within [0, epsilon_initial], got {}",
                self.epsilon_floor
            );
        }
        if !(self.epsilon_decay > 0.0 && self.epsilon_decay <= 1.0) {
            bail!("epsilon_decay must be within (0, 1], got {}", self.epsilon_decay);
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            bail!("learning_rate must be positive, got {}", self.learning_rate);
        }
        if !(0.0..=1.0).contains(&self.reward_pod_load) {
            bail!("reward_pod_load must be within [0, 1], got {}", self.reward_pod_load);
        }
        if !(self.reward_spread_weight.is_finite() && self.reward_spread_weight >= 0.0) {
            bail!(
                "reward_spread_weight must not be negative, got {}",
                self.reward_spread_weight
            );
        }
        if self.exploration_bonus < 0 {
            bail!("exploration_bonus must not be negative, got {}", self.exploration_bonus);
        }
        self.hyperparameters()
            .validate()
            .context("Invalid agent hyperparameters")?;
        Ok(())
    }

    pub fn hyperparameters(&self) -> Hyperparameters {
        Hyperparameters {
            gamma: self.gamma,
            target_sync_interval: self.target_sync_interval,
            capacity: self.replay_capacity,
            batch_size: self.batch_size,
            learning_target: self.learning_target,
        }
    }

    pub fn decision_config(&self) -> DecisionConfig {
        DecisionConfig {
            exploration_bonus: self.exploration_bonus,
            normalization: self.normalization,
        }
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn from_toml(toml: &str) -> Result<SchedulerConfig> {
        SchedulerConfig::from_builder(
            Config::builder().add_source(File::from_str(toml, FileFormat::Toml)),
        )
    }

    #[test]
    fn test_defaults() {
        let config = from_toml("").unwrap();
        assert_eq!(config.api_port, 8888);
        assert_eq!(config.query_timeout(), Duration::from_secs(10));
        assert_eq!(config.batch_size, 20);
        assert_eq!(config.replay_capacity, 10_000);
        assert_eq!(config.exploration_bonus, 5);
        assert_eq!(config.learning_target, LearningTarget::Immediate);
        assert_eq!(config.normalization, ScoreNormalization::MinMax);
        assert!(config.rng_seed.is_none());
        assert_eq!(config.reward_pod_load, DEFAULT_POD_LOAD);
        assert_eq!(config.reward_spread_weight, DEFAULT_SPREAD_WEIGHT);
    }

    #[test]
    fn test_file_overrides() {
        let config = from_toml(
            r#"
            prometheus_address = "http://prom.local:9090"
            batch_size = 8
            replay_capacity = 64
            learning_target = "bootstrapped"
            normalization = "ratio_to_max"
            rng_seed = 7
            "#,
        )
        .unwrap();

        assert_eq!(config.prometheus_address, "http://prom.local:9090");
        assert_eq!(config.hyperparameters().batch_size, 8);
        assert_eq!(config.hyperparameters().capacity, 64);
        assert_eq!(config.learning_target, LearningTarget::Bootstrapped);
        assert_eq!(config.decision_config().normalization, ScoreNormalization::RatioToMax);
        assert_eq!(config.rng_seed, Some(7));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(from_toml("gamma = 1.5").is_err());
        assert!(from_toml("epsilon_decay = 0.0").is_err());
        assert!(from_toml("epsilon_floor = 0.5\nepsilon_initial = 0.2").is_err());
        assert!(from_toml("batch_size = 100\nreplay_capacity = 10").is_err());
        assert!(from_toml("exploration_bonus = -1").is_err());
        assert!(from_toml("reward_pod_load = 1.5").is_err());
        assert!(from_toml("reward_spread_weight = -0.5").is_err());
        assert!(from_toml("learning_target = \"sarsa\"").is_err());
    }
}
