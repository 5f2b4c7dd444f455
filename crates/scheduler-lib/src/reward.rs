//! Reward computation and per-(service, role) reward history
//!
//! Rewards are attributed one cycle late: the decision made in cycle `n`
//! is scored from the state captured in that cycle, recorded here, and fed
//! to the agent once cycle `n + 1` observes the next state.

use crate::models::ClusterState;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Key of the reward history
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceRole {
    pub service: String,
    pub role: String,
}

impl ServiceRole {
    pub fn new(service: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            role: role.into(),
        }
    }
}

impl fmt::Display for ServiceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.service, self.role)
    }
}

/// Aggregate view of one history entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardSummary {
    pub service: String,
    pub role: String,
    pub count: usize,
    pub mean: f64,
    pub last: Option<f64>,
}

/// Append-only reward and placement history keyed by (service, role)
///
/// Entries are created on first write and never removed; growth is
/// unbounded.
#[derive(Debug, Default)]
pub struct RewardAggregator {
    entries: DashMap<ServiceRole, Vec<f64>>,
    placements: DashMap<ServiceRole, BTreeMap<String, usize>>,
}

impl RewardAggregator {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            placements: DashMap::new(),
        }
    }

    /// Count one pod of `(service, role)` placed on `node`
    pub fn record_placement(&self, service: &str, role: &str, node: &str) {
        *self
            .placements
            .entry(ServiceRole::new(service, role))
            .or_default()
            .entry(node.to_string())
            .or_default() += 1;
    }

    /// Pods of `service` placed per node, summed over all of its roles
    pub fn service_placements(&self, service: &str) -> HashMap<String, usize> {
        let mut per_node = HashMap::new();
        for entry in self.placements.iter().filter(|e| e.key().service == service) {
            for (node, count) in entry.value() {
                *per_node.entry(node.clone()).or_default() += count;
            }
        }
        per_node
    }

    /// Append `reward` to the history of `(service, role)`
    pub fn record_reward(&self, service: &str, role: &str, reward: f64) {
        self.entries
            .entry(ServiceRole::new(service, role))
            .or_default()
            .push(reward);
    }

    /// History in insertion order, `None` for a key never written
    pub fn history(&self, key: &ServiceRole) -> Option<Vec<f64>> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Mean of the last `window` rewards recorded for `key`
    pub fn recent_mean(&self, key: &ServiceRole, window: usize) -> Option<f64> {
        if window == 0 {
            return None;
        }
        let entry = self.entries.get(key)?;
        let values = entry.value();
        let recent = &values[values.len().saturating_sub(window)..];
        if recent.is_empty() {
            return None;
        }
        Some(recent.iter().sum::<f64>() / recent.len() as f64)
    }

    /// Number of distinct (service, role) keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Summaries of every entry, sorted by key
    pub fn summaries(&self) -> Vec<RewardSummary> {
        let mut summaries: Vec<RewardSummary> = self
            .entries
            .iter()
            .map(|entry| {
                let values = entry.value();
                let mean = if values.is_empty() {
                    0.0
                } else {
                    values.iter().sum::<f64>() / values.len() as f64
                };
                RewardSummary {
                    service: entry.key().service.clone(),
                    role: entry.key().role.clone(),
                    count: values.len(),
                    mean,
                    last: values.last().copied(),
                }
            })
            .collect();
        summaries.sort_by(|a, b| (&a.service, &a.role).cmp(&(&b.service, &b.role)));
        summaries
    }
}

/// Scores a completed placement decision
pub trait RewardFunction: Send + Sync {
    /// Reward for placing a pod of `key` on row `action` of `state`
    fn reward(
        &self,
        state: &ClusterState,
        action: usize,
        rewards: &RewardAggregator,
        key: &ServiceRole,
    ) -> f64;
}

/// Utilization a single pod adds to the node it lands on
pub const DEFAULT_POD_LOAD: f64 = 0.05;

/// Weight of the same-service co-location penalty
pub const DEFAULT_SPREAD_WEIGHT: f64 = 1.0;

/// Rewards placements that keep the cluster and each service balanced
///
/// ```text
/// reward = (1 - stddev(utilization after placement))
///        + (mean utilization - chosen utilization)
///        - spread_weight * share of the service's pods already on the chosen node
/// ```
///
/// The placement adds `pod_load` to the chosen node before the spread of
/// utilization is measured. The service share counts every role of the
/// pod's service. When `baseline_window > 0` the recent mean reward of the
/// same (service, role) is subtracted.
#[derive(Debug, Clone)]
pub struct BalanceReward {
    pod_load: f64,
    spread_weight: f64,
    baseline_window: usize,
}

impl Default for BalanceReward {
    fn default() -> Self {
        Self {
            pod_load: DEFAULT_POD_LOAD,
            spread_weight: DEFAULT_SPREAD_WEIGHT,
            baseline_window: 0,
        }
    }
}

impl BalanceReward {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pod_load(mut self, pod_load: f64) -> Self {
        self.pod_load = pod_load;
        self
    }

    pub fn with_spread_weight(mut self, weight: f64) -> Self {
        self.spread_weight = weight;
        self
    }

    /// Subtract the mean of the last `window` rewards of the same key (0 disables)
    pub fn with_baseline_window(mut self, window: usize) -> Self {
        self.baseline_window = window;
        self
    }

    /// Share of `key.service`'s placements already on row `action`
    fn colocation(
        state: &ClusterState,
        action: usize,
        rewards: &RewardAggregator,
        key: &ServiceRole,
    ) -> f64 {
        let placements = rewards.service_placements(&key.service);
        let total: usize = placements.values().sum();
        if total == 0 {
            return 0.0;
        }
        let on_chosen = state
            .node_name(action)
            .and_then(|node| placements.get(node))
            .copied()
            .unwrap_or(0);
        on_chosen as f64 / total as f64
    }
}

fn std_dev(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
}

impl RewardFunction for BalanceReward {
    fn reward(
        &self,
        state: &ClusterState,
        action: usize,
        rewards: &RewardAggregator,
        key: &ServiceRole,
    ) -> f64 {
        let mut utilizations = state.utilizations();
        let Some(chosen) = utilizations.get(action).copied() else {
            return 0.0;
        };

        let mean = utilizations.iter().sum::<f64>() / utilizations.len() as f64;
        let headroom = mean - chosen;

        utilizations[action] = (chosen + self.pod_load).min(1.0);
        let balance = 1.0 - std_dev(&utilizations);

        let spread = self.spread_weight * Self::colocation(state, action, rewards, key);
        let raw = balance + headroom - spread;

        match rewards.recent_mean(key, self.baseline_window) {
            Some(baseline) => raw - baseline,
            None => raw,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NodeFeatures;

    fn state(cpu_used: &[f64]) -> ClusterState {
        ClusterState::new(
            cpu_used
                .iter()
                .enumerate()
                .map(|(i, used)| {
                    (
                        format!("node{}", i),
                        NodeFeatures {
                            cpu_used: *used,
                            cpu_free: 1.0 - used,
                            memory_used: *used,
                            memory_free: 1.0 - used,
                            fs_used: *used,
                            fs_free: 1.0 - used,
                            ..Default::default()
                        },
                    )
                })
                .collect(),
        )
    }

    #[test]
    fn test_history_in_insertion_order() {
        let aggregator = RewardAggregator::new();
        let key = ServiceRole::new("checkout", "api");
        assert!(aggregator.history(&key).is_none());

        aggregator.record_reward("checkout", "api", 0.5);
        aggregator.record_reward("checkout", "api", -0.25);
        aggregator.record_reward("checkout", "api", 1.0);

        assert_eq!(aggregator.history(&key), Some(vec![0.5, -0.25, 1.0]));
        assert_eq!(aggregator.len(), 1);
    }

    #[test]
    fn test_unseen_key_has_no_entry() {
        let aggregator = RewardAggregator::new();
        aggregator.record_reward("checkout", "api", 0.5);

        assert!(aggregator
            .history(&ServiceRole::new("checkout", "worker"))
            .is_none());
        assert!(aggregator
            .history(&ServiceRole::new("search", "api"))
            .is_none());
    }

    #[test]
    fn test_recent_mean() {
        let aggregator = RewardAggregator::new();
        let key = ServiceRole::new("checkout", "api");
        for r in [1.0, 2.0, 3.0, 4.0] {
            aggregator.record_reward("checkout", "api", r);
        }

        assert_eq!(aggregator.recent_mean(&key, 2), Some(3.5));
        assert_eq!(aggregator.recent_mean(&key, 10), Some(2.5));
        assert_eq!(aggregator.recent_mean(&key, 0), None);
        assert_eq!(
            aggregator.recent_mean(&ServiceRole::new("x", "y"), 2),
            None
        );
    }

    #[test]
    fn test_summaries_sorted() {
        let aggregator = RewardAggregator::new();
        aggregator.record_reward("search", "api", 1.0);
        aggregator.record_reward("checkout", "worker", 2.0);
        aggregator.record_reward("checkout", "api", 1.0);
        aggregator.record_reward("checkout", "api", 3.0);

        let summaries = aggregator.summaries();
        assert_eq!(summaries.len(), 3);
        assert_eq!(summaries[0].service, "checkout");
        assert_eq!(summaries[0].role, "api");
        assert_eq!(summaries[0].count, 2);
        assert_eq!(summaries[0].mean, 2.0);
        assert_eq!(summaries[0].last, Some(3.0));
        assert_eq!(summaries[2].service, "search");
    }

    #[test]
    fn test_less_loaded_node_earns_more() {
        let s = state(&[0.2, 0.5, 0.8]);
        let aggregator = RewardAggregator::new();
        let key = ServiceRole::new("checkout", "api");
        let reward = BalanceReward::new();

        let idle = reward.reward(&s, 0, &aggregator, &key);
        let middle = reward.reward(&s, 1, &aggregator, &key);
        let busy = reward.reward(&s, 2, &aggregator, &key);

        assert!(idle > middle);
        assert!(middle > busy);
    }

    #[test]
    fn test_balanced_cluster_rewards_one() {
        let s = state(&[0.4, 0.4, 0.4]);
        let aggregator = RewardAggregator::new();
        let key = ServiceRole::new("checkout", "api");

        let r = BalanceReward::new()
            .with_pod_load(0.0)
            .reward(&s, 1, &aggregator, &key);
        assert!((r - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_baseline_subtracted() {
        let s = state(&[0.4, 0.4]);
        let aggregator = RewardAggregator::new();
        let key = ServiceRole::new("checkout", "api");
        aggregator.record_reward("checkout", "api", 0.25);

        let r = BalanceReward::new()
            .with_pod_load(0.0)
            .with_baseline_window(5)
            .reward(&s, 0, &aggregator, &key);
        assert!((r - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_out_of_range_action_is_neutral() {
        let s = state(&[0.4]);
        let aggregator = RewardAggregator::new();
        let key = ServiceRole::new("checkout", "api");
        assert_eq!(BalanceReward::new().reward(&s, 3, &aggregator, &key), 0.0);
    }

    #[test]
    fn test_service_placements_sum_roles() {
        let aggregator = RewardAggregator::new();
        aggregator.record_placement("checkout", "api", "node0");
        aggregator.record_placement("checkout", "api", "node0");
        aggregator.record_placement("checkout", "worker", "node0");
        aggregator.record_placement("checkout", "worker", "node1");
        aggregator.record_placement("search", "api", "node1");

        let placements = aggregator.service_placements("checkout");
        assert_eq!(placements.get("node0"), Some(&3));
        assert_eq!(placements.get("node1"), Some(&1));
        assert!(aggregator.service_placements("billing").is_empty());
        // Placements alone do not create reward history
        assert!(aggregator.is_empty());
    }

    #[test]
    fn test_balance_measured_after_placement() {
        let s = state(&[0.2, 0.5, 0.8]);
        let aggregator = RewardAggregator::new();
        let key = ServiceRole::new("checkout", "api");
        let unloaded = BalanceReward::new().with_pod_load(0.0);
        let loaded = BalanceReward::new().with_pod_load(0.2);

        // Filling the idle node narrows the spread, filling the busy one widens it
        assert!(loaded.reward(&s, 0, &aggregator, &key) > unloaded.reward(&s, 0, &aggregator, &key));
        assert!(loaded.reward(&s, 2, &aggregator, &key) < unloaded.reward(&s, 2, &aggregator, &key));
    }

    #[test]
    fn test_history_of_key_changes_reward() {
        let s = state(&[0.4, 0.4, 0.4]);
        let aggregator = RewardAggregator::new();
        for _ in 0..5 {
            aggregator.record_reward("checkout", "api", 10.0);
            aggregator.record_placement("checkout", "api", "node0");
        }
        let reward = BalanceReward::new();

        let placed = reward.reward(&s, 0, &aggregator, &ServiceRole::new("checkout", "api"));
        let unseen = reward.reward(&s, 0, &aggregator, &ServiceRole::new("other", "db"));

        assert!((unseen - placed - DEFAULT_SPREAD_WEIGHT).abs() < 1e-9);
    }

    #[test]
    fn test_spreading_a_service_earns_more() {
        let s = state(&[0.4, 0.4, 0.4]);
        let aggregator = RewardAggregator::new();
        aggregator.record_placement("checkout", "worker", "node0");
        aggregator.record_placement("checkout", "api", "node0");
        aggregator.record_placement("checkout", "api", "node1");
        let key = ServiceRole::new("checkout", "api");
        let reward = BalanceReward::new();

        let crowded = reward.reward(&s, 0, &aggregator, &key);
        let shared = reward.reward(&s, 1, &aggregator, &key);
        let empty = reward.reward(&s, 2, &aggregator, &key);

        assert!(empty > shared);
        assert!(shared > crowded);
    }
}
