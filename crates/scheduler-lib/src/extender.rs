//! Kubernetes scheduler-extender adapter
//!
//! kube-scheduler calls the `prioritize` verb once per pod with the
//! filtered candidate nodes. Each call runs one full scoring cycle against
//! a [`ScorePlugin`] and answers with per-host priorities in `0..=10`.
//! A failed cycle never fails the HTTP call: every candidate gets 0,
//! which leaves the decision to the scheduler's other priorities.

use crate::error::SchedulerError;
use crate::health::{components, HealthRegistry};
use crate::models::{NodeScore, PodInfo, MAX_EXTENDER_PRIORITY, MAX_NODE_SCORE};
use crate::plugin::{CycleState, PreScoreOutcome, ScorePlugin};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Pod as sent by kube-scheduler, reduced to its metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtenderPod {
    #[serde(default)]
    pub metadata: ObjectMeta,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtenderNode {
    #[serde(default)]
    pub metadata: ObjectMeta,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtenderNodeList {
    #[serde(default)]
    pub items: Vec<ExtenderNode>,
}

/// Arguments of the `prioritize` verb
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExtenderArgs {
    pub pod: ExtenderPod,
    /// Full node objects, sent when the extender is not node-cache capable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes: Option<ExtenderNodeList>,
    /// Node names, sent when the extender is node-cache capable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_names: Option<Vec<String>>,
}

impl ExtenderArgs {
    /// Candidate node names in the order kube-scheduler sent them
    ///
    /// Repeated names are kept once, at their first position, so every
    /// node maps to a single action index.
    pub fn candidates(&self) -> Vec<String> {
        let names: Vec<String> = match (&self.node_names, &self.nodes) {
            (Some(names), _) => names.clone(),
            (None, Some(list)) => list
                .items
                .iter()
                .filter_map(|node| node.metadata.name.clone())
                .collect(),
            (None, None) => Vec::new(),
        };

        let mut seen = HashSet::with_capacity(names.len());
        names
            .into_iter()
            .filter(|name| seen.insert(name.clone()))
            .collect()
    }

    pub fn pod_info(&self) -> PodInfo {
        let meta = &self.pod.metadata;
        PodInfo {
            name: meta.name.clone().unwrap_or_default(),
            namespace: meta
                .namespace
                .clone()
                .unwrap_or_else(|| "default".to_string()),
            labels: meta.labels.clone().unwrap_or_default(),
        }
    }
}

/// One entry of the `prioritize` response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HostPriority {
    pub host: String,
    pub score: i64,
}

/// Map a framework score (`0..=100`) into the extender range (`0..=10`)
pub fn to_extender_priority(score: i64) -> i64 {
    (score.clamp(0, MAX_NODE_SCORE) * MAX_EXTENDER_PRIORITY) / MAX_NODE_SCORE
}

/// Run Pre-Score, Score and Normalize-Score for one pod
///
/// Returns the normalized scores in candidate order, empty when there are
/// no candidates.
pub async fn run_cycle(
    plugin: &dyn ScorePlugin,
    pod: &PodInfo,
    nodes: &[String],
) -> Result<Vec<NodeScore>, SchedulerError> {
    let mut cycle = CycleState::new();
    if plugin.pre_score(&mut cycle, pod, nodes).await? == PreScoreOutcome::Skipped {
        return Ok(Vec::new());
    }

    let mut scores = nodes
        .iter()
        .map(|node| {
            plugin
                .score(&cycle, pod, node)
                .map(|score| NodeScore::new(node.clone(), score))
        })
        .collect::<Result<Vec<_>, _>>()?;

    plugin.normalize_score(&cycle, pod, &mut scores).await?;
    Ok(scores)
}

/// Serves the extender verbs on top of a scoring plugin
#[derive(Clone)]
pub struct Extender {
    plugin: Arc<dyn ScorePlugin>,
    health: HealthRegistry,
}

impl Extender {
    pub fn new(plugin: Arc<dyn ScorePlugin>, health: HealthRegistry) -> Self {
        Self { plugin, health }
    }

    pub fn plugin_name(&self) -> &'static str {
        self.plugin.name()
    }

    /// Handle a `prioritize` call, degrading to all-zero priorities on failure
    pub async fn prioritize(&self, args: &ExtenderArgs) -> Vec<HostPriority> {
        let pod = args.pod_info();
        let nodes = args.candidates();

        match run_cycle(self.plugin.as_ref(), &pod, &nodes).await {
            Ok(scores) => {
                self.health.record_success(components::EXTENDER).await;
                debug!(pod = %pod.key(), nodes = nodes.len(), "Prioritized nodes");
                scores
                    .into_iter()
                    .map(|s| HostPriority {
                        host: s.name,
                        score: to_extender_priority(s.score),
                    })
                    .collect()
            }
            Err(e) => {
                warn!(
                    pod = %pod.key(),
                    kind = e.kind(),
                    error = %e,
                    "Scoring cycle failed, answering without preference"
                );
                if matches!(
                    e,
                    SchedulerError::MissingCycleState(_) | SchedulerError::UnknownNode(_)
                ) {
                    self.health
                        .record_failure(components::EXTENDER, e.to_string())
                        .await;
                }
                nodes
                    .into_iter()
                    .map(|host| HostPriority { host, score: 0 })
                    .collect()
            }
        }
    }
}
