//! Core data models for the learned node scorer

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Number of feature columns reported per node
pub const FEATURE_COUNT: usize = 8;

/// Upper bound of the framework's node score range
pub const MAX_NODE_SCORE: i64 = 100;

/// Lower bound of the framework's node score range
pub const MIN_NODE_SCORE: i64 = 0;

/// Upper bound of the scheduler-extender priority range
pub const MAX_EXTENDER_PRIORITY: i64 = 10;

/// Pod label carrying the owning service name
pub const SERVICE_NAME_LABEL: &str = "servicename";

/// Pod label carrying the role of the pod within its service
pub const ROLE_NAME_LABEL: &str = "rolename";

/// Resource telemetry for a single node
///
/// Column order is fixed and shared with the value function:
/// cpu used, memory used, filesystem used, filesystem write rate,
/// cpu free, memory free, filesystem free, filesystem read rate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeFeatures {
    pub cpu_used: f64,
    pub memory_used: f64,
    pub fs_used: f64,
    pub fs_write_rate: f64,
    pub cpu_free: f64,
    pub memory_free: f64,
    pub fs_free: f64,
    pub fs_read_rate: f64,
}

impl NodeFeatures {
    pub fn as_array(&self) -> [f64; FEATURE_COUNT] {
        [
            self.cpu_used,
            self.memory_used,
            self.fs_used,
            self.fs_write_rate,
            self.cpu_free,
            self.memory_free,
            self.fs_free,
            self.fs_read_rate,
        ]
    }

    pub fn from_array(values: [f64; FEATURE_COUNT]) -> Self {
        Self {
            cpu_used: values[0],
            memory_used: values[1],
            fs_used: values[2],
            fs_write_rate: values[3],
            cpu_free: values[4],
            memory_free: values[5],
            fs_free: values[6],
            fs_read_rate: values[7],
        }
    }

    /// Mean of the cpu, memory and filesystem used-over-capacity ratios
    pub fn utilization(&self) -> f64 {
        let ratio = |used: f64, free: f64| {
            let capacity = used + free;
            if capacity > 0.0 {
                (used / capacity).clamp(0.0, 1.0)
            } else {
                0.0
            }
        };
        (ratio(self.cpu_used, self.cpu_free)
            + ratio(self.memory_used, self.memory_free)
            + ratio(self.fs_used, self.fs_free))
            / 3.0
    }
}

/// Cluster-wide feature matrix, one row per candidate node
///
/// Row `i` corresponds to action index `i`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterState {
    rows: Vec<(String, NodeFeatures)>,
}

impl ClusterState {
    pub fn new(rows: Vec<(String, NodeFeatures)>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, index: usize) -> Option<&NodeFeatures> {
        self.rows.get(index).map(|(_, features)| features)
    }

    pub fn node_name(&self, index: usize) -> Option<&str> {
        self.rows.get(index).map(|(name, _)| name.as_str())
    }

    pub fn rows(&self) -> impl Iterator<Item = &NodeFeatures> {
        self.rows.iter().map(|(_, features)| features)
    }

    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().map(|(name, _)| name.as_str())
    }

    /// Feature rows scaled column-wise by each column's largest magnitude
    ///
    /// Raw telemetry mixes cores, bytes and bytes/s; scaling keeps every
    /// column inside [-1, 1]. All-zero columns stay zero.
    pub fn normalized(&self) -> Vec<[f32; FEATURE_COUNT]> {
        let mut scale = [0.0f64; FEATURE_COUNT];
        for features in self.rows() {
            for (col, value) in features.as_array().iter().enumerate() {
                scale[col] = scale[col].max(value.abs());
            }
        }

        self.rows()
            .map(|features| {
                let mut out = [0.0f32; FEATURE_COUNT];
                for (col, value) in features.as_array().iter().enumerate() {
                    if scale[col] > 0.0 {
                        out[col] = (value / scale[col]) as f32;
                    } else if !value.is_finite() {
                        out[col] = *value as f32;
                    }
                }
                out
            })
            .collect()
    }

    /// Utilization of every node, in row order
    pub fn utilizations(&self) -> Vec<f64> {
        self.rows().map(NodeFeatures::utilization).collect()
    }
}

/// One completed placement decision used for learning
///
/// The reward is observed one cycle late: it is known only once the next
/// cycle starts, which is also when `next_state` is captured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub state: ClusterState,
    pub action: usize,
    pub reward: f64,
    pub next_state: ClusterState,
}

impl Transition {
    pub fn new(state: ClusterState, action: usize, reward: f64, next_state: ClusterState) -> Self {
        Self {
            state,
            action,
            reward,
            next_state,
        }
    }
}

/// Pod being placed, reduced to what the scorer reads
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PodInfo {
    pub name: String,
    pub namespace: String,
    pub labels: BTreeMap<String, String>,
}

impl PodInfo {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            labels: BTreeMap::new(),
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn service_name(&self) -> Option<&str> {
        self.labels.get(SERVICE_NAME_LABEL).map(String::as_str)
    }

    pub fn role_name(&self) -> Option<&str> {
        self.labels.get(ROLE_NAME_LABEL).map(String::as_str)
    }

    /// `namespace/name`, used in logs and errors
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

/// Entry of the host's node score list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeScore {
    pub name: String,
    pub score: i64,
}

impl NodeScore {
    pub fn new(name: impl Into<String>, score: i64) -> Self {
        Self {
            name: name.into(),
            score,
        }
    }
}
