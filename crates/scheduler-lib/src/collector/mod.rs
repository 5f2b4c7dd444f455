//! Cluster telemetry collection
//!
//! Sources turn a list of candidate node names into a [`ClusterState`],
//! one feature row per node in the order requested.

mod promql;

pub use promql::{NodeQueries, PrometheusSource, DEFAULT_QUERY_TIMEOUT};

use crate::error::SchedulerError;
use crate::models::ClusterState;

pub use async_trait::async_trait;

/// Trait for cluster feature sources
#[async_trait]
pub trait ClusterMetricsSource: Send + Sync {
    /// Collect the feature row of every node in `nodes`, preserving order
    ///
    /// Fails as a whole with [`SchedulerError::MetricsQuery`] if any node
    /// cannot be queried.
    async fn query_cluster_features(&self, nodes: &[String])
        -> Result<ClusterState, SchedulerError>;
}
