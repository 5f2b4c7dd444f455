//! Prometheus instant-query source
//!
//! Evaluates ten PromQL expressions per node against `/api/v1/query` and
//! folds them into the eight feature columns. CPU and memory "used" take the
//! larger of actual usage and requested resources, so a node with reserved
//! but idle capacity still reads as occupied.

use super::{async_trait, ClusterMetricsSource};
use crate::error::SchedulerError;
use crate::models::{ClusterState, NodeFeatures};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Per-query timeout used when none is configured
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// PromQL expressions evaluated for a single node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeQueries {
    pub cpu_usage: String,
    pub cpu_requests: String,
    pub memory_usage: String,
    pub memory_requests: String,
    pub fs_usage: String,
    pub fs_write_rate: String,
    pub cpu_allocatable: String,
    pub memory_allocatable: String,
    pub fs_limit: String,
    pub fs_read_rate: String,
}

impl NodeQueries {
    pub fn for_node(node: &str) -> Self {
        let node = escape_label_value(node);
        Self {
            cpu_usage: format!(
                r#"sum(irate(container_cpu_usage_seconds_total{{container!="",node="{node}"}}[3m]))"#
            ),
            cpu_requests: format!(
                r#"sum(kube_pod_container_resource_requests{{resource="cpu",unit="core",node="{node}"}})"#
            ),
            memory_usage: format!(
                r#"sum(container_memory_working_set_bytes{{container!="",node="{node}"}})"#
            ),
            memory_requests: format!(
                r#"sum(kube_pod_container_resource_requests{{resource="memory",unit="byte",node="{node}"}})"#
            ),
            fs_usage: format!(
                r#"sum(container_fs_usage_bytes{{device=~"^/dev/.*$",id="/",node="{node}"}})"#
            ),
            fs_write_rate: format!(
                r#"sum(sum(rate(container_fs_writes_bytes_total{{image!="",node="{node}"}}[1m])) without (device))"#
            ),
            cpu_allocatable: format!(
                r#"sum(kube_node_status_allocatable{{resource="cpu",unit="core",node="{node}"}})"#
            ),
            memory_allocatable: format!(
                r#"sum(kube_node_status_allocatable{{resource="memory",unit="byte",node="{node}"}})"#
            ),
            fs_limit: format!(
                r#"sum(container_fs_limit_bytes{{device=~"^/dev/.*$",id="/",node="{node}"}})"#
            ),
            fs_read_rate: format!(
                r#"sum(sum(rate(container_fs_reads_bytes_total{{image!="",node="{node}"}}[1m])) without (device))"#
            ),
        }
    }
}

fn escape_label_value(value: &str) -> String {
    value.replace('\\', r"\\").replace('"', r#"\""#)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default)]
    warnings: Vec<String>,
    #[serde(default)]
    error_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryData {
    result_type: String,
    #[serde(default)]
    result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct VectorSample {
    value: (f64, String),
}

/// Feature source backed by the Prometheus HTTP API
pub struct PrometheusSource {
    client: Client,
    base_url: Url,
    timeout: Duration,
}

impl PrometheusSource {
    pub fn new(address: &str, timeout: Duration) -> Result<Self, SchedulerError> {
        let mut base_url = Url::parse(address).map_err(|e| {
            SchedulerError::InvalidConfig(format!("invalid Prometheus address {:?}: {}", address, e))
        })?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder().build().map_err(|e| {
            SchedulerError::InvalidConfig(format!("failed to build HTTP client: {}", e))
        })?;

        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Evaluate one instant query and reduce it to a scalar
    ///
    /// Empty vectors read as 0; negative and NaN samples are clamped to 0.
    async fn query(&self, promql: &str) -> Result<f64, String> {
        let url = self
            .base_url
            .join("api/v1/query")
            .map_err(|e| format!("invalid query URL: {}", e))?;

        debug!(query = promql, "Querying Prometheus");

        let response = self
            .client
            .get(url)
            .query(&[("query", promql)])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| format!("request failed: {}", e))?;

        let status = response.status();
        let body: QueryResponse = response
            .json()
            .await
            .map_err(|e| format!("invalid response (HTTP {}): {}", status, e))?;

        if body.status != "success" {
            return Err(format!(
                "query rejected ({}): {}",
                body.error_type.unwrap_or_else(|| "unknown".to_string()),
                body.error.unwrap_or_default()
            ));
        }
        if !body.warnings.is_empty() {
            return Err(format!("unexpected warnings: {:?}", body.warnings));
        }

        let data = body.data.ok_or_else(|| "response carries no data".to_string())?;
        if data.result_type != "vector" {
            return Err(format!("unexpected result type: {}", data.result_type));
        }

        let samples: Vec<VectorSample> = serde_json::from_value(data.result)
            .map_err(|e| format!("malformed vector result: {}", e))?;

        let mut value = 0.0;
        for sample in samples {
            let parsed: f64 = sample
                .value
                .1
                .parse()
                .map_err(|e| format!("malformed sample {:?}: {}", sample.value.1, e))?;
            value = if parsed.is_nan() || parsed < 0.0 {
                0.0
            } else {
                parsed
            };
        }
        Ok(value)
    }

    /// Collect the feature row of a single node
    pub async fn query_node(&self, node: &str) -> Result<NodeFeatures, String> {
        let q = NodeQueries::for_node(node);

        let (
            cpu_usage,
            cpu_requests,
            memory_usage,
            memory_requests,
            fs_used,
            fs_write_rate,
            cpu_allocatable,
            memory_allocatable,
            fs_limit,
            fs_read_rate,
        ) = tokio::try_join!(
            self.query(&q.cpu_usage),
            self.query(&q.cpu_requests),
            self.query(&q.memory_usage),
            self.query(&q.memory_requests),
            self.query(&q.fs_usage),
            self.query(&q.fs_write_rate),
            self.query(&q.cpu_allocatable),
            self.query(&q.memory_allocatable),
            self.query(&q.fs_limit),
            self.query(&q.fs_read_rate),
        )?;

        let cpu_used = cpu_usage.max(cpu_requests);
        let memory_used = memory_usage.max(memory_requests);

        Ok(NodeFeatures {
            cpu_used,
            memory_used,
            fs_used,
            fs_write_rate,
            cpu_free: cpu_allocatable - cpu_used,
            memory_free: memory_allocatable - memory_used,
            fs_free: fs_limit - fs_used,
            fs_read_rate,
        })
    }
}

#[async_trait]
impl ClusterMetricsSource for PrometheusSource {
    async fn query_cluster_features(
        &self,
        nodes: &[String],
    ) -> Result<ClusterState, SchedulerError> {
        let mut rows = Vec::with_capacity(nodes.len());
        for node in nodes {
            let features = self.query_node(node).await.map_err(|message| {
                warn!(node = %node, error = %message, "Failed to query node metrics");
                SchedulerError::MetricsQuery {
                    node: node.clone(),
                    message,
                }
            })?;
            rows.push((node.clone(), features));
        }
        Ok(ClusterState::new(rows))
    }
}
