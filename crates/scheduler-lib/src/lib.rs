//! Learned node scoring for the Kubernetes scheduler
//!
//! This crate provides the core functionality for:
//! - Cluster telemetry collection from Prometheus
//! - A DQN agent (replay memory, exploration schedule, online/target value functions)
//! - Reward attribution per (service, role)
//! - The Pre-Score / Score / Normalize-Score decision protocol
//! - A scheduler-extender adapter, health checks and observability

pub mod collector;
pub mod dqn;
pub mod error;
pub mod extender;
pub mod health;
pub mod models;
pub mod observability;
pub mod plugin;
pub mod reward;

pub use error::{ModelError, SchedulerError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{SchedulerMetrics, StructuredLogger};
