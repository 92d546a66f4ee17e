//! Cluster health supervisor and edge offload coordinator
//!
//! This crate provides the core functionality for:
//! - Polling the control plane and classifying cluster health
//! - Automated, non-overlapping remediation of identified issues
//! - Scoring edge targets and offloading static content to them
//! - Deep health checks, self-health and observability

pub mod aggregator;
pub mod collector;
pub mod control_plane;
pub mod deep_check;
pub mod edge;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod offload;
pub mod remediation;
pub mod scheduler;
pub mod supervisor;

pub use error::{BuildError, ControlPlaneError, EdgeError, RemediationError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{StructuredLogger, SupervisorMetrics};
pub use scheduler::{Scheduler, SchedulerConfig};
pub use supervisor::{ClusterSupervisor, Supervisor};
