//! Error types for the supervisor's external boundaries

use std::time::Duration;
use thiserror::Error;

/// Failure talking to, or interpreting data from, the orchestrator
#[derive(Debug, Error)]
pub enum ControlPlaneError {
    #[error("control plane request failed: {0}")]
    Api(#[from] kube::Error),

    #[error("control plane request timed out after {0:?}")]
    Timeout(Duration),

    #[error("malformed {kind} record: {reason}")]
    Malformed { kind: &'static str, reason: String },

    #[error("{0}")]
    Other(String),
}

/// Failure of a single remediation command
#[derive(Debug, Error)]
pub enum RemediationError {
    #[error(transparent)]
    ControlPlane(#[from] ControlPlaneError),

    #[error("remediation command timed out after {0:?}")]
    Timeout(Duration),

    #[error("drain of node {node} incomplete: {failed} eviction(s) failed")]
    PartialDrain { node: String, failed: usize },
}

/// Failure of an edge provider deploy or probe
#[derive(Debug, Error)]
pub enum EdgeError {
    #[error("edge request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("edge target {target} responded with HTTP {status}")]
    Status { target: String, status: u16 },

    #[error("edge request timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid endpoint for edge target {target}: {reason}")]
    InvalidEndpoint { target: String, reason: String },
}

/// Failure of the static build collaborator
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("no build artifact found for route {0}")]
    NotFound(String),

    #[error("failed to read build artifact: {0}")]
    Io(#[from] std::io::Error),

    #[error("build timed out after {0:?}")]
    Timeout(Duration),
}
