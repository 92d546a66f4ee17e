//! Control-plane client seams
//!
//! The orchestrator is an external collaborator: these traits describe the
//! queries the health collector issues and the commands the remediation engine
//! dispatches. [`KubeControlPlane`] implements both against a Kubernetes API
//! server; tests substitute in-memory fakes.

mod kubernetes;

pub use kubernetes::KubeControlPlane;

use crate::error::{ControlPlaneError, RemediationError};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Endpoints, Node, Pod, Service};

/// Raw resource usage for one node as reported by the metrics pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct NodeUsage {
    pub name: String,
    /// CPU quantity, e.g. `"250m"` or `"123456789n"`
    pub cpu: String,
    /// Memory quantity, e.g. `"2048Mi"`
    pub memory: String,
}

/// Read-only queries against the orchestrator
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// List every node in the cluster
    async fn list_nodes(&self) -> Result<Vec<Node>, ControlPlaneError>;

    /// List workloads across all namespaces
    async fn list_workloads(&self) -> Result<Vec<Pod>, ControlPlaneError>;

    /// List services across all namespaces
    async fn list_services(&self) -> Result<Vec<Service>, ControlPlaneError>;

    /// List service endpoints across all namespaces
    async fn list_endpoints(&self) -> Result<Vec<Endpoints>, ControlPlaneError>;

    /// Current node usage, if a metrics pipeline is installed
    async fn list_node_usage(&self) -> Result<Vec<NodeUsage>, ControlPlaneError> {
        Ok(Vec::new())
    }
}

/// Mutating commands used by remediation actions
#[async_trait]
pub trait RemediationCommands: Send + Sync {
    /// Delete a workload so the orchestrator reschedules it
    async fn delete_workload(
        &self,
        name: &str,
        namespace: &str,
        force: bool,
    ) -> Result<(), RemediationError>;

    /// Cordon a node and evict everything on it except daemon-managed workloads.
    /// Returns the number of evicted workloads.
    async fn drain_node(&self, name: &str) -> Result<usize, RemediationError>;

    /// Mark a node schedulable again
    async fn uncordon_node(&self, name: &str) -> Result<(), RemediationError>;

    /// Current desired replica count of a deployment
    async fn deployment_replicas(&self, name: &str, namespace: &str)
        -> Result<i32, RemediationError>;

    /// Set the desired replica count of a deployment
    async fn scale_deployment(
        &self,
        name: &str,
        namespace: &str,
        replicas: i32,
    ) -> Result<(), RemediationError>;
}

/// Pods that a drain leaves in place: DaemonSet members and static mirror pods
pub fn is_daemon_managed(pod: &Pod) -> bool {
    let owned_by_daemonset = pod
        .metadata
        .owner_references
        .as_ref()
        .map(|refs| refs.iter().any(|r| r.kind == "DaemonSet"))
        .unwrap_or(false);

    let is_mirror = pod
        .metadata
        .annotations
        .as_ref()
        .map(|a| a.contains_key("kubernetes.io/config.mirror"))
        .unwrap_or(false);

    owned_by_daemonset || is_mirror
}
