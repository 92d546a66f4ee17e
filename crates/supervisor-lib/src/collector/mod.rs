//! Cluster health collection
//!
//! Queries the control plane for nodes, workloads and services, normalizes the
//! raw objects into typed health records and hands the result to the
//! aggregator. Each resource class is fetched under its own timeout; a class
//! that fails or returns malformed data degrades to an empty collection so the
//! rest of the snapshot still gets built.

pub mod normalize;

use crate::aggregator;
use crate::control_plane::{ControlPlane, NodeUsage};
use crate::error::ControlPlaneError;
use crate::models::ClusterSnapshot;
use chrono::Utc;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default per-class timeout for control-plane queries
pub const DEFAULT_COLLECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for the health collector
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Upper bound on each resource-class query
    pub timeout: Duration,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_COLLECTION_TIMEOUT,
        }
    }
}

/// Resource classes collected on every tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceClass {
    Nodes,
    Workloads,
    Services,
}

impl std::fmt::Display for ResourceClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceClass::Nodes => write!(f, "nodes"),
            ResourceClass::Workloads => write!(f, "workloads"),
            ResourceClass::Services => write!(f, "services"),
        }
    }
}

/// A resource class that degraded to an empty collection
#[derive(Debug, Clone)]
pub struct ClassFailure {
    pub class: ResourceClass,
    pub reason: String,
}

/// Snapshot plus the classes that could not be collected
#[derive(Debug, Clone)]
pub struct Collection {
    pub snapshot: ClusterSnapshot,
    pub failures: Vec<ClassFailure>,
}

/// Polls the control plane and builds cluster snapshots
pub struct HealthCollector {
    control_plane: Arc<dyn ControlPlane>,
    config: CollectorConfig,
}

impl HealthCollector {
    pub fn new(control_plane: Arc<dyn ControlPlane>, config: CollectorConfig) -> Self {
        Self {
            control_plane,
            config,
        }
    }

    /// Build a fresh snapshot; never fails as a whole
    pub async fn collect(&self) -> ClusterSnapshot {
        self.collect_with_failures().await.snapshot
    }

    /// Build a fresh snapshot and report which classes degraded
    pub async fn collect_with_failures(&self) -> Collection {
        let now = Utc::now();
        let cp = &self.control_plane;

        let (nodes, usage, pods, services, endpoints) = tokio::join!(
            self.bounded(cp.list_nodes()),
            self.bounded(cp.list_node_usage()),
            self.bounded(cp.list_workloads()),
            self.bounded(cp.list_services()),
            self.bounded(cp.list_endpoints()),
        );

        let usage = usage.unwrap_or_else(|e| {
            debug!(error = %e, "Node usage unavailable, utilization unknown");
            Vec::new()
        });
        let usage_by_node: HashMap<&str, &NodeUsage> =
            usage.iter().map(|u| (u.name.as_str(), u)).collect();

        let mut failures = Vec::new();

        let nodes = nodes.and_then(|nodes| {
            nodes
                .iter()
                .map(|node| {
                    let usage = node
                        .metadata
                        .name
                        .as_deref()
                        .and_then(|name| usage_by_node.get(name).copied());
                    normalize::node_health(node, usage, now)
                })
                .collect::<Result<Vec<_>, _>>()
        });
        let nodes = degrade(ResourceClass::Nodes, nodes, &mut failures);

        let workloads = pods.and_then(|pods| {
            pods.iter()
                .map(|pod| normalize::workload_health(pod, now))
                .collect::<Result<Vec<_>, _>>()
        });
        let workloads = degrade(ResourceClass::Workloads, workloads, &mut failures);

        let services = services.and_then(|services| {
            let counts = normalize::endpoint_counts(&endpoints?);
            services
                .iter()
                .map(|svc| normalize::service_health(svc, &counts))
                .collect::<Result<Vec<_>, _>>()
        });
        let services = degrade(ResourceClass::Services, services, &mut failures);

        Collection {
            snapshot: aggregator::build_snapshot(nodes, workloads, services, now),
            failures,
        }
    }

    async fn bounded<T, F>(&self, query: F) -> Result<T, ControlPlaneError>
    where
        F: Future<Output = Result<T, ControlPlaneError>>,
    {
        match tokio::time::timeout(self.config.timeout, query).await {
            Ok(result) => result,
            Err(_) => Err(ControlPlaneError::Timeout(self.config.timeout)),
        }
    }
}

fn degrade<T>(
    class: ResourceClass,
    result: Result<Vec<T>, ControlPlaneError>,
    failures: &mut Vec<ClassFailure>,
) -> Vec<T> {
    match result {
        Ok(records) => records,
        Err(e) => {
            warn!(class = %class, error = %e, "Collection failed, using empty collection");
            failures.push(ClassFailure {
                class,
                reason: e.to_string(),
            });
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClusterStatus, Readiness};
    use async_trait::async_trait;
    use k8s_openapi::api::core::v1::{Endpoints, Node, Pod, Service};
    use serde_json::json;

    /// In-memory control plane with switchable failure modes
    #[derive(Default)]
    struct FakeControlPlane {
        nodes: Vec<Node>,
        pods: Vec<Pod>,
        services: Vec<Service>,
        fail_services: bool,
        slow_nodes: bool,
    }

    #[async_trait]
    impl ControlPlane for FakeControlPlane {
        async fn list_nodes(&self) -> Result<Vec<Node>, ControlPlaneError> {
            if self.slow_nodes {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            Ok(self.nodes.clone())
        }

        async fn list_workloads(&self) -> Result<Vec<Pod>, ControlPlaneError> {
            Ok(self.pods.clone())
        }

        async fn list_services(&self) -> Result<Vec<Service>, ControlPlaneError> {
            if self.fail_services {
                return Err(ControlPlaneError::Other("connection refused".to_string()));
            }
            Ok(self.services.clone())
        }

        async fn list_endpoints(&self) -> Result<Vec<Endpoints>, ControlPlaneError> {
            Ok(Vec::new())
        }
    }

    fn node(name: &str, ready: bool) -> Node {
        serde_json::from_value(json!({
            "metadata": { "name": name },
            "status": {
                "conditions": [{ "type": "Ready", "status": if ready { "True" } else { "False" } }]
            }
        }))
        .unwrap()
    }

    fn pod(name: &str, phase: &str) -> Pod {
        serde_json::from_value(json!({
            "metadata": { "name": name, "namespace": "default" },
            "status": { "phase": phase }
        }))
        .unwrap()
    }

    fn service(name: &str) -> Service {
        serde_json::from_value(json!({
            "metadata": { "name": name, "namespace": "default" }
        }))
        .unwrap()
    }

    fn collector(cp: FakeControlPlane) -> HealthCollector {
        HealthCollector::new(
            Arc::new(cp),
            CollectorConfig {
                timeout: Duration::from_millis(100),
            },
        )
    }

    #[tokio::test]
    async fn test_collect_builds_typed_snapshot() {
        let cp = FakeControlPlane {
            nodes: vec![node("n1", true), node("n2", false)],
            pods: vec![pod("a", "Running"), pod("b", "Running")],
            services: vec![service("web")],
            ..Default::default()
        };

        let collection = collector(cp).collect_with_failures().await;
        let snapshot = collection.snapshot;

        assert!(collection.failures.is_empty());
        assert_eq!(snapshot.nodes.len(), 2);
        assert_eq!(snapshot.nodes[1].readiness, Readiness::NotReady);
        assert_eq!(snapshot.workloads.len(), 2);
        assert_eq!(snapshot.services.len(), 1);
        assert_eq!(snapshot.ready_node_ratio, 0.5);
        assert_eq!(snapshot.overall_status, ClusterStatus::Critical);
    }

    #[tokio::test]
    async fn test_failed_class_degrades_to_empty() {
        let cp = FakeControlPlane {
            nodes: vec![node("n1", true)],
            pods: vec![pod("a", "Running")],
            services: vec![service("web")],
            fail_services: true,
            ..Default::default()
        };

        let collection = collector(cp).collect_with_failures().await;

        assert_eq!(collection.failures.len(), 1);
        assert_eq!(collection.failures[0].class, ResourceClass::Services);
        assert!(collection.snapshot.services.is_empty());
        assert_eq!(collection.snapshot.nodes.len(), 1);
        assert_eq!(collection.snapshot.workloads.len(), 1);
    }

    #[tokio::test]
    async fn test_slow_class_times_out() {
        let cp = FakeControlPlane {
            nodes: vec![node("n1", true)],
            pods: vec![pod("a", "Running")],
            slow_nodes: true,
            ..Default::default()
        };

        let started = std::time::Instant::now();
        let collection = collector(cp).collect_with_failures().await;

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(collection.failures[0].class, ResourceClass::Nodes);
        assert!(collection.snapshot.nodes.is_empty());
        assert_eq!(collection.snapshot.workloads.len(), 1);
        // No nodes observed counts as fully ready
        assert_eq!(collection.snapshot.ready_node_ratio, 1.0);
    }

    #[tokio::test]
    async fn test_malformed_record_empties_its_class() {
        let nameless: Pod =
            serde_json::from_value(json!({ "metadata": { "namespace": "default" } })).unwrap();
        let cp = FakeControlPlane {
            nodes: vec![node("n1", true)],
            pods: vec![pod("a", "Running"), nameless],
            ..Default::default()
        };

        let collection = collector(cp).collect_with_failures().await;

        assert_eq!(collection.failures[0].class, ResourceClass::Workloads);
        assert!(collection.snapshot.workloads.is_empty());
        assert_eq!(collection.snapshot.nodes.len(), 1);
    }
}
