//! Core data models for the cluster supervisor and edge coordinator

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Node readiness as reported by the control plane's `Ready` condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Readiness {
    Ready,
    NotReady,
    Unknown,
}

/// One compute node in the cluster
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeHealth {
    pub name: String,
    pub readiness: Readiness,
    /// `None` when no usage data was available for the node
    pub cpu_utilization_pct: Option<f64>,
    pub memory_utilization_pct: Option<f64>,
    pub disk_utilization_pct: Option<f64>,
    pub last_observed_at: DateTime<Utc>,
}

/// Lifecycle phase of a workload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkloadPhase {
    Running,
    Pending,
    Succeeded,
    Failed,
    Unknown,
}

/// One scheduled unit (pod) in a namespace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadHealth {
    pub name: String,
    pub namespace: String,
    pub phase: WorkloadPhase,
    pub restart_count: u32,
    pub age_seconds: u64,
}

/// One network-exposed service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub name: String,
    pub namespace: String,
    pub endpoint_count: u32,
}

/// Tri-state classification of the whole cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterStatus {
    Healthy,
    Degraded,
    Critical,
}

impl std::fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClusterStatus::Healthy => write!(f, "healthy"),
            ClusterStatus::Degraded => write!(f, "degraded"),
            ClusterStatus::Critical => write!(f, "critical"),
        }
    }
}

/// Point-in-time view of the cluster, rebuilt on every fast-loop tick
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    pub nodes: Vec<NodeHealth>,
    pub workloads: Vec<WorkloadHealth>,
    pub services: Vec<ServiceHealth>,
    pub ready_node_ratio: f64,
    pub running_workload_ratio: f64,
    pub overall_status: ClusterStatus,
    pub observed_at: DateTime<Utc>,
}

/// Edge-compute provider flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    WorkerRuntime,
    EdgeFunctionRuntime,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::WorkerRuntime => write!(f, "worker_runtime"),
            ProviderKind::EdgeFunctionRuntime => write!(f, "edge_function_runtime"),
        }
    }
}

/// One edge-compute provider binding with its live scores
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeTarget {
    pub name: String,
    pub provider_kind: ProviderKind,
    pub endpoint: String,
    pub capacity_weight: u32,
    pub latency_ms: f64,
    pub reliability_pct: f64,
    pub active: bool,
}

impl EdgeTarget {
    /// Create an active target with perfect reliability and no latency sample yet
    pub fn new(
        name: impl Into<String>,
        provider_kind: ProviderKind,
        endpoint: impl Into<String>,
        capacity_weight: u32,
    ) -> Self {
        Self {
            name: name.into(),
            provider_kind,
            endpoint: endpoint.into(),
            capacity_weight,
            latency_ms: 0.0,
            reliability_pct: 100.0,
            active: true,
        }
    }
}

/// Publishing priority of a route
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PagePriority {
    Critical,
    High,
    Medium,
    Low,
}

/// Edge caching policy for a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStrategy {
    Aggressive,
    Normal,
}

impl CacheStrategy {
    /// Critical and High priority pages are cached aggressively
    pub fn for_priority(priority: PagePriority) -> Self {
        match priority {
            PagePriority::Critical | PagePriority::High => CacheStrategy::Aggressive,
            PagePriority::Medium | PagePriority::Low => CacheStrategy::Normal,
        }
    }

    /// `Cache-Control` header value sent to edge targets
    pub fn cache_control(&self) -> &'static str {
        match self {
            CacheStrategy::Aggressive => "public, max-age=86400, stale-while-revalidate=604800",
            CacheStrategy::Normal => "public, max-age=300",
        }
    }
}

/// One route's deployable artifact
#[derive(Debug, Clone, Serialize)]
pub struct StaticPage {
    pub route: String,
    #[serde(skip_serializing)]
    pub content: Vec<u8>,
    pub dependencies: BTreeSet<String>,
    pub size_bytes: u64,
    pub content_hash: String,
    pub priority: PagePriority,
    pub cache_strategy: CacheStrategy,
    pub built_at: DateTime<Utc>,
}
