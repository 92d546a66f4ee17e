//! Reduces per-resource health records into a single cluster classification

use crate::models::{
    ClusterSnapshot, ClusterStatus, NodeHealth, Readiness, ServiceHealth, WorkloadHealth,
    WorkloadPhase,
};
use chrono::{DateTime, Utc};

/// Minimum ready-node ratio for a healthy cluster
pub const HEALTHY_NODE_RATIO: f64 = 0.8;
/// Minimum running-workload ratio for a healthy cluster
pub const HEALTHY_WORKLOAD_RATIO: f64 = 0.9;
/// Minimum ready-node ratio for a degraded (not critical) cluster
pub const DEGRADED_NODE_RATIO: f64 = 0.6;
/// Minimum running-workload ratio for a degraded (not critical) cluster
pub const DEGRADED_WORKLOAD_RATIO: f64 = 0.7;

/// Fraction of nodes reporting Ready; 1.0 when no nodes were observed
pub fn ready_node_ratio(nodes: &[NodeHealth]) -> f64 {
    ratio(
        nodes.iter().filter(|n| n.readiness == Readiness::Ready).count(),
        nodes.len(),
    )
}

/// Fraction of workloads in the Running phase; 1.0 when none were observed
pub fn running_workload_ratio(workloads: &[WorkloadHealth]) -> f64 {
    ratio(
        workloads
            .iter()
            .filter(|w| w.phase == WorkloadPhase::Running)
            .count(),
        workloads.len(),
    )
}

fn ratio(matching: usize, total: usize) -> f64 {
    if total == 0 {
        1.0
    } else {
        matching as f64 / total as f64
    }
}

/// Classify the cluster from its two ratios
pub fn classify(ready_node_ratio: f64, running_workload_ratio: f64) -> ClusterStatus {
    if ready_node_ratio >= HEALTHY_NODE_RATIO && running_workload_ratio >= HEALTHY_WORKLOAD_RATIO {
        ClusterStatus::Healthy
    } else if ready_node_ratio >= DEGRADED_NODE_RATIO
        && running_workload_ratio >= DEGRADED_WORKLOAD_RATIO
    {
        ClusterStatus::Degraded
    } else {
        ClusterStatus::Critical
    }
}

/// Assemble an immutable snapshot with its derived ratios and status
pub fn build_snapshot(
    nodes: Vec<NodeHealth>,
    workloads: Vec<WorkloadHealth>,
    services: Vec<ServiceHealth>,
    observed_at: DateTime<Utc>,
) -> ClusterSnapshot {
    let ready_node_ratio = ready_node_ratio(&nodes);
    let running_workload_ratio = running_workload_ratio(&workloads);

    ClusterSnapshot {
        nodes,
        workloads,
        services,
        ready_node_ratio,
        running_workload_ratio,
        overall_status: classify(ready_node_ratio, running_workload_ratio),
        observed_at,
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn node(name: &str, readiness: Readiness, cpu: Option<f64>) -> NodeHealth {
        NodeHealth {
            name: name.to_string(),
            readiness,
            cpu_utilization_pct: cpu,
            memory_utilization_pct: None,
            disk_utilization_pct: None,
            last_observed_at: Utc::now(),
        }
    }

    pub fn workload(name: &str, phase: WorkloadPhase, restart_count: u32) -> WorkloadHealth {
        WorkloadHealth {
            name: name.to_string(),
            namespace: "default".to_string(),
            phase,
            restart_count,
            age_seconds: 3600,
        }
    }

    /// 5 nodes (4 Ready, 1 NotReady) and 20 workloads (19 Running, 1 Failed)
    pub fn reference_snapshot(failed_restarts: u32) -> ClusterSnapshot {
        let mut nodes: Vec<_> = (0..4)
            .map(|i| node(&format!("node-{}", i), Readiness::Ready, Some(40.0)))
            .collect();
        nodes.push(node("node-4", Readiness::NotReady, None));

        let mut workloads: Vec<_> = (0..19)
            .map(|i| workload(&format!("web-{}", i), WorkloadPhase::Running, 0))
            .collect();
        workloads.push(workload("batch-0", WorkloadPhase::Failed, failed_restarts));

        build_snapshot(nodes, workloads, Vec::new(), Utc::now())
    }
}
