//! Issue identification against a cluster snapshot

use crate::models::{ClusterSnapshot, Readiness, WorkloadPhase};
use serde::Serialize;

/// Restart count above which a workload is considered crash-looping
pub const RESTART_THRESHOLD: u32 = 5;
/// CPU utilization above which a node counts as overloaded
pub const HIGH_CPU_THRESHOLD_PCT: f64 = 90.0;

/// Discrete problem kinds, each mapped to exactly one corrective action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueKind {
    FailedWorkloads,
    NotReadyNodes,
    HighCpuNodes,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::FailedWorkloads => "failed-workloads",
            IssueKind::NotReadyNodes => "not-ready-nodes",
            IssueKind::HighCpuNodes => "high-cpu-nodes",
        }
    }
}

impl std::fmt::Display for IssueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resource named by an issue
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceRef {
    pub name: String,
    /// `None` for cluster-scoped resources such as nodes
    pub namespace: Option<String>,
}

impl std::fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}", ns, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// One identified issue and every resource matching it
#[derive(Debug, Clone, Serialize)]
pub struct Issue {
    pub kind: IssueKind,
    pub resources: Vec<ResourceRef>,
}

/// Find every issue present in the snapshot. Issues with no matching
/// resources are omitted. Nodes without utilization data never count as
/// high-CPU.
pub fn identify_issues(snapshot: &ClusterSnapshot) -> Vec<Issue> {
    let failed_workloads: Vec<ResourceRef> = snapshot
        .workloads
        .iter()
        .filter(|w| w.phase == WorkloadPhase::Failed || w.restart_count > RESTART_THRESHOLD)
        .map(|w| ResourceRef {
            name: w.name.clone(),
            namespace: Some(w.namespace.clone()),
        })
        .collect();

    let not_ready_nodes: Vec<ResourceRef> = snapshot
        .nodes
        .iter()
        .filter(|n| n.readiness != Readiness::Ready)
        .map(|n| ResourceRef {
            name: n.name.clone(),
            namespace: None,
        })
        .collect();

    let high_cpu_nodes: Vec<ResourceRef> = snapshot
        .nodes
        .iter()
        .filter(|n| {
            n.cpu_utilization_pct
                .map_or(false, |cpu| cpu > HIGH_CPU_THRESHOLD_PCT)
        })
        .map(|n| ResourceRef {
            name: n.name.clone(),
            namespace: None,
        })
        .collect();

    [
        (IssueKind::FailedWorkloads, failed_workloads),
        (IssueKind::NotReadyNodes, not_ready_nodes),
        (IssueKind::HighCpuNodes, high_cpu_nodes),
    ]
    .into_iter()
    .filter(|(_, resources)| !resources.is_empty())
    .map(|(kind, resources)| Issue { kind, resources })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::build_snapshot;
    use crate::aggregator::fixtures::{node, reference_snapshot, workload};
    use chrono::Utc;

    fn kinds(issues: &[Issue]) -> Vec<IssueKind> {
        issues.iter().map(|i| i.kind).collect()
    }

    #[test]
    fn test_reference_scenario_issues() {
        let issues = identify_issues(&reference_snapshot(0));

        assert_eq!(
            kinds(&issues),
            vec![IssueKind::FailedWorkloads, IssueKind::NotReadyNodes]
        );
        assert_eq!(issues[0].resources[0].name, "batch-0");
        assert_eq!(issues[1].resources[0].name, "node-4");
    }

    #[test]
    fn test_failed_workload_with_restarts_is_identified() {
        let issues = identify_issues(&reference_snapshot(7));
        assert_eq!(issues[0].kind, IssueKind::FailedWorkloads);
        assert_eq!(issues[0].resources.len(), 1);
    }

    #[test]
    fn test_restart_threshold_alone_triggers() {
        let snapshot = build_snapshot(
            vec![node("n1", Readiness::Ready, None)],
            vec![
                workload("looping", WorkloadPhase::Running, 6),
                workload("steady", WorkloadPhase::Running, 5),
            ],
            Vec::new(),
            Utc::now(),
        );

        let issues = identify_issues(&snapshot);
        assert_eq!(kinds(&issues), vec![IssueKind::FailedWorkloads]);
        assert_eq!(issues[0].resources[0].name, "looping");
        assert_eq!(issues[0].resources[0].namespace.as_deref(), Some("default"));
    }

    #[test]
    fn test_high_cpu_ignores_unknown_utilization() {
        let snapshot = build_snapshot(
            vec![
                node("hot", Readiness::Ready, Some(95.0)),
                node("edge", Readiness::Ready, Some(90.0)),
                node("unmeasured", Readiness::Ready, None),
            ],
            Vec::new(),
            Vec::new(),
            Utc::now(),
        );

        let issues = identify_issues(&snapshot);
        assert_eq!(kinds(&issues), vec![IssueKind::HighCpuNodes]);
        assert_eq!(issues[0].resources.len(), 1);
        assert_eq!(issues[0].resources[0].name, "hot");
    }

    #[test]
    fn test_unknown_readiness_is_not_ready() {
        let snapshot = build_snapshot(
            vec![node("n1", Readiness::Unknown, None)],
            Vec::new(),
            Vec::new(),
            Utc::now(),
        );
        assert_eq!(kinds(&identify_issues(&snapshot)), vec![IssueKind::NotReadyNodes]);
    }

    #[test]
    fn test_issue_kind_names() {
        assert_eq!(IssueKind::FailedWorkloads.to_string(), "failed-workloads");
        assert_eq!(IssueKind::NotReadyNodes.to_string(), "not-ready-nodes");
        assert_eq!(IssueKind::HighCpuNodes.to_string(), "high-cpu-nodes");
    }
}
