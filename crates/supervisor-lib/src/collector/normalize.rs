//! Parse-and-validate boundary between raw control-plane objects and health records

use crate::control_plane::NodeUsage;
use crate::error::ControlPlaneError;
use crate::models::{NodeHealth, Readiness, ServiceHealth, WorkloadHealth, WorkloadPhase};
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::{Endpoints, Node, Pod, Service};
use std::collections::HashMap;

fn malformed(kind: &'static str, reason: impl Into<String>) -> ControlPlaneError {
    ControlPlaneError::Malformed {
        kind,
        reason: reason.into(),
    }
}

/// Convert a node, attaching utilization when usage data is present
pub fn node_health(
    node: &Node,
    usage: Option<&NodeUsage>,
    now: DateTime<Utc>,
) -> Result<NodeHealth, ControlPlaneError> {
    let name = node
        .metadata
        .name
        .clone()
        .ok_or_else(|| malformed("node", "missing metadata.name"))?;

    let readiness = node
        .status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .and_then(|conditions| conditions.iter().find(|c| c.type_ == "Ready"))
        .map(|c| match c.status.as_str() {
            "True" => Readiness::Ready,
            "False" => Readiness::NotReady,
            _ => Readiness::Unknown,
        })
        .unwrap_or(Readiness::Unknown);

    let allocatable = node.status.as_ref().and_then(|s| s.allocatable.as_ref());
    let allocatable_cpu = allocatable
        .and_then(|a| a.get("cpu"))
        .and_then(|q| parse_cpu_millicores(&q.0));
    let allocatable_memory = allocatable
        .and_then(|a| a.get("memory"))
        .and_then(|q| parse_memory_bytes(&q.0));

    let cpu_utilization_pct = usage
        .and_then(|u| parse_cpu_millicores(&u.cpu))
        .zip(allocatable_cpu)
        .and_then(|(used, total)| percentage(used, total));
    let memory_utilization_pct = usage
        .and_then(|u| parse_memory_bytes(&u.memory))
        .zip(allocatable_memory)
        .and_then(|(used, total)| percentage(used, total));

    Ok(NodeHealth {
        name,
        readiness,
        cpu_utilization_pct,
        memory_utilization_pct,
        disk_utilization_pct: None,
        last_observed_at: now,
    })
}

/// Convert a pod into a workload record
pub fn workload_health(pod: &Pod, now: DateTime<Utc>) -> Result<WorkloadHealth, ControlPlaneError> {
    let name = pod
        .metadata
        .name
        .clone()
        .ok_or_else(|| malformed("workload", "missing metadata.name"))?;
    let namespace = pod
        .metadata
        .namespace
        .clone()
        .ok_or_else(|| malformed("workload", format!("{} missing metadata.namespace", name)))?;

    let status = pod.status.as_ref();
    let phase = match status.and_then(|s| s.phase.as_deref()) {
        Some("Running") => WorkloadPhase::Running,
        Some("Pending") => WorkloadPhase::Pending,
        Some("Succeeded") => WorkloadPhase::Succeeded,
        Some("Failed") => WorkloadPhase::Failed,
        _ => WorkloadPhase::Unknown,
    };

    let mut restart_count = 0u32;
    for container in status
        .and_then(|s| s.container_statuses.as_ref())
        .into_iter()
        .flatten()
    {
        let restarts = u32::try_from(container.restart_count).map_err(|_| {
            malformed(
                "workload",
                format!(
                    "{}/{} container {} has negative restart count",
                    namespace, name, container.name
                ),
            )
        })?;
        restart_count = restart_count.saturating_add(restarts);
    }

    let age_seconds = pod
        .metadata
        .creation_timestamp
        .as_ref()
        .map(|created| (now - created.0).num_seconds().max(0) as u64)
        .unwrap_or(0);

    Ok(WorkloadHealth {
        name,
        namespace,
        phase,
        restart_count,
        age_seconds,
    })
}

/// Count ready addresses per (namespace, name)
pub fn endpoint_counts(endpoints: &[Endpoints]) -> HashMap<(String, String), u32> {
    endpoints
        .iter()
        .filter_map(|ep| {
            let name = ep.metadata.name.clone()?;
            let namespace = ep.metadata.namespace.clone()?;
            let count = ep
                .subsets
                .iter()
                .flatten()
                .map(|subset| subset.addresses.as_ref().map_or(0, |a| a.len()))
                .sum::<usize>();
            Some(((namespace, name), count as u32))
        })
        .collect()
}

/// Convert a service, joining its endpoint count
pub fn service_health(
    service: &Service,
    endpoint_counts: &HashMap<(String, String), u32>,
) -> Result<ServiceHealth, ControlPlaneError> {
    let name = service
        .metadata
        .name
        .clone()
        .ok_or_else(|| malformed("service", "missing metadata.name"))?;
    let namespace = service
        .metadata
        .namespace
        .clone()
        .ok_or_else(|| malformed("service", format!("{} missing metadata.namespace", name)))?;

    let endpoint_count = endpoint_counts
        .get(&(namespace.clone(), name.clone()))
        .copied()
        .unwrap_or(0);

    Ok(ServiceHealth {
        name,
        namespace,
        endpoint_count,
    })
}

fn percentage(used: f64, total: f64) -> Option<f64> {
    if total <= 0.0 {
        return None;
    }
    Some((used / total * 100.0).clamp(0.0, 100.0))
}

/// Parse a CPU quantity into millicores
pub fn parse_cpu_millicores(quantity: &str) -> Option<f64> {
    let q = quantity.trim();
    let millicores = if let Some(n) = q.strip_suffix('n') {
        n.parse::<f64>().ok()? / 1e6
    } else if let Some(u) = q.strip_suffix('u') {
        u.parse::<f64>().ok()? / 1e3
    } else if let Some(m) = q.strip_suffix('m') {
        m.parse::<f64>().ok()?
    } else {
        q.parse::<f64>().ok()? * 1000.0
    };

    (millicores >= 0.0).then_some(millicores)
}

/// Parse a memory quantity into bytes
pub fn parse_memory_bytes(quantity: &str) -> Option<f64> {
    const SUFFIXES: &[(&str, f64)] = &[
        ("Ki", 1024.0),
        ("Mi", 1024.0 * 1024.0),
        ("Gi", 1024.0 * 1024.0 * 1024.0),
        ("Ti", 1024.0 * 1024.0 * 1024.0 * 1024.0),
        ("Pi", 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0),
        ("k", 1e3),
        ("M", 1e6),
        ("G", 1e9),
        ("T", 1e12),
        ("P", 1e15),
    ];

    let q = quantity.trim();
    let (number, scale) = SUFFIXES
        .iter()
        .find_map(|(suffix, scale)| q.strip_suffix(suffix).map(|n| (n, *scale)))
        .unwrap_or((q, 1.0));

    let value: f64 = number.parse().ok()?;
    (value >= 0.0).then_some(value * scale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node_json(name: &str, ready: &str) -> Node {
        serde_json::from_value(json!({
            "metadata": { "name": name },
            "status": {
                "conditions": [
                    { "type": "MemoryPressure", "status": "False" },
                    { "type": "Ready", "status": ready }
                ],
                "allocatable": { "cpu": "4", "memory": "8Gi" }
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_node_readiness_from_ready_condition() {
        let now = Utc::now();
        assert_eq!(
            node_health(&node_json("n1", "True"), None, now).unwrap().readiness,
            Readiness::Ready
        );
        assert_eq!(
            node_health(&node_json("n1", "False"), None, now).unwrap().readiness,
            Readiness::NotReady
        );
        assert_eq!(
            node_health(&node_json("n1", "Unknown"), None, now).unwrap().readiness,
            Readiness::Unknown
        );
    }

    #[test]
    fn test_node_without_conditions_is_unknown() {
        let node: Node = serde_json::from_value(json!({ "metadata": { "name": "n1" } })).unwrap();
        let health = node_health(&node, None, Utc::now()).unwrap();
        assert_eq!(health.readiness, Readiness::Unknown);
        assert!(health.cpu_utilization_pct.is_none());
    }

    #[test]
    fn test_node_utilization_from_usage() {
        let usage = NodeUsage {
            name: "n1".to_string(),
            cpu: "3800m".to_string(),
            memory: "2Gi".to_string(),
        };
        let health = node_health(&node_json("n1", "True"), Some(&usage), Utc::now()).unwrap();

        assert!((health.cpu_utilization_pct.unwrap() - 95.0).abs() < 1e-9);
        assert!((health.memory_utilization_pct.unwrap() - 25.0).abs() < 1e-9);
        assert!(health.disk_utilization_pct.is_none());
    }

    #[test]
    fn test_node_without_name_is_malformed() {
        let node: Node = serde_json::from_value(json!({ "metadata": {} })).unwrap();
        assert!(matches!(
            node_health(&node, None, Utc::now()),
            Err(ControlPlaneError::Malformed { kind: "node", .. })
        ));
    }

    #[test]
    fn test_workload_sums_container_restarts() {
        let pod: Pod = serde_json::from_value(json!({
            "metadata": {
                "name": "api-1",
                "namespace": "prod",
                "creationTimestamp": "2024-01-01T00:00:00Z"
            },
            "status": {
                "phase": "Running",
                "containerStatuses": [
                    { "name": "app", "image": "app:1", "imageID": "", "ready": true, "restartCount": 4 },
                    { "name": "sidecar", "image": "proxy:1", "imageID": "", "ready": true, "restartCount": 3 }
                ]
            }
        }))
        .unwrap();

        let now = DateTime::parse_from_rfc3339("2024-01-01T00:10:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let health = workload_health(&pod, now).unwrap();

        assert_eq!(health.phase, WorkloadPhase::Running);
        assert_eq!(health.restart_count, 7);
        assert_eq!(health.age_seconds, 600);
    }

    #[test]
    fn test_workload_phase_mapping() {
        for (raw, expected) in [
            ("Pending", WorkloadPhase::Pending),
            ("Failed", WorkloadPhase::Failed),
            ("Succeeded", WorkloadPhase::Succeeded),
            ("Evicted", WorkloadPhase::Unknown),
        ] {
            let pod: Pod = serde_json::from_value(json!({
                "metadata": { "name": "p", "namespace": "default" },
                "status": { "phase": raw }
            }))
            .unwrap();
            assert_eq!(workload_health(&pod, Utc::now()).unwrap().phase, expected);
        }
    }

    #[test]
    fn test_workload_negative_restart_count_is_malformed() {
        let pod: Pod = serde_json::from_value(json!({
            "metadata": { "name": "p", "namespace": "default" },
            "status": {
                "phase": "Running",
                "containerStatuses": [
                    { "name": "app", "image": "app:1", "imageID": "", "ready": true, "restartCount": -1 }
                ]
            }
        }))
        .unwrap();

        assert!(workload_health(&pod, Utc::now()).is_err());
    }

    #[test]
    fn test_service_joins_endpoint_count() {
        let endpoints: Endpoints = serde_json::from_value(json!({
            "metadata": { "name": "web", "namespace": "prod" },
            "subsets": [
                { "addresses": [ { "ip": "10.0.0.1" }, { "ip": "10.0.0.2" } ] },
                { "addresses": [ { "ip": "10.0.0.3" } ] }
            ]
        }))
        .unwrap();
        let service: Service = serde_json::from_value(json!({
            "metadata": { "name": "web", "namespace": "prod" }
        }))
        .unwrap();
        let orphan: Service = serde_json::from_value(json!({
            "metadata": { "name": "db", "namespace": "prod" }
        }))
        .unwrap();

        let counts = endpoint_counts(&[endpoints]);
        assert_eq!(service_health(&service, &counts).unwrap().endpoint_count, 3);
        assert_eq!(service_health(&orphan, &counts).unwrap().endpoint_count, 0);
    }

    #[test]
    fn test_parse_cpu_quantities() {
        assert_eq!(parse_cpu_millicores("2"), Some(2000.0));
        assert_eq!(parse_cpu_millicores("250m"), Some(250.0));
        assert_eq!(parse_cpu_millicores("500000000n"), Some(500.0));
        assert_eq!(parse_cpu_millicores("1500u"), Some(1.5));
        assert_eq!(parse_cpu_millicores("lots"), None);
    }

    #[test]
    fn test_parse_memory_quantities() {
        assert_eq!(parse_memory_bytes("1Ki"), Some(1024.0));
        assert_eq!(parse_memory_bytes("2Mi"), Some(2.0 * 1024.0 * 1024.0));
        assert_eq!(parse_memory_bytes("1G"), Some(1e9));
        assert_eq!(parse_memory_bytes("512"), Some(512.0));
        assert_eq!(parse_memory_bytes("-1Gi"), None);
    }
}
