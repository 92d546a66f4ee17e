//! Observability infrastructure for the supervisor
//!
//! Provides:
//! - Prometheus metrics (cluster classification, collection latency, remediation
//!   outcomes, edge target scores, page builds/deploys, deep-check failures)
//! - Structured JSON logging with tracing, keyed by a stable `event` field

use crate::models::{ClusterSnapshot, ClusterStatus, EdgeTarget};
use crate::remediation::{IssueKind, PassReport};
use prometheus::{
    register_gauge, register_gauge_vec, register_histogram, register_int_counter_vec,
    register_int_gauge, Gauge, GaugeVec, Histogram, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{debug, error, info, warn};

/// Histogram buckets for control-plane collection latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<SupervisorMetricsInner> = OnceLock::new();

struct SupervisorMetricsInner {
    cluster_status: IntGauge,
    ready_node_ratio: Gauge,
    running_workload_ratio: Gauge,
    collection_latency_seconds: Histogram,
    collection_errors: IntCounterVec,
    remediation_passes: IntCounterVec,
    remediation_actions: IntCounterVec,
    edge_reliability_pct: GaugeVec,
    edge_latency_ms: GaugeVec,
    edge_capacity_weight: GaugeVec,
    edge_active: GaugeVec,
    page_builds: IntCounterVec,
    page_deploys: IntCounterVec,
    deep_check_failures: IntCounterVec,
}

impl SupervisorMetricsInner {
    fn new() -> Self {
        Self {
            cluster_status: register_int_gauge!(
                "cluster_supervisor_cluster_status",
                "Overall cluster classification (0=healthy, 1=degraded, 2=critical)"
            )
            .expect("Failed to register cluster_status"),

            ready_node_ratio: register_gauge!(
                "cluster_supervisor_ready_node_ratio",
                "Fraction of nodes reporting Ready in the latest snapshot"
            )
            .expect("Failed to register ready_node_ratio"),

            running_workload_ratio: register_gauge!(
                "cluster_supervisor_running_workload_ratio",
                "Fraction of workloads in the Running phase in the latest snapshot"
            )
            .expect("Failed to register running_workload_ratio"),

            collection_latency_seconds: register_histogram!(
                "cluster_supervisor_collection_latency_seconds",
                "Time spent building a cluster snapshot",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register collection_latency_seconds"),

            collection_errors: register_int_counter_vec!(
                "cluster_supervisor_collection_errors_total",
                "Resource classes that degraded to an empty collection",
                &["class"]
            )
            .expect("Failed to register collection_errors"),

            remediation_passes: register_int_counter_vec!(
                "cluster_supervisor_remediation_passes_total",
                "Remediation passes by outcome",
                &["outcome"]
            )
            .expect("Failed to register remediation_passes"),

            remediation_actions: register_int_counter_vec!(
                "cluster_supervisor_remediation_actions_total",
                "Remediation actions by issue kind and result",
                &["issue", "result"]
            )
            .expect("Failed to register remediation_actions"),

            edge_reliability_pct: register_gauge_vec!(
                "cluster_supervisor_edge_reliability_pct",
                "Current reliability score per edge target",
                &["target"]
            )
            .expect("Failed to register edge_reliability_pct"),

            edge_latency_ms: register_gauge_vec!(
                "cluster_supervisor_edge_latency_ms",
                "Last sampled latency per edge target",
                &["target"]
            )
            .expect("Failed to register edge_latency_ms"),

            edge_capacity_weight: register_gauge_vec!(
                "cluster_supervisor_edge_capacity_weight",
                "Traffic weight assigned per edge target",
                &["target"]
            )
            .expect("Failed to register edge_capacity_weight"),

            edge_active: register_gauge_vec!(
                "cluster_supervisor_edge_active",
                "Whether an edge target is active (1) or deactivated (0)",
                &["target"]
            )
            .expect("Failed to register edge_active"),

            page_builds: register_int_counter_vec!(
                "cluster_supervisor_page_builds_total",
                "Static page builds by result",
                &["result"]
            )
            .expect("Failed to register page_builds"),

            page_deploys: register_int_counter_vec!(
                "cluster_supervisor_page_deploys_total",
                "Static page deployments by edge target and result",
                &["target", "result"]
            )
            .expect("Failed to register page_deploys"),

            deep_check_failures: register_int_counter_vec!(
                "cluster_supervisor_deep_check_failures_total",
                "Failed deep health checks by check kind",
                &["check"]
            )
            .expect("Failed to register deep_check_failures"),
        }
    }
}

fn result_label(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "failure"
    }
}

/// Supervisor metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the same
/// underlying collectors.
#[derive(Clone)]
pub struct SupervisorMetrics {
    _private: (),
}

impl Default for SupervisorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SupervisorMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(SupervisorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &SupervisorMetricsInner {
        GLOBAL_METRICS.get_or_init(SupervisorMetricsInner::new)
    }

    /// Record the classification and ratios of a fresh snapshot
    pub fn record_snapshot(&self, snapshot: &ClusterSnapshot) {
        let status = match snapshot.overall_status {
            ClusterStatus::Healthy => 0,
            ClusterStatus::Degraded => 1,
            ClusterStatus::Critical => 2,
        };
        self.inner().cluster_status.set(status);
        self.inner().ready_node_ratio.set(snapshot.ready_node_ratio);
        self.inner()
            .running_workload_ratio
            .set(snapshot.running_workload_ratio);
    }

    pub fn observe_collection_latency(&self, duration_secs: f64) {
        self.inner().collection_latency_seconds.observe(duration_secs);
    }

    pub fn inc_collection_errors(&self, class: &str) {
        self.inner()
            .collection_errors
            .with_label_values(&[class])
            .inc();
    }

    /// Count a pass outcome (`completed`, `skipped`)
    pub fn inc_remediation_pass(&self, outcome: &str) {
        self.inner()
            .remediation_passes
            .with_label_values(&[outcome])
            .inc();
    }

    pub fn record_pass_report(&self, report: &PassReport) {
        for action in &report.actions {
            self.inner()
                .remediation_actions
                .with_label_values(&[action.issue.as_str(), result_label(action.error.is_none())])
                .inc();
        }
    }

    /// Mirror every target's current scores into the per-target gauges
    pub fn record_edge_targets(&self, targets: &[EdgeTarget]) {
        let inner = self.inner();
        for target in targets {
            let labels = [target.name.as_str()];
            inner
                .edge_reliability_pct
                .with_label_values(&labels)
                .set(target.reliability_pct);
            inner
                .edge_latency_ms
                .with_label_values(&labels)
                .set(target.latency_ms);
            inner
                .edge_capacity_weight
                .with_label_values(&labels)
                .set(target.capacity_weight as f64);
            inner
                .edge_active
                .with_label_values(&labels)
                .set(if target.active { 1.0 } else { 0.0 });
        }
    }

    pub fn inc_page_build(&self, success: bool) {
        self.inner()
            .page_builds
            .with_label_values(&[result_label(success)])
            .inc();
    }

    pub fn inc_page_deploy(&self, target: &str, success: bool) {
        self.inner()
            .page_deploys
            .with_label_values(&[target, result_label(success)])
            .inc();
    }

    pub fn inc_deep_check_failure(&self, check: &str) {
        self.inner()
            .deep_check_failures
            .with_label_values(&[check])
            .inc();
    }
}

/// Structured logger for supervisor events
///
/// Emits the significant lifecycle events with a stable `event` field so they
/// can be filtered in a JSON log pipeline.
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn log_startup(&self, version: &str, mode: &str) {
        info!(
            event = "supervisor_started",
            instance = %self.instance,
            version = %version,
            mode = %mode,
            "Cluster supervisor started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "supervisor_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Cluster supervisor shutting down"
        );
    }

    pub fn log_cluster_status(&self, snapshot: &ClusterSnapshot, degraded_classes: usize) {
        info!(
            event = "cluster_status",
            instance = %self.instance,
            status = %snapshot.overall_status,
            nodes = snapshot.nodes.len(),
            workloads = snapshot.workloads.len(),
            services = snapshot.services.len(),
            ready_node_ratio = snapshot.ready_node_ratio,
            running_workload_ratio = snapshot.running_workload_ratio,
            degraded_classes = degraded_classes,
            "Cluster snapshot collected"
        );
    }

    /// Elevated severity: Critical has held for consecutive fast ticks
    pub fn log_critical_persisting(&self, consecutive_ticks: u32, snapshot: &ClusterSnapshot) {
        error!(
            event = "critical_status_persisting",
            instance = %self.instance,
            consecutive_ticks = consecutive_ticks,
            ready_node_ratio = snapshot.ready_node_ratio,
            running_workload_ratio = snapshot.running_workload_ratio,
            "Cluster has been critical across consecutive checks, operator attention required"
        );
    }

    pub fn log_remediation_pass(&self, report: &PassReport) {
        let issues: Vec<&str> = report.issues.iter().map(|i| i.as_str()).collect();
        if report.failed() > 0 {
            warn!(
                event = "remediation_pass",
                instance = %self.instance,
                issues = ?issues,
                succeeded = report.succeeded(),
                failed = report.failed(),
                "Remediation pass completed with failures"
            );
        } else {
            info!(
                event = "remediation_pass",
                instance = %self.instance,
                issues = ?issues,
                succeeded = report.succeeded(),
                "Remediation pass completed"
            );
        }
    }

    pub fn log_remediation_skipped(&self, issues: &[IssueKind]) {
        let issues: Vec<&str> = issues.iter().map(|i| i.as_str()).collect();
        info!(
            event = "remediation_skipped",
            instance = %self.instance,
            issues = ?issues,
            "Remediation pass already in flight, skipping dispatch"
        );
    }

    pub fn log_edge_target_deactivated(&self, target: &str, reliability_pct: f64) {
        warn!(
            event = "edge_target_deactivated",
            instance = %self.instance,
            edge_target = %target,
            reliability_pct = reliability_pct,
            "Edge target deactivated after reliability dropped below threshold"
        );
    }

    pub fn log_edge_target_reactivated(&self, target: &str, latency_ms: f64) {
        info!(
            event = "edge_target_reactivated",
            instance = %self.instance,
            edge_target = %target,
            latency_ms = latency_ms,
            "Edge target passed recovery probe and was reactivated"
        );
    }

    pub fn log_deep_check(&self, check: &str, subject: &str, healthy: bool, detail: &str) {
        if healthy {
            debug!(
                event = "deep_check",
                instance = %self.instance,
                check = %check,
                subject = %subject,
                healthy = true,
                "Deep check passed"
            );
        } else {
            warn!(
                event = "deep_check",
                instance = %self.instance,
                check = %check,
                subject = %subject,
                healthy = false,
                detail = %detail,
                "Deep check failed"
            );
        }
    }
}
