//! Process-wide supervisor state
//!
//! [`Supervisor`] owns the two independent halves: the cluster half
//! (collection, classification, remediation, deep checks) and the edge half
//! (content offload and target scoring). Either may be absent when the halves
//! run as separate processes. The scheduler drives both through the tick
//! methods here; the HTTP API reads through the status getters.

use crate::collector::HealthCollector;
use crate::deep_check::{CheckResult, DeepHealthChecker};
use crate::health::{components, HealthRegistry};
use crate::models::{ClusterSnapshot, ClusterStatus, EdgeTarget, StaticPage};
use crate::observability::{StructuredLogger, SupervisorMetrics};
use crate::offload::{OffloadCoordinator, ReoptimizeReport};
use crate::remediation::{identify_issues, IssueKind, RemediationEngine};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Consecutive Critical ticks before operator attention is requested
pub const CRITICAL_ESCALATION_TICKS: u32 = 2;

/// What a fast tick did with the issues it found
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    NoIssues,
    /// A pass was started in the background
    Dispatched(Vec<IssueKind>),
    /// A pass was already in flight
    Skipped(Vec<IssueKind>),
}

#[derive(Debug, Clone)]
pub struct FastTickReport {
    pub status: ClusterStatus,
    pub degraded_classes: usize,
    pub dispatch: Dispatch,
}

/// Cluster half: collector, remediation engine and deep checks
pub struct ClusterSupervisor {
    collector: HealthCollector,
    engine: Arc<RemediationEngine>,
    deep_checker: Option<DeepHealthChecker>,
    latest: RwLock<Option<ClusterSnapshot>>,
    consecutive_critical: AtomicU32,
    in_flight: Mutex<Vec<JoinHandle<()>>>,
    health: HealthRegistry,
    metrics: SupervisorMetrics,
    logger: StructuredLogger,
}

impl ClusterSupervisor {
    pub fn new(
        collector: HealthCollector,
        engine: Arc<RemediationEngine>,
        deep_checker: Option<DeepHealthChecker>,
        health: HealthRegistry,
        metrics: SupervisorMetrics,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            collector,
            engine,
            deep_checker,
            latest: RwLock::new(None),
            consecutive_critical: AtomicU32::new(0),
            in_flight: Mutex::new(Vec::new()),
            health,
            metrics,
            logger,
        }
    }

    pub fn engine(&self) -> &Arc<RemediationEngine> {
        &self.engine
    }

    /// Latest snapshot, if a fast tick has completed
    pub async fn latest(&self) -> Option<ClusterSnapshot> {
        self.latest.read().await.clone()
    }

    pub fn consecutive_critical(&self) -> u32 {
        self.consecutive_critical.load(Ordering::SeqCst)
    }

    /// Collect, classify and dispatch remediation. Collection through issue
    /// identification is sequential; the pass itself runs as a background task
    /// group so the tick returns promptly.
    pub async fn fast_tick(&self) -> FastTickReport {
        let started = Instant::now();
        let collection = self.collector.collect_with_failures().await;
        self.metrics
            .observe_collection_latency(started.elapsed().as_secs_f64());

        for failure in &collection.failures {
            self.metrics.inc_collection_errors(&failure.class.to_string());
        }
        if collection.failures.is_empty() {
            self.health.set_healthy(components::COLLECTOR).await;
        } else {
            let classes: Vec<String> = collection
                .failures
                .iter()
                .map(|f| f.class.to_string())
                .collect();
            self.health
                .set_degraded(
                    components::COLLECTOR,
                    format!("collection failed for {}", classes.join(", ")),
                )
                .await;
        }

        let snapshot = collection.snapshot;
        self.metrics.record_snapshot(&snapshot);
        self.logger
            .log_cluster_status(&snapshot, collection.failures.len());
        self.track_critical(&snapshot);

        let issues = identify_issues(&snapshot);
        let status = snapshot.overall_status;
        *self.latest.write().await = Some(snapshot);

        let dispatch = if issues.is_empty() {
            Dispatch::NoIssues
        } else {
            let kinds: Vec<IssueKind> = issues.iter().map(|i| i.kind).collect();
            match self.engine.try_begin_pass() {
                Some(guard) => {
                    let engine = Arc::clone(&self.engine);
                    let health = self.health.clone();
                    let metrics = self.metrics.clone();
                    let logger = self.logger.clone();

                    let handle = tokio::spawn(async move {
                        let report = engine.execute(issues, guard).await;
                        metrics.inc_remediation_pass("completed");
                        metrics.record_pass_report(&report);
                        logger.log_remediation_pass(&report);
                        if report.failed() > 0 {
                            health
                                .set_degraded(
                                    components::REMEDIATION,
                                    format!("{} remediation action(s) failed", report.failed()),
                                )
                                .await;
                        } else {
                            health.set_healthy(components::REMEDIATION).await;
                        }
                    });
                    self.track_pass(handle).await;
                    Dispatch::Dispatched(kinds)
                }
                None => {
                    self.metrics.inc_remediation_pass("skipped");
                    self.logger.log_remediation_skipped(&kinds);
                    Dispatch::Skipped(kinds)
                }
            }
        };

        FastTickReport {
            status,
            degraded_classes: collection.failures.len(),
            dispatch,
        }
    }

    fn track_critical(&self, snapshot: &ClusterSnapshot) {
        if snapshot.overall_status != ClusterStatus::Critical {
            self.consecutive_critical.store(0, Ordering::SeqCst);
            return;
        }

        let consecutive = self.consecutive_critical.fetch_add(1, Ordering::SeqCst) + 1;
        if consecutive >= CRITICAL_ESCALATION_TICKS {
            self.logger.log_critical_persisting(consecutive, snapshot);
        }
    }

    /// A pass releases the engine before its reporting tail finishes, so an
    /// earlier handle may still be running when the next pass is dispatched
    async fn track_pass(&self, handle: JoinHandle<()>) {
        let mut in_flight = self.in_flight.lock().await;
        in_flight.retain(|h| !h.is_finished());
        in_flight.push(handle);
    }

    /// Wait for every background remediation pass still running
    pub async fn wait_for_pass(&self) {
        let handles = std::mem::take(&mut *self.in_flight.lock().await);
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Remediation pass task failed");
            }
        }
    }

    /// Run the extended checks; logs and counts only
    pub async fn deep_tick(&self) -> Vec<CheckResult> {
        match &self.deep_checker {
            Some(checker) => checker.run().await,
            None => {
                debug!("No deep checks configured");
                Vec::new()
            }
        }
    }
}

/// Top-level state object shared by the scheduler and the HTTP API
pub struct Supervisor {
    cluster: Option<Arc<ClusterSupervisor>>,
    edge: Option<Arc<OffloadCoordinator>>,
    health: HealthRegistry,
    logger: StructuredLogger,
}

impl Supervisor {
    pub fn new(
        cluster: Option<ClusterSupervisor>,
        edge: Option<OffloadCoordinator>,
        health: HealthRegistry,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            cluster: cluster.map(Arc::new),
            edge: edge.map(Arc::new),
            health,
            logger,
        }
    }

    pub fn cluster(&self) -> Option<&Arc<ClusterSupervisor>> {
        self.cluster.as_ref()
    }

    pub fn edge(&self) -> Option<&Arc<OffloadCoordinator>> {
        self.edge.as_ref()
    }

    pub fn health(&self) -> &HealthRegistry {
        &self.health
    }

    pub fn logger(&self) -> &StructuredLogger {
        &self.logger
    }

    /// Register the components of the halves present and mark ready
    pub async fn initialize(&self) {
        if self.cluster.is_some() {
            self.health.register(components::COLLECTOR).await;
            self.health.register(components::REMEDIATION).await;
        }
        if self.edge.is_some() {
            self.health.register(components::EDGE_REGISTRY).await;
            self.health.register(components::OFFLOAD).await;
        }
        self.health.set_ready(true).await;
    }

    /// Latest cluster snapshot; `None` before the first fast tick or when
    /// the cluster half is not running here
    pub async fn cluster_status(&self) -> Option<ClusterSnapshot> {
        match &self.cluster {
            Some(cluster) => cluster.latest().await,
            None => None,
        }
    }

    pub fn edge_target_status(&self) -> Vec<EdgeTarget> {
        self.edge
            .as_ref()
            .map(|edge| edge.targets())
            .unwrap_or_default()
    }

    pub async fn static_page_status(&self) -> Vec<StaticPage> {
        match &self.edge {
            Some(edge) => edge.pages().await,
            None => Vec::new(),
        }
    }

    /// Edge performance sampling tick
    pub async fn sample_edges(&self) {
        if let Some(edge) = &self.edge {
            edge.sample_targets().await;
            self.update_edge_health(edge).await;
        }
    }

    /// Edge recovery probe tick
    pub async fn recover_edges(&self) {
        if let Some(edge) = &self.edge {
            edge.recover_targets().await;
            self.update_edge_health(edge).await;
        }
    }

    /// Content re-optimization tick
    pub async fn reoptimize(&self) -> Option<ReoptimizeReport> {
        let edge = self.edge.as_ref()?;
        let report = edge.reoptimize().await;

        if report.build_failures.is_empty() && report.deploy_failures() == 0 {
            self.health.set_healthy(components::OFFLOAD).await;
        } else {
            self.health
                .set_degraded(
                    components::OFFLOAD,
                    format!(
                        "{} build failure(s), {} deploy failure(s)",
                        report.build_failures.len(),
                        report.deploy_failures()
                    ),
                )
                .await;
        }
        self.update_edge_health(edge).await;
        Some(report)
    }

    async fn update_edge_health(&self, edge: &OffloadCoordinator) {
        let targets = edge.targets();
        let inactive = targets.iter().filter(|t| !t.active).count();

        // Provider outages never fail liveness
        if !targets.is_empty() && inactive == targets.len() {
            self.health
                .set_degraded(components::EDGE_REGISTRY, "no active edge targets")
                .await;
        } else if inactive > 0 {
            self.health
                .set_degraded(
                    components::EDGE_REGISTRY,
                    format!("{} of {} edge targets inactive", inactive, targets.len()),
                )
                .await;
        } else {
            self.health.set_healthy(components::EDGE_REGISTRY).await;
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FakeCluster;
    use super::*;
    use crate::collector::CollectorConfig;
    use crate::health::ComponentStatus;
    use crate::remediation::{EngineState, RemediationConfig};
    use std::time::Duration;

    fn cluster_supervisor(fake: Arc<FakeCluster>, health: HealthRegistry) -> ClusterSupervisor {
        ClusterSupervisor::new(
            HealthCollector::new(fake.clone(), CollectorConfig::default()),
            Arc::new(RemediationEngine::new(fake, RemediationConfig::default())),
            None,
            health,
            SupervisorMetrics::new(),
            StructuredLogger::new("test"),
        )
    }

    #[tokio::test]
    async fn test_fast_tick_dispatches_and_records_snapshot() {
        let fake = Arc::new(FakeCluster::new(4, 1, &[("web", "Running"), ("job", "Failed")]));
        let cluster = cluster_supervisor(fake.clone(), HealthRegistry::new());

        assert!(cluster.latest().await.is_none());
        let report = cluster.fast_tick().await;
        cluster.wait_for_pass().await;

        assert_eq!(
            report.dispatch,
            Dispatch::Dispatched(vec![IssueKind::FailedWorkloads, IssueKind::NotReadyNodes])
        );
        assert_eq!(cluster.latest().await.unwrap().nodes.len(), 5);
        assert_eq!(
            fake.calls(),
            vec![
                "delete default/job".to_string(),
                "drain down-0".to_string(),
                "uncordon down-0".to_string()
            ]
        );
        assert_eq!(cluster.engine().state(), EngineState::Idle);
    }

    #[tokio::test]
    async fn test_tick_during_pass_is_skipped() {
        let fake = Arc::new(FakeCluster {
            delete_delay: Some(Duration::from_millis(200)),
            ..FakeCluster::new(1, 0, &[("job", "Failed")])
        });
        let cluster = cluster_supervisor(fake.clone(), HealthRegistry::new());

        let first = cluster.fast_tick().await;
        assert!(matches!(first.dispatch, Dispatch::Dispatched(_)));

        for _ in 0..3 {
            let report = cluster.fast_tick().await;
            assert_eq!(report.dispatch, Dispatch::Skipped(vec![IssueKind::FailedWorkloads]));
        }

        cluster.wait_for_pass().await;
        assert_eq!(fake.calls(), vec!["delete default/job".to_string()]);
    }

    #[tokio::test]
    async fn test_wait_for_pass_covers_every_tracked_pass() {
        let fake = Arc::new(FakeCluster::new(1, 0, &[]));
        let cluster = cluster_supervisor(fake, HealthRegistry::new());
        let finished = Arc::new(AtomicU32::new(0));

        for delay in [150, 50] {
            let finished = Arc::clone(&finished);
            let handle = tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                finished.fetch_add(1, Ordering::SeqCst);
            });
            cluster.track_pass(handle).await;
        }

        cluster.wait_for_pass().await;
        assert_eq!(finished.load(Ordering::SeqCst), 2);
        assert!(cluster.in_flight.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_finished_passes_are_pruned() {
        let fake = Arc::new(FakeCluster::new(1, 0, &[]));
        let cluster = cluster_supervisor(fake, HealthRegistry::new());

        let done = tokio::spawn(async {});
        while !done.is_finished() {
            tokio::task::yield_now().await;
        }
        cluster.track_pass(done).await;
        cluster
            .track_pass(tokio::spawn(tokio::time::sleep(Duration::from_millis(50))))
            .await;

        assert_eq!(cluster.in_flight.lock().await.len(), 1);
        cluster.wait_for_pass().await;
    }

    #[tokio::test]
    async fn test_critical_streak_counts_and_resets() {
        let fake = Arc::new(FakeCluster::new(1, 4, &[]));
        let cluster = cluster_supervisor(fake.clone(), HealthRegistry::new());

        assert_eq!(cluster.fast_tick().await.status, ClusterStatus::Critical);
        cluster.wait_for_pass().await;
        assert_eq!(cluster.consecutive_critical(), 1);

        cluster.fast_tick().await;
        cluster.wait_for_pass().await;
        assert_eq!(cluster.consecutive_critical(), 2);

        fake.set_nodes(5, 0);
        assert_eq!(cluster.fast_tick().await.status, ClusterStatus::Healthy);
        assert_eq!(cluster.consecutive_critical(), 0);
    }

    #[tokio::test]
    async fn test_supervisor_without_halves() {
        let supervisor = Supervisor::new(None, None, HealthRegistry::new(), StructuredLogger::new("test"));
        supervisor.initialize().await;

        assert!(supervisor.cluster_status().await.is_none());
        assert!(supervisor.edge_target_status().is_empty());
        assert!(supervisor.static_page_status().await.is_empty());
        assert!(supervisor.reoptimize().await.is_none());
        assert!(supervisor.health().readiness().await.ready);
    }

    #[tokio::test]
    async fn test_initialize_registers_cluster_components() {
        let health = HealthRegistry::new();
        let fake = Arc::new(FakeCluster::new(1, 0, &[]));
        let supervisor = Supervisor::new(
            Some(cluster_supervisor(fake, health.clone())),
            None,
            health.clone(),
            StructuredLogger::new("test"),
        );
        supervisor.initialize().await;

        let response = health.health().await;
        assert_eq!(response.status, ComponentStatus::Healthy);
        assert!(response.components.contains_key(components::COLLECTOR));
        assert!(response.components.contains_key(components::REMEDIATION));
        assert!(!response.components.contains_key(components::OFFLOAD));
    }
}
