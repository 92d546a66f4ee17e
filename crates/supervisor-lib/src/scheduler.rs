//! Periodic loops driving the supervisor
//!
//! Five independent timers: fast health check, deep health check, edge
//! performance sampling, edge recovery probe and content re-optimization.
//! Each loop awaits its own tick body before the next tick, so a loop never
//! overlaps itself; a slow loop never delays another.

use crate::supervisor::Supervisor;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub fast_check_interval: Duration,
    pub deep_check_interval: Duration,
    pub edge_sample_interval: Duration,
    pub edge_recovery_interval: Duration,
    pub reoptimize_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            fast_check_interval: Duration::from_secs(30),
            deep_check_interval: Duration::from_secs(300),
            edge_sample_interval: Duration::from_secs(300),
            edge_recovery_interval: Duration::from_secs(120),
            reoptimize_interval: Duration::from_secs(3600),
        }
    }
}

pub struct Scheduler {
    supervisor: Arc<Supervisor>,
    config: SchedulerConfig,
    shutdown_tx: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(supervisor: Arc<Supervisor>, config: SchedulerConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            supervisor,
            config,
            shutdown_tx,
            tasks: Vec::new(),
        }
    }

    /// Number of running loops
    pub fn loop_count(&self) -> usize {
        self.tasks.len()
    }

    /// Spawn the loops for whichever halves the supervisor carries
    pub fn start(&mut self) {
        if !self.tasks.is_empty() {
            warn!("Scheduler already started");
            return;
        }

        if let Some(cluster) = self.supervisor.cluster().cloned() {
            let fast = Arc::clone(&cluster);
            self.spawn_loop("fast_health_check", self.config.fast_check_interval, move || {
                let cluster = Arc::clone(&fast);
                async move {
                    cluster.fast_tick().await;
                }
            });

            self.spawn_loop("deep_health_check", self.config.deep_check_interval, move || {
                let cluster = Arc::clone(&cluster);
                async move {
                    cluster.deep_tick().await;
                }
            });
        }

        if self.supervisor.edge().is_some() {
            let supervisor = Arc::clone(&self.supervisor);
            self.spawn_loop("edge_sampling", self.config.edge_sample_interval, move || {
                let supervisor = Arc::clone(&supervisor);
                async move { supervisor.sample_edges().await }
            });

            let supervisor = Arc::clone(&self.supervisor);
            self.spawn_loop("edge_recovery", self.config.edge_recovery_interval, move || {
                let supervisor = Arc::clone(&supervisor);
                async move { supervisor.recover_edges().await }
            });

            let supervisor = Arc::clone(&self.supervisor);
            self.spawn_loop("content_reoptimize", self.config.reoptimize_interval, move || {
                let supervisor = Arc::clone(&supervisor);
                async move {
                    supervisor.reoptimize().await;
                }
            });
        }

        info!(loops = self.tasks.len(), "Scheduler started");
    }

    fn spawn_loop<F, Fut>(&mut self, name: &'static str, period: Duration, mut tick: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut shutdown = self.shutdown_tx.subscribe();

        self.tasks.push(tokio::spawn(async move {
            info!(task = name, interval_secs = period.as_secs(), "Starting loop");
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        debug!(task = name, "Tick");
                        tick().await;
                    }
                    _ = shutdown.recv() => {
                        info!(task = name, "Shutting down loop");
                        break;
                    }
                }
            }
        }));
    }

    /// Signal every loop to stop, wait for them, then wait for any
    /// remediation pass still in flight
    pub async fn stop(&mut self) {
        let _ = self.shutdown_tx.send(());

        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!(error = %e, "Loop task failed");
            }
        }

        if let Some(cluster) = self.supervisor.cluster() {
            cluster.wait_for_pass().await;
        }
        info!("Scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{CollectorConfig, HealthCollector};
    use crate::health::HealthRegistry;
    use crate::observability::{StructuredLogger, SupervisorMetrics};
    use crate::remediation::{RemediationConfig, RemediationEngine};
    use crate::supervisor::testing::FakeCluster;
    use crate::supervisor::ClusterSupervisor;

    fn fast_config() -> SchedulerConfig {
        SchedulerConfig {
            fast_check_interval: Duration::from_millis(20),
            deep_check_interval: Duration::from_millis(20),
            edge_sample_interval: Duration::from_millis(20),
            edge_recovery_interval: Duration::from_millis(20),
            reoptimize_interval: Duration::from_millis(20),
        }
    }

    fn supervisor(fake: Arc<FakeCluster>) -> Arc<Supervisor> {
        let health = HealthRegistry::new();
        let cluster = ClusterSupervisor::new(
            HealthCollector::new(fake.clone(), CollectorConfig::default()),
            Arc::new(RemediationEngine::new(fake, RemediationConfig::default())),
            None,
            health.clone(),
            SupervisorMetrics::new(),
            StructuredLogger::new("test"),
        );
        Arc::new(Supervisor::new(
            Some(cluster),
            None,
            health,
            StructuredLogger::new("test"),
        ))
    }

    #[tokio::test]
    async fn test_cluster_only_runs_two_loops() {
        let fake = Arc::new(FakeCluster::new(3, 0, &[("web", "Running")]));
        let supervisor = supervisor(fake);
        let mut scheduler = Scheduler::new(Arc::clone(&supervisor), fast_config());

        scheduler.start();
        assert_eq!(scheduler.loop_count(), 2);

        tokio::time::sleep(Duration::from_millis(100)).await;
        scheduler.stop().await;

        assert_eq!(scheduler.loop_count(), 0);
        let snapshot = supervisor.cluster_status().await.unwrap();
        assert_eq!(snapshot.nodes.len(), 3);
    }

    #[tokio::test]
    async fn test_stop_waits_for_in_flight_pass() {
        let fake = Arc::new(FakeCluster {
            delete_delay: Some(Duration::from_millis(150)),
            ..FakeCluster::new(1, 0, &[("job", "Failed")])
        });
        let supervisor = supervisor(fake.clone());
        let mut scheduler = Scheduler::new(Arc::clone(&supervisor), fast_config());

        scheduler.start();
        tokio::time::sleep(Duration::from_millis(50)).await;
        scheduler.stop().await;

        // The pass started before shutdown ran to completion exactly once
        assert_eq!(fake.calls(), vec!["delete default/job".to_string()]);
        let engine = supervisor.cluster().unwrap().engine();
        assert_eq!(engine.state(), crate::remediation::EngineState::Idle);
    }

    #[tokio::test]
    async fn test_no_halves_no_loops() {
        let supervisor = Arc::new(Supervisor::new(
            None,
            None,
            HealthRegistry::new(),
            StructuredLogger::new("test"),
        ));
        let mut scheduler = Scheduler::new(supervisor, SchedulerConfig::default());
        scheduler.start();
        assert_eq!(scheduler.loop_count(), 0);
        scheduler.stop().await;
    }
}
