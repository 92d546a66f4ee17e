//! Content offload coordinator
//!
//! Builds one static artifact per configured route and fans each out to every
//! active edge target. Also drives the two edge scoring loops: periodic
//! performance sampling (probe, score, rebalance) and recovery probing of
//! deactivated targets.

mod builder;

pub use builder::{extract_dependencies, DirectoryPageBuilder, PageBuilder};

use crate::edge::{EdgeProvider, EdgeRegistry, DEFAULT_DEPLOY_TIMEOUT, DEFAULT_PROBE_TIMEOUT};
use crate::error::{BuildError, EdgeError};
use crate::models::{CacheStrategy, EdgeTarget, PagePriority, StaticPage};
use crate::observability::SupervisorMetrics;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

pub const DEFAULT_BUILD_TIMEOUT: Duration = Duration::from_secs(120);

/// A route to build and offload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSpec {
    pub route: String,
    pub priority: PagePriority,
}

#[derive(Debug, Clone)]
pub struct OffloadConfig {
    pub pages: Vec<PageSpec>,
    pub build_timeout: Duration,
    pub deploy_timeout: Duration,
    pub probe_timeout: Duration,
}

impl Default for OffloadConfig {
    fn default() -> Self {
        Self {
            pages: vec![PageSpec {
                route: "/".to_string(),
                priority: PagePriority::Critical,
            }],
            build_timeout: DEFAULT_BUILD_TIMEOUT,
            deploy_timeout: DEFAULT_DEPLOY_TIMEOUT,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

/// Per-target result of publishing one page
#[derive(Debug, Clone, Default)]
pub struct PublishReport {
    pub route: String,
    pub deployed: Vec<String>,
    pub failed: Vec<(String, String)>,
}

/// Result of one re-optimization pass
#[derive(Debug, Clone, Default)]
pub struct ReoptimizeReport {
    pub built: usize,
    pub build_failures: Vec<(String, String)>,
    pub publishes: Vec<PublishReport>,
}

impl ReoptimizeReport {
    pub fn deploy_failures(&self) -> usize {
        self.publishes.iter().map(|p| p.failed.len()).sum()
    }
}

pub struct OffloadCoordinator {
    registry: Arc<EdgeRegistry>,
    provider: Arc<dyn EdgeProvider>,
    builder: Arc<dyn PageBuilder>,
    pages: RwLock<BTreeMap<String, StaticPage>>,
    config: OffloadConfig,
    metrics: SupervisorMetrics,
}

impl OffloadCoordinator {
    pub fn new(
        registry: Arc<EdgeRegistry>,
        provider: Arc<dyn EdgeProvider>,
        builder: Arc<dyn PageBuilder>,
        config: OffloadConfig,
        metrics: SupervisorMetrics,
    ) -> Self {
        Self {
            registry,
            provider,
            builder,
            pages: RwLock::new(BTreeMap::new()),
            config,
            metrics,
        }
    }

    pub fn registry(&self) -> &Arc<EdgeRegistry> {
        &self.registry
    }

    /// Copy of every target's current scores
    pub fn targets(&self) -> Vec<EdgeTarget> {
        self.registry.snapshot()
    }

    /// Every built page, ordered by route
    pub async fn pages(&self) -> Vec<StaticPage> {
        self.pages.read().await.values().cloned().collect()
    }

    /// Build the artifact for one route via the build collaborator
    pub async fn build_page(
        &self,
        route: &str,
        priority: PagePriority,
    ) -> Result<StaticPage, BuildError> {
        let timeout = self.config.build_timeout;
        let content = tokio::time::timeout(timeout, self.builder.build(route))
            .await
            .map_err(|_| BuildError::Timeout(timeout))??;

        Ok(StaticPage {
            route: route.to_string(),
            size_bytes: content.len() as u64,
            dependencies: extract_dependencies(&content),
            content_hash: hex::encode(Sha256::digest(&content)),
            priority,
            cache_strategy: CacheStrategy::for_priority(priority),
            built_at: Utc::now(),
            content,
        })
    }

    /// Deploy one page to every currently active target. Targets are
    /// independent: a failure is logged and fed to the registry as a failed
    /// sample without affecting the rest.
    pub async fn publish(&self, page: &StaticPage) -> PublishReport {
        let page = Arc::new(page.clone());
        let timeout = self.config.deploy_timeout;
        let mut group = JoinSet::new();

        for target in self.registry.active() {
            let provider = Arc::clone(&self.provider);
            let page = Arc::clone(&page);
            group.spawn(async move {
                let started = Instant::now();
                let result = bounded(timeout, provider.deploy(&target, &page)).await;
                (target.name, elapsed_ms(started), result)
            });
        }

        let mut report = PublishReport {
            route: page.route.clone(),
            ..Default::default()
        };

        while let Some(joined) = group.join_next().await {
            let (name, latency_ms, result) = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(route = %page.route, error = %e, "Deploy task aborted");
                    continue;
                }
            };

            self.metrics.inc_page_deploy(&name, result.is_ok());
            match result {
                Ok(()) => {
                    debug!(edge_target = %name, route = %page.route, latency_ms, "Page deployed");
                    report.deployed.push(name);
                }
                Err(e) => {
                    warn!(edge_target = %name, route = %page.route, error = %e, "Page deploy failed");
                    self.registry.record_sample(&name, latency_ms, false);
                    report.failed.push((name, e.to_string()));
                }
            }
        }

        report.deployed.sort();
        report.failed.sort();
        report
    }

    /// Rebuild every configured page and republish it. A page whose build
    /// fails keeps its previous version.
    pub async fn reoptimize(&self) -> ReoptimizeReport {
        let mut report = ReoptimizeReport::default();

        for spec in &self.config.pages {
            match self.build_page(&spec.route, spec.priority).await {
                Ok(page) => {
                    self.metrics.inc_page_build(true);
                    report.built += 1;
                    self.pages
                        .write()
                        .await
                        .insert(page.route.clone(), page.clone());
                    report.publishes.push(self.publish(&page).await);
                }
                Err(e) => {
                    self.metrics.inc_page_build(false);
                    warn!(route = %spec.route, error = %e, "Page build failed, keeping previous version");
                    report.build_failures.push((spec.route.clone(), e.to_string()));
                }
            }
        }

        info!(
            built = report.built,
            build_failures = report.build_failures.len(),
            deploy_failures = report.deploy_failures(),
            "Content re-optimization complete"
        );
        self.metrics.record_edge_targets(&self.registry.snapshot());
        report
    }

    /// Probe every active target, fold the results into the registry and
    /// recompute traffic weights. Returns targets in weight order.
    pub async fn sample_targets(&self) -> Vec<EdgeTarget> {
        for (name, latency_ms, result) in self.probe_all(self.registry.active()).await {
            if let Err(e) = &result {
                warn!(edge_target = %name, error = %e, "Edge probe failed");
            }
            self.registry.record_sample(&name, latency_ms, result.is_ok());
        }

        let ranked = self.registry.rebalance();
        self.metrics.record_edge_targets(&ranked);
        ranked
    }

    /// Probe every inactive target and reactivate those that answer.
    /// Returns the names of reactivated targets.
    pub async fn recover_targets(&self) -> Vec<String> {
        let mut recovered = Vec::new();

        for (name, latency_ms, result) in self.probe_all(self.registry.inactive()).await {
            match result {
                Ok(()) => {
                    if self.registry.reactivate(&name, latency_ms).is_some() {
                        recovered.push(name);
                    }
                }
                Err(e) => debug!(edge_target = %name, error = %e, "Recovery probe failed"),
            }
        }

        if !recovered.is_empty() {
            self.registry.rebalance();
        }
        self.metrics.record_edge_targets(&self.registry.snapshot());
        recovered.sort();
        recovered
    }

    async fn probe_all(
        &self,
        targets: Vec<EdgeTarget>,
    ) -> Vec<(String, f64, Result<(), EdgeError>)> {
        let timeout = self.config.probe_timeout;
        let mut group = JoinSet::new();

        for target in targets {
            let provider = Arc::clone(&self.provider);
            group.spawn(async move {
                let started = Instant::now();
                let result = bounded(timeout, provider.probe(&target)).await;
                (target.name, elapsed_ms(started), result)
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = group.join_next().await {
            match joined {
                Ok(outcome) => results.push(outcome),
                Err(e) => warn!(error = %e, "Probe task aborted"),
            }
        }
        results.sort_by(|a, b| a.0.cmp(&b.0));
        results
    }
}

async fn bounded<F>(timeout: Duration, call: F) -> Result<(), EdgeError>
where
    F: Future<Output = Result<(), EdgeError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(EdgeError::Timeout(timeout)),
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProviderKind;
    use crate::observability::StructuredLogger;
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    /// Provider whose per-target behavior is scripted
    #[derive(Default)]
    struct ScriptedProvider {
        failing: HashSet<String>,
        deploys: Mutex<Vec<(String, String)>>,
        probes: Mutex<Vec<String>>,
    }

    impl ScriptedProvider {
        fn failing(names: &[&str]) -> Self {
            Self {
                failing: names.iter().map(|n| n.to_string()).collect(),
                ..Default::default()
            }
        }

        fn outcome(&self, target: &EdgeTarget) -> Result<(), EdgeError> {
            if self.failing.contains(&target.name) {
                Err(EdgeError::Status {
                    target: target.name.clone(),
                    status: 502,
                })
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl EdgeProvider for ScriptedProvider {
        async fn deploy(&self, target: &EdgeTarget, page: &StaticPage) -> Result<(), EdgeError> {
            self.deploys
                .lock()
                .unwrap()
                .push((target.name.clone(), page.route.clone()));
            self.outcome(target)
        }

        async fn probe(&self, target: &EdgeTarget) -> Result<(), EdgeError> {
            self.probes.lock().unwrap().push(target.name.clone());
            self.outcome(target)
        }
    }

    /// Builder serving fixed content, with routes that fail
    struct MapBuilder {
        content: Mutex<HashMap<String, Result<String, ()>>>,
    }

    impl MapBuilder {
        fn new(entries: &[(&str, Result<&str, ()>)]) -> Self {
            Self {
                content: Mutex::new(
                    entries
                        .iter()
                        .map(|(route, body)| (route.to_string(), (*body).map(str::to_string)))
                        .collect(),
                ),
            }
        }

        fn set(&self, route: &str, body: Result<&str, ()>) {
            self.content
                .lock()
                .unwrap()
                .insert(route.to_string(), body.map(str::to_string));
        }
    }

    #[async_trait]
    impl PageBuilder for MapBuilder {
        async fn build(&self, route: &str) -> Result<Vec<u8>, BuildError> {
            match self.content.lock().unwrap().get(route) {
                Some(Ok(body)) => Ok(body.clone().into_bytes()),
                Some(Err(())) => Err(BuildError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "bundler crashed",
                ))),
                None => Err(BuildError::NotFound(route.to_string())),
            }
        }
    }

    fn target(name: &str, reliability: f64) -> EdgeTarget {
        let mut t = EdgeTarget::new(name, ProviderKind::WorkerRuntime, "https://edge.example", 1);
        t.reliability_pct = reliability;
        t
    }

    fn coordinator(
        targets: Vec<EdgeTarget>,
        provider: Arc<ScriptedProvider>,
        builder: Arc<MapBuilder>,
        pages: Vec<PageSpec>,
    ) -> OffloadCoordinator {
        OffloadCoordinator::new(
            Arc::new(EdgeRegistry::new(targets, StructuredLogger::new("test"))),
            provider,
            builder,
            OffloadConfig {
                pages,
                ..OffloadConfig::default()
            },
            SupervisorMetrics::new(),
        )
    }

    fn spec(route: &str, priority: PagePriority) -> PageSpec {
        PageSpec {
            route: route.to_string(),
            priority,
        }
    }

    #[tokio::test]
    async fn test_build_page_derives_metadata() {
        let builder = Arc::new(MapBuilder::new(&[(
            "/",
            Ok(r#"<script src="/app.js"></script>"#),
        )]));
        let coordinator = coordinator(
            Vec::new(),
            Arc::new(ScriptedProvider::default()),
            builder,
            Vec::new(),
        );

        let page = coordinator.build_page("/", PagePriority::High).await.unwrap();

        assert_eq!(page.size_bytes, 31);
        assert_eq!(page.cache_strategy, CacheStrategy::Aggressive);
        assert_eq!(page.content_hash.len(), 64);
        assert!(page.dependencies.contains("/app.js"));
    }

    #[tokio::test]
    async fn test_publish_fans_out_past_failures() {
        let provider = Arc::new(ScriptedProvider::failing(&["b"]));
        let mut inactive = target("c", 50.0);
        inactive.active = false;
        let coordinator = coordinator(
            vec![target("a", 100.0), target("b", 100.0), inactive],
            provider.clone(),
            Arc::new(MapBuilder::new(&[("/", Ok("home"))])),
            Vec::new(),
        );

        let page = coordinator.build_page("/", PagePriority::Low).await.unwrap();
        let report = coordinator.publish(&page).await;

        assert_eq!(report.deployed, vec!["a".to_string()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "b");
        // Inactive targets receive nothing
        assert!(provider.deploys.lock().unwrap().iter().all(|(t, _)| t != "c"));
        // The failed deploy counted against b's reliability
        assert_eq!(coordinator.registry().get("b").unwrap().reliability_pct, 98.0);
    }

    #[tokio::test]
    async fn test_reoptimize_keeps_previous_version_on_build_failure() {
        let builder = Arc::new(MapBuilder::new(&[("/", Ok("v1")), ("/blog", Ok("blog"))]));
        let coordinator = coordinator(
            vec![target("a", 100.0)],
            Arc::new(ScriptedProvider::default()),
            builder.clone(),
            vec![spec("/", PagePriority::Critical), spec("/blog", PagePriority::Medium)],
        );

        let first = coordinator.reoptimize().await;
        assert_eq!(first.built, 2);
        let v1_hash = coordinator.pages().await[0].content_hash.clone();

        builder.set("/", Err(()));
        builder.set("/blog", Ok("blog v2"));
        let second = coordinator.reoptimize().await;

        assert_eq!(second.built, 1);
        assert_eq!(second.build_failures[0].0, "/");

        let pages = coordinator.pages().await;
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].route, "/");
        assert_eq!(pages[0].content, b"v1");
        assert_eq!(pages[0].content_hash, v1_hash);
        assert_eq!(pages[1].content, b"blog v2");
    }

    #[tokio::test]
    async fn test_sampling_deactivates_and_rebalances() {
        let provider = Arc::new(ScriptedProvider::failing(&["flaky"]));
        let coordinator = coordinator(
            vec![target("steady", 99.0), target("flaky", 95.0)],
            provider,
            Arc::new(MapBuilder::new(&[])),
            Vec::new(),
        );

        for _ in 0..3 {
            coordinator.sample_targets().await;
        }

        let flaky = coordinator.registry().get("flaky").unwrap();
        assert!(!flaky.active);
        assert_eq!(flaky.reliability_pct, 89.0);
        assert_eq!(flaky.capacity_weight, 0);

        let steady = coordinator.registry().get("steady").unwrap();
        assert!(steady.active);
        assert_eq!(steady.capacity_weight, TOP);
    }

    const TOP: u32 = crate::edge::TOP_WEIGHT;

    #[tokio::test]
    async fn test_recovery_only_probes_inactive_targets() {
        let provider = Arc::new(ScriptedProvider::failing(&["still-down"]));
        let mut down = target("back-up", 60.0);
        down.active = false;
        let mut still_down = target("still-down", 60.0);
        still_down.active = false;
        let coordinator = coordinator(
            vec![target("healthy", 100.0), down, still_down],
            provider.clone(),
            Arc::new(MapBuilder::new(&[])),
            Vec::new(),
        );

        let recovered = coordinator.recover_targets().await;

        assert_eq!(recovered, vec!["back-up".to_string()]);
        let probed = provider.probes.lock().unwrap().clone();
        assert!(!probed.contains(&"healthy".to_string()));

        let back_up = coordinator.registry().get("back-up").unwrap();
        assert!(back_up.active);
        assert_eq!(back_up.reliability_pct, 95.0);
        assert!(!coordinator.registry().get("still-down").unwrap().active);
    }
}
