//! Cluster Supervisor - cluster health supervision and edge content offload
//!
//! Runs the fast/deep health loops with automated remediation against the
//! Kubernetes control plane, and the edge sampling/recovery/re-optimization
//! loops against the configured edge targets. Either half can be disabled
//! with `mode` so the two can run as separate processes.

use anyhow::{Context, Result};
use cluster_supervisor::api;
use cluster_supervisor::config::SupervisorConfig;
use std::sync::Arc;
use supervisor_lib::collector::HealthCollector;
use supervisor_lib::control_plane::KubeControlPlane;
use supervisor_lib::deep_check::DeepHealthChecker;
use supervisor_lib::edge::{EdgeRegistry, HttpEdgeProvider};
use supervisor_lib::offload::{DirectoryPageBuilder, OffloadCoordinator};
use supervisor_lib::remediation::RemediationEngine;
use supervisor_lib::{
    ClusterSupervisor, HealthRegistry, Scheduler, StructuredLogger, Supervisor, SupervisorMetrics,
};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SUPERVISOR_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting cluster-supervisor");

    let config = SupervisorConfig::load()?;
    info!(
        instance = %config.instance_name,
        mode = config.mode.as_str(),
        edge_targets = config.edge_targets.len(),
        pages = config.pages.len(),
        "Supervisor configured"
    );

    let health = HealthRegistry::new();
    let metrics = SupervisorMetrics::new();
    let logger = StructuredLogger::new(&config.instance_name);

    let cluster = if config.mode.runs_cluster() {
        Some(build_cluster(&config, &health, &metrics, &logger).await?)
    } else {
        None
    };
    let edge = if config.mode.runs_edge() {
        Some(build_edge(&config, &metrics, &logger)?)
    } else {
        None
    };

    let supervisor = Arc::new(Supervisor::new(cluster, edge, health, logger.clone()));
    supervisor.initialize().await;
    logger.log_startup(SUPERVISOR_VERSION, config.mode.as_str());

    let mut scheduler = Scheduler::new(Arc::clone(&supervisor), config.scheduler_config());
    scheduler.start();

    let app_state = Arc::new(api::AppState::new(Arc::clone(&supervisor)));
    let mut api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            logger.log_shutdown("SIGINT received");
        }
        result = &mut api_handle => {
            match result {
                Ok(Ok(())) => logger.log_shutdown("API server exited"),
                Ok(Err(e)) => {
                    error!(error = %e, "API server failed");
                    logger.log_shutdown("API server failed");
                }
                Err(e) => {
                    error!(error = %e, "API server task panicked");
                    logger.log_shutdown("API server task panicked");
                }
            }
        }
    }

    scheduler.stop().await;
    api_handle.abort();
    info!("Shutdown complete");

    Ok(())
}

async fn build_cluster(
    config: &SupervisorConfig,
    health: &HealthRegistry,
    metrics: &SupervisorMetrics,
    logger: &StructuredLogger,
) -> Result<ClusterSupervisor> {
    let control_plane = Arc::new(
        KubeControlPlane::try_default()
            .await
            .context("Failed to create Kubernetes client")?,
    );

    let collector = HealthCollector::new(control_plane.clone(), config.collector_config());
    let engine = RemediationEngine::new(control_plane, config.remediation_config());
    let deep_checker =
        DeepHealthChecker::new(config.deep_check_config(), logger.clone(), metrics.clone())
            .context("Failed to create deep check HTTP client")?;

    Ok(ClusterSupervisor::new(
        collector,
        Arc::new(engine),
        Some(deep_checker),
        health.clone(),
        metrics.clone(),
        logger.clone(),
    ))
}

fn build_edge(
    config: &SupervisorConfig,
    metrics: &SupervisorMetrics,
    logger: &StructuredLogger,
) -> Result<OffloadCoordinator> {
    let registry = Arc::new(EdgeRegistry::new(config.edge_targets(), logger.clone()));
    let provider = HttpEdgeProvider::new(config.provider_config())
        .context("Failed to create edge provider HTTP client")?;
    let builder = DirectoryPageBuilder::new(&config.content_root);

    info!(
        targets = registry.len(),
        content_root = %config.content_root.display(),
        "Edge offload configured"
    );

    Ok(OffloadCoordinator::new(
        registry,
        Arc::new(provider),
        Arc::new(builder),
        config.offload_config(),
        metrics.clone(),
    ))
}
