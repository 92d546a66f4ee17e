//! Automated remediation of identified cluster issues
//!
//! The engine is a two-state machine (Idle / Healing). A pass may only start
//! from Idle; while a pass is in flight, later ticks still identify issues
//! but skip dispatch. Every corrective action runs independently under its
//! own timeout, and one action's failure never aborts the rest of the pass.

mod issues;

pub use issues::{
    identify_issues, Issue, IssueKind, ResourceRef, HIGH_CPU_THRESHOLD_PCT, RESTART_THRESHOLD,
};

use crate::control_plane::RemediationCommands;
use crate::error::RemediationError;
use crate::models::ClusterSnapshot;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Default upper bound on one remediation command
pub const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_secs(60);

/// A deployment scaled out when nodes run hot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentRef {
    pub name: String,
    pub namespace: String,
}

impl DeploymentRef {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }
}

/// Configuration for the remediation engine
#[derive(Debug, Clone)]
pub struct RemediationConfig {
    /// Deployments scaled out on high node CPU (front-end and back-end tiers)
    pub scale_targets: Vec<DeploymentRef>,
    /// Replicas added per scale-out action
    pub replica_increment: i32,
    /// Upper bound on each individual command
    pub action_timeout: Duration,
}

impl Default for RemediationConfig {
    fn default() -> Self {
        Self {
            scale_targets: vec![
                DeploymentRef::new("frontend", "default"),
                DeploymentRef::new("backend", "default"),
            ],
            replica_increment: 2,
            action_timeout: DEFAULT_ACTION_TIMEOUT,
        }
    }
}

/// Engine state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    Idle,
    Healing,
}

/// Outcome of a single corrective action on one resource
#[derive(Debug, Clone, Serialize)]
pub struct ActionResult {
    pub issue: IssueKind,
    pub resource: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Summary of a completed remediation pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct PassReport {
    pub issues: Vec<IssueKind>,
    pub actions: Vec<ActionResult>,
}

impl PassReport {
    pub fn succeeded(&self) -> usize {
        self.actions.iter().filter(|a| a.error.is_none()).count()
    }

    pub fn failed(&self) -> usize {
        self.actions.iter().filter(|a| a.error.is_some()).count()
    }
}

/// Result of asking the engine to remediate a snapshot
#[derive(Debug, Clone)]
pub enum PassOutcome {
    /// Nothing to fix; the engine stayed Idle
    NoIssues,
    /// Issues were found but another pass was already in flight
    Skipped { issues: Vec<IssueKind> },
    /// A full pass ran to completion
    Completed(PassReport),
}

/// Holding this means the engine is Healing; dropping it returns to Idle
#[derive(Debug)]
pub struct PassGuard {
    healing: Arc<AtomicBool>,
}

impl Drop for PassGuard {
    fn drop(&mut self) {
        self.healing.store(false, Ordering::SeqCst);
    }
}

/// Maps issues to corrective actions and runs them
pub struct RemediationEngine {
    commands: Arc<dyn RemediationCommands>,
    config: RemediationConfig,
    healing: Arc<AtomicBool>,
}

impl RemediationEngine {
    pub fn new(commands: Arc<dyn RemediationCommands>, config: RemediationConfig) -> Self {
        Self {
            commands,
            config,
            healing: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn state(&self) -> EngineState {
        if self.healing.load(Ordering::SeqCst) {
            EngineState::Healing
        } else {
            EngineState::Idle
        }
    }

    /// Transition Idle -> Healing, or `None` if a pass is already running
    pub fn try_begin_pass(&self) -> Option<PassGuard> {
        self.healing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| PassGuard {
                healing: Arc::clone(&self.healing),
            })
    }

    /// Identify issues and, if the engine is Idle, run a full pass inline
    pub async fn run_pass(&self, snapshot: &ClusterSnapshot) -> PassOutcome {
        let issues = identify_issues(snapshot);
        if issues.is_empty() {
            return PassOutcome::NoIssues;
        }

        match self.try_begin_pass() {
            Some(guard) => PassOutcome::Completed(self.execute(issues, guard).await),
            None => PassOutcome::Skipped {
                issues: issues.iter().map(|i| i.kind).collect(),
            },
        }
    }

    /// Run the corrective action for every issue. The guard is released once
    /// all actions have resolved.
    pub async fn execute(&self, issues: Vec<Issue>, guard: PassGuard) -> PassReport {
        let mut report = PassReport {
            issues: issues.iter().map(|i| i.kind).collect(),
            actions: Vec::new(),
        };

        for issue in &issues {
            info!(
                issue = %issue.kind,
                resources = issue.resources.len(),
                "Remediating issue"
            );
            report.actions.extend(self.remediate(issue).await);
        }

        drop(guard);
        report
    }

    async fn remediate(&self, issue: &Issue) -> Vec<ActionResult> {
        let mut group = JoinSet::new();
        let timeout = self.config.action_timeout;

        match issue.kind {
            IssueKind::FailedWorkloads => {
                for resource in &issue.resources {
                    let commands = Arc::clone(&self.commands);
                    let name = resource.name.clone();
                    let namespace = resource.namespace.clone().unwrap_or_default();
                    spawn_action(&mut group, issue.kind, resource.to_string(), timeout, async move {
                        commands.delete_workload(&name, &namespace, true).await
                    });
                }
            }
            IssueKind::NotReadyNodes => {
                for resource in &issue.resources {
                    let commands = Arc::clone(&self.commands);
                    let name = resource.name.clone();
                    spawn_action(&mut group, issue.kind, resource.to_string(), timeout, async move {
                        // Best-effort kick: uncordon even if the drain was partial
                        let drained = commands.drain_node(&name).await;
                        let uncordoned = commands.uncordon_node(&name).await;
                        drained.and(uncordoned)
                    });
                }
            }
            IssueKind::HighCpuNodes => {
                for target in &self.config.scale_targets {
                    let commands = Arc::clone(&self.commands);
                    let target = target.clone();
                    let increment = self.config.replica_increment;
                    let label = format!("{}/{}", target.namespace, target.name);
                    spawn_action(&mut group, issue.kind, label, timeout, async move {
                        let current = commands
                            .deployment_replicas(&target.name, &target.namespace)
                            .await?;
                        let desired = current.saturating_add(increment);
                        commands
                            .scale_deployment(&target.name, &target.namespace, desired)
                            .await?;
                        debug!(
                            deployment = %target.name,
                            namespace = %target.namespace,
                            from = current,
                            to = desired,
                            "Deployment scaled out"
                        );
                        Ok::<(), RemediationError>(())
                    });
                }
            }
        }

        let mut results = Vec::new();
        while let Some(joined) = group.join_next().await {
            let result = match joined {
                Ok(result) => result,
                Err(e) => ActionResult {
                    issue: issue.kind,
                    resource: String::from("<unknown>"),
                    error: Some(format!("action task aborted: {}", e)),
                },
            };

            if let Some(error) = &result.error {
                warn!(
                    issue = %result.issue,
                    resource = %result.resource,
                    error = %error,
                    "Remediation action failed"
                );
            }
            results.push(result);
        }
        results
    }
}

fn spawn_action<F>(
    group: &mut JoinSet<ActionResult>,
    issue: IssueKind,
    resource: String,
    timeout: Duration,
    action: F,
) where
    F: Future<Output = Result<(), RemediationError>> + Send + 'static,
{
    group.spawn(async move {
        let outcome = match tokio::time::timeout(timeout, action).await {
            Ok(result) => result,
            Err(_) => Err(RemediationError::Timeout(timeout)),
        };
        ActionResult {
            issue,
            resource,
            error: outcome.err().map(|e| e.to_string()),
        }
    });
}
