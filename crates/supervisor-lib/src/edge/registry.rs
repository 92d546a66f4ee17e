//! Live reliability/latency/capacity scores for every known edge target

use crate::models::EdgeTarget;
use crate::observability::StructuredLogger;
use dashmap::DashMap;
use std::cmp::Ordering;
use tracing::debug;

/// Reliability below which a target is deactivated
pub const DEACTIVATION_THRESHOLD_PCT: f64 = 90.0;
/// Reliability assigned when a recovery probe reactivates a target
pub const RECOVERY_RELIABILITY_PCT: f64 = 95.0;
/// Reliability gained per successful sample
pub const SUCCESS_STEP_PCT: f64 = 0.1;
/// Reliability lost per failed sample
pub const FAILURE_STEP_PCT: f64 = 2.0;
/// Weight given to the best-ranked target; rank `n` gets `TOP_WEIGHT / n`
pub const TOP_WEIGHT: u32 = 100_000;

/// Registry of edge targets
///
/// The single owner and mutator of target scores. Each update holds the
/// target's entry only for the duration of the read-modify-write; readers
/// get copies.
pub struct EdgeRegistry {
    targets: DashMap<String, EdgeTarget>,
    logger: StructuredLogger,
}

impl EdgeRegistry {
    pub fn new(targets: impl IntoIterator<Item = EdgeTarget>, logger: StructuredLogger) -> Self {
        let registry = Self {
            targets: DashMap::new(),
            logger,
        };
        for target in targets {
            debug!(edge_target = %target.name, kind = %target.provider_kind, "Registering edge target");
            registry.targets.insert(target.name.clone(), target);
        }
        registry
    }

    pub fn get(&self, name: &str) -> Option<EdgeTarget> {
        self.targets.get(name).map(|r| r.clone())
    }

    /// Copy of every target, ordered by name
    pub fn snapshot(&self) -> Vec<EdgeTarget> {
        let mut targets: Vec<EdgeTarget> = self.targets.iter().map(|r| r.value().clone()).collect();
        targets.sort_by(|a, b| a.name.cmp(&b.name));
        targets
    }

    pub fn active(&self) -> Vec<EdgeTarget> {
        self.snapshot().into_iter().filter(|t| t.active).collect()
    }

    pub fn inactive(&self) -> Vec<EdgeTarget> {
        self.snapshot().into_iter().filter(|t| !t.active).collect()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Fold one probe or deploy result into the target's scores.
    ///
    /// Latency is replaced by the sample. Reliability moves up by 0.1 on
    /// success and down by 2 on failure, clamped to [0, 100]. A target whose
    /// reliability ends below 90 is deactivated; this never reactivates.
    /// Returns the updated target, or `None` for an unknown name.
    pub fn record_sample(&self, name: &str, latency_ms: f64, success: bool) -> Option<EdgeTarget> {
        let mut entry = self.targets.get_mut(name)?;
        let target = entry.value_mut();

        target.latency_ms = latency_ms.max(0.0);
        target.reliability_pct = if success {
            (target.reliability_pct + SUCCESS_STEP_PCT).min(100.0)
        } else {
            (target.reliability_pct - FAILURE_STEP_PCT).max(0.0)
        };

        let deactivated = target.active && target.reliability_pct < DEACTIVATION_THRESHOLD_PCT;
        if deactivated {
            target.active = false;
        }

        let updated = target.clone();
        drop(entry);

        if deactivated {
            self.logger
                .log_edge_target_deactivated(&updated.name, updated.reliability_pct);
        }
        Some(updated)
    }

    /// Mark a target active after a successful recovery probe, resetting its
    /// reliability to exactly 95
    pub fn reactivate(&self, name: &str, latency_ms: f64) -> Option<EdgeTarget> {
        let mut entry = self.targets.get_mut(name)?;
        let target = entry.value_mut();
        target.active = true;
        target.reliability_pct = RECOVERY_RELIABILITY_PCT;
        target.latency_ms = latency_ms.max(0.0);
        let updated = target.clone();
        drop(entry);

        self.logger
            .log_edge_target_reactivated(&updated.name, updated.latency_ms);
        Some(updated)
    }

    /// Recompute traffic weights. Active targets are ranked by reliability
    /// (descending), then latency (ascending), then name; rank `n` (from 1)
    /// receives `floor(100000 / n)`. Inactive targets get no traffic.
    pub fn rebalance(&self) -> Vec<EdgeTarget> {
        let mut ranked = self.active();
        ranked.sort_by(rank_order);

        for (index, target) in ranked.iter().enumerate() {
            let weight = TOP_WEIGHT / (index as u32 + 1);
            if let Some(mut entry) = self.targets.get_mut(&target.name) {
                entry.capacity_weight = weight;
            }
        }

        for mut entry in self.targets.iter_mut() {
            if !entry.active {
                entry.capacity_weight = 0;
            }
        }

        let mut targets = self.snapshot();
        targets.sort_by(|a, b| b.capacity_weight.cmp(&a.capacity_weight).then(a.name.cmp(&b.name)));
        targets
    }
}

fn rank_order(a: &EdgeTarget, b: &EdgeTarget) -> Ordering {
    b.reliability_pct
        .partial_cmp(&a.reliability_pct)
        .unwrap_or(Ordering::Equal)
        .then_with(|| {
            a.latency_ms
                .partial_cmp(&b.latency_ms)
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| a.name.cmp(&b.name))
}
