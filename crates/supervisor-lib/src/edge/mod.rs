//! Edge targets: score registry and provider transport

mod provider;
mod registry;

pub use provider::{
    EdgeProvider, HttpEdgeProvider, HttpProviderConfig, DEFAULT_DEPLOY_TIMEOUT,
    DEFAULT_PROBE_TIMEOUT,
};
pub use registry::{
    EdgeRegistry, DEACTIVATION_THRESHOLD_PCT, FAILURE_STEP_PCT, RECOVERY_RELIABILITY_PCT,
    SUCCESS_STEP_PCT, TOP_WEIGHT,
};
