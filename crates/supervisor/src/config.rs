//! Supervisor configuration
//!
//! Layered from an optional `supervisor.toml` (path overridable with
//! `SUPERVISOR_CONFIG`) and `SUPERVISOR_*` environment variables, with `__`
//! separating nested keys. Every key has a default.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use supervisor_lib::collector::CollectorConfig;
use supervisor_lib::deep_check::DeepCheckConfig;
use supervisor_lib::edge::HttpProviderConfig;
use supervisor_lib::offload::{OffloadConfig, PageSpec};
use supervisor_lib::remediation::{DeploymentRef, RemediationConfig};
use supervisor_lib::{EdgeTarget, PagePriority, ProviderKind, SchedulerConfig};

pub const DEFAULT_CONFIG_PATH: &str = "supervisor.toml";

/// Which halves run in this process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    All,
    Cluster,
    Edge,
}

impl Mode {
    pub fn runs_cluster(&self) -> bool {
        matches!(self, Mode::All | Mode::Cluster)
    }

    pub fn runs_edge(&self) -> bool {
        matches!(self, Mode::All | Mode::Edge)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::All => "all",
            Mode::Cluster => "cluster",
            Mode::Edge => "edge",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScaleTargetConfig {
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EdgeTargetConfig {
    pub name: String,
    pub provider: ProviderKind,
    pub endpoint: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_capacity_weight")]
    pub capacity_weight: u32,
}

/// Supervisor configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SupervisorConfig {
    /// Instance name attached to structured log events
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    /// Port for health/metrics/status API
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    #[serde(default = "default_mode")]
    pub mode: Mode,

    // Loop intervals
    #[serde(default = "default_fast_check")]
    pub fast_check_secs: u64,
    #[serde(default = "default_deep_check")]
    pub deep_check_secs: u64,
    #[serde(default = "default_edge_sample")]
    pub edge_sample_secs: u64,
    #[serde(default = "default_edge_recovery")]
    pub edge_recovery_secs: u64,
    #[serde(default = "default_reoptimize")]
    pub reoptimize_secs: u64,

    // Timeouts
    #[serde(default = "default_control_plane_timeout")]
    pub control_plane_timeout_secs: u64,
    #[serde(default = "default_remediation_timeout")]
    pub remediation_timeout_secs: u64,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
    #[serde(default = "default_deploy_timeout")]
    pub deploy_timeout_secs: u64,
    #[serde(default = "default_build_timeout")]
    pub build_timeout_secs: u64,

    // Remediation
    #[serde(default = "default_scale_targets")]
    pub scale_targets: Vec<ScaleTargetConfig>,
    #[serde(default = "default_replica_increment")]
    pub replica_increment: i32,

    // Edge offload
    #[serde(default)]
    pub edge_targets: Vec<EdgeTargetConfig>,
    #[serde(default = "default_pages")]
    pub pages: Vec<PageSpec>,
    #[serde(default = "default_content_root")]
    pub content_root: PathBuf,

    // Deep checks
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub tls_endpoints: Vec<String>,
    #[serde(default = "default_cert_min_validity")]
    pub cert_min_validity_secs: u64,
    #[serde(default)]
    pub backup_dir: Option<PathBuf>,
    #[serde(default = "default_backup_max_age")]
    pub backup_max_age_secs: u64,
}

fn default_instance_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "cluster-supervisor".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_mode() -> Mode {
    Mode::All
}

fn default_fast_check() -> u64 {
    30
}

fn default_deep_check() -> u64 {
    300
}

fn default_edge_sample() -> u64 {
    300
}

fn default_edge_recovery() -> u64 {
    120
}

fn default_reoptimize() -> u64 {
    3600
}

fn default_control_plane_timeout() -> u64 {
    10
}

fn default_remediation_timeout() -> u64 {
    60
}

fn default_probe_timeout() -> u64 {
    5
}

fn default_deploy_timeout() -> u64 {
    30
}

fn default_build_timeout() -> u64 {
    120
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_scale_targets() -> Vec<ScaleTargetConfig> {
    ["frontend", "backend"]
        .into_iter()
        .map(|name| ScaleTargetConfig {
            name: name.to_string(),
            namespace: default_namespace(),
        })
        .collect()
}

fn default_replica_increment() -> i32 {
    2
}

fn default_capacity_weight() -> u32 {
    1
}

fn default_pages() -> Vec<PageSpec> {
    vec![PageSpec {
        route: "/".to_string(),
        priority: PagePriority::Critical,
    }]
}

fn default_content_root() -> PathBuf {
    PathBuf::from("dist")
}

fn default_cert_min_validity() -> u64 {
    14 * 86_400
}

fn default_backup_max_age() -> u64 {
    86_400
}

impl SupervisorConfig {
    /// Load from the default (or `SUPERVISOR_CONFIG`) file plus environment
    pub fn load() -> Result<Self> {
        let path = std::env::var("SUPERVISOR_CONFIG")
            .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(Path::new(&path))
    }

    /// Load from a specific file (which may be absent) plus environment
    pub fn load_from(path: &Path) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix("SUPERVISOR")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path.display()))?;

        let config: Self = config
            .try_deserialize()
            .context("Invalid supervisor configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Every interval and timeout must be positive
    fn validate(&self) -> Result<()> {
        let durations = [
            ("fast_check_secs", self.fast_check_secs),
            ("deep_check_secs", self.deep_check_secs),
            ("edge_sample_secs", self.edge_sample_secs),
            ("edge_recovery_secs", self.edge_recovery_secs),
            ("reoptimize_secs", self.reoptimize_secs),
            ("control_plane_timeout_secs", self.control_plane_timeout_secs),
            ("remediation_timeout_secs", self.remediation_timeout_secs),
            ("probe_timeout_secs", self.probe_timeout_secs),
            ("deploy_timeout_secs", self.deploy_timeout_secs),
            ("build_timeout_secs", self.build_timeout_secs),
            ("backup_max_age_secs", self.backup_max_age_secs),
            ("cert_min_validity_secs", self.cert_min_validity_secs),
        ];
        for (key, value) in durations {
            if value == 0 {
                bail!("{} must be greater than zero", key);
            }
        }
        Ok(())
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            fast_check_interval: secs(self.fast_check_secs),
            deep_check_interval: secs(self.deep_check_secs),
            edge_sample_interval: secs(self.edge_sample_secs),
            edge_recovery_interval: secs(self.edge_recovery_secs),
            reoptimize_interval: secs(self.reoptimize_secs),
        }
    }

    pub fn collector_config(&self) -> CollectorConfig {
        CollectorConfig {
            timeout: secs(self.control_plane_timeout_secs),
        }
    }

    pub fn remediation_config(&self) -> RemediationConfig {
        RemediationConfig {
            scale_targets: self
                .scale_targets
                .iter()
                .map(|t| DeploymentRef::new(&t.name, &t.namespace))
                .collect(),
            replica_increment: self.replica_increment,
            action_timeout: secs(self.remediation_timeout_secs),
        }
    }

    pub fn deep_check_config(&self) -> DeepCheckConfig {
        DeepCheckConfig {
            dependencies: self.dependencies.clone(),
            tls_endpoints: self.tls_endpoints.clone(),
            cert_min_validity: secs(self.cert_min_validity_secs),
            backup_dir: self.backup_dir.clone(),
            backup_max_age: secs(self.backup_max_age_secs),
            timeout: secs(self.probe_timeout_secs),
        }
    }

    pub fn offload_config(&self) -> OffloadConfig {
        OffloadConfig {
            pages: self.pages.clone(),
            build_timeout: secs(self.build_timeout_secs),
            deploy_timeout: secs(self.deploy_timeout_secs),
            probe_timeout: secs(self.probe_timeout_secs),
        }
    }

    pub fn provider_config(&self) -> HttpProviderConfig {
        let tokens: HashMap<String, String> = self
            .edge_targets
            .iter()
            .filter_map(|t| t.token.clone().map(|token| (t.name.clone(), token)))
            .collect();

        HttpProviderConfig {
            probe_timeout: secs(self.probe_timeout_secs),
            deploy_timeout: secs(self.deploy_timeout_secs),
            tokens,
        }
    }

    pub fn edge_targets(&self) -> Vec<EdgeTarget> {
        self.edge_targets
            .iter()
            .map(|t| EdgeTarget::new(&t.name, t.provider, &t.endpoint, t.capacity_weight))
            .collect()
    }
}

fn secs(value: u64) -> Duration {
    Duration::from_secs(value)
}
