//! Extended health checks run on the slow cadence
//!
//! Downstream dependency reachability, TLS certificate expiry and backup
//! freshness. Every check is independent and bounded by the probe timeout.
//! Results are logged and counted; they never trigger remediation.

use crate::observability::{StructuredLogger, SupervisorMetrics};
use chrono::{DateTime, Utc};
use reqwest::tls::TlsInfo;
use reqwest::Client;
use serde::Serialize;
use std::future::Future;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};
use tokio::task::JoinSet;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct DeepCheckConfig {
    /// URLs that must answer without a server error
    pub dependencies: Vec<String>,
    /// HTTPS endpoints whose certificate chain must verify
    pub tls_endpoints: Vec<String>,
    /// Remaining certificate validity below which the check fails
    pub cert_min_validity: Duration,
    pub backup_dir: Option<PathBuf>,
    pub backup_max_age: Duration,
    pub timeout: Duration,
}

impl Default for DeepCheckConfig {
    fn default() -> Self {
        Self {
            dependencies: Vec::new(),
            tls_endpoints: Vec::new(),
            cert_min_validity: Duration::from_secs(14 * 86_400),
            backup_dir: None,
            backup_max_age: Duration::from_secs(86_400),
            timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckKind {
    Dependency,
    Certificate,
    Backup,
}

impl CheckKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckKind::Dependency => "dependency",
            CheckKind::Certificate => "certificate",
            CheckKind::Backup => "backup",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub kind: CheckKind,
    pub subject: String,
    pub healthy: bool,
    pub detail: String,
}

impl CheckResult {
    fn new(kind: CheckKind, subject: impl Into<String>, outcome: Result<String, String>) -> Self {
        let (healthy, detail) = match outcome {
            Ok(detail) => (true, detail),
            Err(detail) => (false, detail),
        };
        Self {
            kind,
            subject: subject.into(),
            healthy,
            detail,
        }
    }
}

pub struct DeepHealthChecker {
    client: Client,
    config: DeepCheckConfig,
    logger: StructuredLogger,
    metrics: SupervisorMetrics,
}

impl DeepHealthChecker {
    pub fn new(
        config: DeepCheckConfig,
        logger: StructuredLogger,
        metrics: SupervisorMetrics,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(config.timeout)
            .tls_info(true)
            .build()?;
        Ok(Self {
            client,
            config,
            logger,
            metrics,
        })
    }

    /// Run every configured check concurrently and wait for all of them
    pub async fn run(&self) -> Vec<CheckResult> {
        let timeout = self.config.timeout;
        let mut group = JoinSet::new();

        for url in &self.config.dependencies {
            let client = self.client.clone();
            let url = url.clone();
            group.spawn(async move {
                let outcome = bounded(timeout, check_dependency(&client, &url)).await;
                CheckResult::new(CheckKind::Dependency, url, outcome)
            });
        }

        for url in &self.config.tls_endpoints {
            let client = self.client.clone();
            let url = url.clone();
            let min_validity = self.config.cert_min_validity;
            group.spawn(async move {
                let outcome =
                    bounded(timeout, check_certificate(&client, &url, min_validity)).await;
                CheckResult::new(CheckKind::Certificate, url, outcome)
            });
        }

        if let Some(dir) = &self.config.backup_dir {
            let dir = dir.clone();
            let max_age = self.config.backup_max_age;
            group.spawn(async move {
                let outcome = bounded(timeout, check_backup(&dir, max_age)).await;
                CheckResult::new(CheckKind::Backup, dir.display().to_string(), outcome)
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = group.join_next().await {
            match joined {
                Ok(result) => {
                    self.logger.log_deep_check(
                        result.kind.as_str(),
                        &result.subject,
                        result.healthy,
                        &result.detail,
                    );
                    if !result.healthy {
                        self.metrics.inc_deep_check_failure(result.kind.as_str());
                    }
                    results.push(result);
                }
                Err(e) => warn!(error = %e, "Deep check task aborted"),
            }
        }
        results.sort_by(|a, b| a.subject.cmp(&b.subject));
        results
    }
}

async fn bounded<F>(timeout: Duration, check: F) -> Result<String, String>
where
    F: Future<Output = Result<String, String>>,
{
    tokio::time::timeout(timeout, check)
        .await
        .unwrap_or_else(|_| Err(format!("timed out after {:?}", timeout)))
}

async fn check_dependency(client: &Client, url: &str) -> Result<String, String> {
    let response = client.get(url).send().await.map_err(|e| e.to_string())?;
    let status = response.status();
    if status.is_server_error() {
        Err(format!("HTTP {}", status.as_u16()))
    } else {
        Ok(format!("HTTP {}", status.as_u16()))
    }
}

/// The handshake verifies the chain; the leaf's `notAfter` must then leave at
/// least `min_validity` of headroom. Any HTTP status is acceptable.
async fn check_certificate(
    client: &Client,
    url: &str,
    min_validity: Duration,
) -> Result<String, String> {
    if !url.starts_with("https://") {
        return Err("not an https endpoint".to_string());
    }
    let response = client.head(url).send().await.map_err(|e| e.to_string())?;
    let der = response
        .extensions()
        .get::<TlsInfo>()
        .and_then(TlsInfo::peer_certificate)
        .ok_or_else(|| "no peer certificate presented".to_string())?;

    let not_after = certificate_not_after(der)?;
    certificate_headroom(not_after, Utc::now(), min_validity)
}

/// Expiry of a DER-encoded X.509 certificate
pub fn certificate_not_after(der: &[u8]) -> Result<DateTime<Utc>, String> {
    let (_, cert) = x509_parser::parse_x509_certificate(der)
        .map_err(|e| format!("unparseable certificate: {}", e))?;
    let timestamp = cert.validity().not_after.timestamp();
    DateTime::from_timestamp(timestamp, 0)
        .ok_or_else(|| format!("certificate expiry out of range: {}", timestamp))
}

fn certificate_headroom(
    not_after: DateTime<Utc>,
    now: DateTime<Utc>,
    min_validity: Duration,
) -> Result<String, String> {
    let remaining = not_after - now;
    if remaining <= chrono::Duration::zero() {
        return Err(format!("certificate expired at {}", not_after.to_rfc3339()));
    }

    let days = remaining.num_days();
    match chrono::Duration::from_std(min_validity) {
        Ok(min) if remaining < min => Err(format!(
            "certificate expires in {} days at {}, below the {} day minimum",
            days,
            not_after.to_rfc3339(),
            min.num_days()
        )),
        _ => Ok(format!("certificate valid for {} more days", days)),
    }
}

async fn check_backup(dir: &std::path::Path, max_age: Duration) -> Result<String, String> {
    let mut entries = tokio::fs::read_dir(dir).await.map_err(|e| e.to_string())?;
    let mut newest: Option<SystemTime> = None;

    while let Some(entry) = entries.next_entry().await.map_err(|e| e.to_string())? {
        let metadata = match entry.metadata().await {
            Ok(metadata) if metadata.is_file() => metadata,
            _ => continue,
        };
        if let Ok(modified) = metadata.modified() {
            newest = Some(newest.map_or(modified, |n| n.max(modified)));
        }
    }

    let newest = newest.ok_or_else(|| "no backups found".to_string())?;
    let age = SystemTime::now()
        .duration_since(newest)
        .unwrap_or(Duration::ZERO);

    if age <= max_age {
        Ok(format!("newest backup is {}s old", age.as_secs()))
    } else {
        Err(format!(
            "newest backup is {}s old, limit {}s",
            age.as_secs(),
            max_age.as_secs()
        ))
    }
}
