//! API client for the supervisor status API

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

/// API client for the supervisor status API
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Make a GET request, failing on any non-2xx status
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let (status, body) = self.fetch(path).await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            anyhow::bail!("API error ({}): {}", status, message);
        }

        serde_json::from_str(&body).context("Failed to parse response")
    }

    /// GET a probe endpoint, which answers with a JSON body on both 200 and 503
    pub async fn probe<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let (status, body) = self.fetch(path).await?;

        if !status.is_success() && status != StatusCode::SERVICE_UNAVAILABLE {
            anyhow::bail!("API error ({}): {}", status, body);
        }

        serde_json::from_str(&body).context("Failed to parse response")
    }

    async fn fetch(&self, path: &str) -> Result<(StatusCode, String)> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status();
        let body = response.text().await.context("Failed to read response")?;
        Ok((status, body))
    }
}

// API response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeHealth {
    pub name: String,
    pub readiness: String,
    pub cpu_utilization_pct: Option<f64>,
    pub memory_utilization_pct: Option<f64>,
    pub disk_utilization_pct: Option<f64>,
    pub last_observed_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadHealth {
    pub name: String,
    pub namespace: String,
    pub phase: String,
    pub restart_count: u32,
    pub age_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub name: String,
    pub namespace: String,
    pub endpoint_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    pub nodes: Vec<NodeHealth>,
    pub workloads: Vec<WorkloadHealth>,
    pub services: Vec<ServiceHealth>,
    pub ready_node_ratio: f64,
    pub running_workload_ratio: f64,
    pub overall_status: String,
    pub observed_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeTarget {
    pub name: String,
    pub provider_kind: String,
    pub endpoint: String,
    pub capacity_weight: u32,
    pub latency_ms: f64,
    pub reliability_pct: f64,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeTargetList {
    pub targets: Vec<EdgeTarget>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticPage {
    pub route: String,
    pub dependencies: Vec<String>,
    pub size_bytes: u64,
    pub content_hash: String,
    pub priority: String,
    pub cache_strategy: String,
    pub built_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageList {
    pub pages: Vec<StaticPage>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: HashMap<String, ComponentHealth>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_parses_edge_targets() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/edge/targets")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"targets":[{"name":"workers","provider_kind":"worker_runtime",
                "endpoint":"https://w.example","capacity_weight":1,"latency_ms":12.5,
                "reliability_pct":99.9,"active":true}],"total":1}"#,
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let list: EdgeTargetList = client.get("api/v1/edge/targets").await.unwrap();

        mock.assert_async().await;
        assert_eq!(list.total, 1);
        assert_eq!(list.targets[0].provider_kind, "worker_runtime");
        assert!(list.targets[0].active);
    }

    #[tokio::test]
    async fn test_get_surfaces_api_error_message() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/cluster")
            .with_status(503)
            .with_body(r#"{"error":"no cluster snapshot collected yet"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let err = client
            .get::<ClusterSnapshot>("api/v1/cluster")
            .await
            .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("503"));
        assert!(message.contains("no cluster snapshot collected yet"));
    }

    #[tokio::test]
    async fn test_probe_accepts_service_unavailable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/readyz")
            .with_status(503)
            .with_body(r#"{"ready":false,"reason":"Supervisor not yet initialized"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let readiness: ReadinessResponse = client.probe("readyz").await.unwrap();

        assert!(!readiness.ready);
        assert_eq!(
            readiness.reason.as_deref(),
            Some("Supervisor not yet initialized")
        );
    }

    #[tokio::test]
    async fn test_probe_rejects_other_errors() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/healthz")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        assert!(client.probe::<HealthResponse>("healthz").await.is_err());
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(ApiClient::new("not a url").is_err());
    }
}
