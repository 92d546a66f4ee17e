//! Edge provider transport
//!
//! A generic deploy/probe interface over third-party edge-compute providers.
//! The HTTP implementation speaks one request shape per provider kind.

use crate::error::EdgeError;
use crate::models::{EdgeTarget, ProviderKind, StaticPage};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE, ETAG};
use reqwest::{Client, RequestBuilder};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;
use url::Url;

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_DEPLOY_TIMEOUT: Duration = Duration::from_secs(30);

/// Deploy and probe calls against one edge target
#[async_trait]
pub trait EdgeProvider: Send + Sync {
    /// Push one page's content to the target
    async fn deploy(&self, target: &EdgeTarget, page: &StaticPage) -> Result<(), EdgeError>;

    /// Lightweight health probe; the caller measures latency around it
    async fn probe(&self, target: &EdgeTarget) -> Result<(), EdgeError>;
}

#[derive(Debug, Clone)]
pub struct HttpProviderConfig {
    pub probe_timeout: Duration,
    pub deploy_timeout: Duration,
    /// Bearer token per target name
    pub tokens: HashMap<String, String>,
}

impl Default for HttpProviderConfig {
    fn default() -> Self {
        Self {
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            deploy_timeout: DEFAULT_DEPLOY_TIMEOUT,
            tokens: HashMap::new(),
        }
    }
}

/// HTTP transport for edge providers
///
/// - `WorkerRuntime`: `PUT {endpoint}/assets{route}`
/// - `EdgeFunctionRuntime`: `POST {endpoint}/deployments?route={route}`
/// - probe: `GET {endpoint}/health`, success on 2xx
pub struct HttpEdgeProvider {
    client: Client,
    config: HttpProviderConfig,
}

impl HttpEdgeProvider {
    pub fn new(config: HttpProviderConfig) -> Result<Self, EdgeError> {
        let client = Client::builder()
            .user_agent(concat!("cluster-supervisor/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, config })
    }

    fn endpoint(target: &EdgeTarget, segments: &[&str]) -> Result<Url, EdgeError> {
        let invalid = |reason: String| EdgeError::InvalidEndpoint {
            target: target.name.clone(),
            reason,
        };

        let mut url = Url::parse(&target.endpoint).map_err(|e| invalid(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| invalid("endpoint cannot be a base URL".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, target: &EdgeTarget, request: RequestBuilder) -> RequestBuilder {
        match self.config.tokens.get(&target.name) {
            Some(token) => request.header(AUTHORIZATION, format!("Bearer {}", token)),
            None => request,
        }
    }

    async fn send(
        &self,
        target: &EdgeTarget,
        request: RequestBuilder,
        timeout: Duration,
    ) -> Result<(), EdgeError> {
        let response = self
            .authorize(target, request)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EdgeError::Timeout(timeout)
                } else {
                    EdgeError::Transport(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(EdgeError::Status {
                target: target.name.clone(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl EdgeProvider for HttpEdgeProvider {
    async fn deploy(&self, target: &EdgeTarget, page: &StaticPage) -> Result<(), EdgeError> {
        let request = match target.provider_kind {
            ProviderKind::WorkerRuntime => {
                let mut segments = vec!["assets"];
                segments.extend(page.route.trim_start_matches('/').split('/'));
                self.client.put(Self::endpoint(target, &segments)?)
            }
            ProviderKind::EdgeFunctionRuntime => {
                let mut url = Self::endpoint(target, &["deployments"])?;
                url.query_pairs_mut().append_pair("route", &page.route);
                self.client.post(url)
            }
        };

        let request = request
            .header(CONTENT_TYPE, "text/html; charset=utf-8")
            .header(CACHE_CONTROL, page.cache_strategy.cache_control())
            .header(ETAG, format!("\"{}\"", page.content_hash))
            .body(page.content.clone());

        debug!(
            edge_target = %target.name,
            route = %page.route,
            size_bytes = page.size_bytes,
            "Deploying page to edge target"
        );
        self.send(target, request, self.config.deploy_timeout).await
    }

    async fn probe(&self, target: &EdgeTarget) -> Result<(), EdgeError> {
        let request = self.client.get(Self::endpoint(target, &["health"])?);
        self.send(target, request, self.config.probe_timeout).await
    }
}
