//! Kubernetes implementation of the control-plane seams

use super::{is_daemon_managed, ControlPlane, NodeUsage, RemediationCommands};
use crate::error::{ControlPlaneError, RemediationError};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Endpoints, Node, Pod, Service};
use kube::api::{
    Api, ApiResource, DeleteParams, DynamicObject, EvictParams, ListParams, Patch, PatchParams,
};
use kube::Client;
use serde_json::json;
use tracing::{debug, info, warn};

/// Control-plane client backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeControlPlane {
    client: Client,
}

impl KubeControlPlane {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect using in-cluster config or the local kubeconfig
    pub async fn try_default() -> Result<Self, ControlPlaneError> {
        let client = Client::try_default().await?;
        Ok(Self::new(client))
    }

    fn node_metrics_resource() -> ApiResource {
        ApiResource {
            group: "metrics.k8s.io".to_string(),
            version: "v1beta1".to_string(),
            api_version: "metrics.k8s.io/v1beta1".to_string(),
            kind: "NodeMetrics".to_string(),
            plural: "nodes".to_string(),
        }
    }

    async fn set_unschedulable(&self, name: &str, unschedulable: bool) -> Result<(), ControlPlaneError> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        let patch = json!({ "spec": { "unschedulable": unschedulable } });
        nodes
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ControlPlane for KubeControlPlane {
    async fn list_nodes(&self) -> Result<Vec<Node>, ControlPlaneError> {
        let api: Api<Node> = Api::all(self.client.clone());
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn list_workloads(&self) -> Result<Vec<Pod>, ControlPlaneError> {
        let api: Api<Pod> = Api::all(self.client.clone());
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn list_services(&self) -> Result<Vec<Service>, ControlPlaneError> {
        let api: Api<Service> = Api::all(self.client.clone());
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn list_endpoints(&self) -> Result<Vec<Endpoints>, ControlPlaneError> {
        let api: Api<Endpoints> = Api::all(self.client.clone());
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn list_node_usage(&self) -> Result<Vec<NodeUsage>, ControlPlaneError> {
        let resource = Self::node_metrics_resource();
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &resource);
        let list = api.list(&ListParams::default()).await?;

        let usage = list
            .items
            .into_iter()
            .filter_map(|obj| {
                let name = obj.metadata.name?;
                let usage = obj.data.get("usage")?;
                Some(NodeUsage {
                    name,
                    cpu: usage.get("cpu")?.as_str()?.to_string(),
                    memory: usage.get("memory")?.as_str()?.to_string(),
                })
            })
            .collect();

        Ok(usage)
    }
}

#[async_trait]
impl RemediationCommands for KubeControlPlane {
    async fn delete_workload(
        &self,
        name: &str,
        namespace: &str,
        force: bool,
    ) -> Result<(), RemediationError> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = if force {
            DeleteParams {
                grace_period_seconds: Some(0),
                ..DeleteParams::default()
            }
        } else {
            DeleteParams::default()
        };

        api.delete(name, &params)
            .await
            .map_err(ControlPlaneError::from)?;
        debug!(workload = %name, namespace = %namespace, force, "Workload deleted");
        Ok(())
    }

    async fn drain_node(&self, name: &str) -> Result<usize, RemediationError> {
        self.set_unschedulable(name, true).await?;

        let pods: Api<Pod> = Api::all(self.client.clone());
        let params = ListParams::default().fields(&format!("spec.nodeName={}", name));
        let on_node = pods.list(&params).await.map_err(ControlPlaneError::from)?;

        let mut evicted = 0usize;
        let mut failed = 0usize;

        for pod in on_node.items.iter().filter(|p| !is_daemon_managed(p)) {
            let (Some(pod_name), Some(namespace)) =
                (pod.metadata.name.as_deref(), pod.metadata.namespace.as_deref())
            else {
                continue;
            };

            let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
            match api.evict(pod_name, &EvictParams::default()).await {
                Ok(_) => evicted += 1,
                Err(e) => {
                    failed += 1;
                    warn!(
                        node = %name,
                        workload = %pod_name,
                        namespace = %namespace,
                        error = %e,
                        "Eviction failed"
                    );
                }
            }
        }

        info!(node = %name, evicted, failed, "Node drained");

        if failed > 0 {
            return Err(RemediationError::PartialDrain {
                node: name.to_string(),
                failed,
            });
        }
        Ok(evicted)
    }

    async fn uncordon_node(&self, name: &str) -> Result<(), RemediationError> {
        self.set_unschedulable(name, false).await?;
        Ok(())
    }

    async fn deployment_replicas(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<i32, RemediationError> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let scale = api.get_scale(name).await.map_err(ControlPlaneError::from)?;
        Ok(scale.spec.and_then(|s| s.replicas).unwrap_or(0))
    }

    async fn scale_deployment(
        &self,
        name: &str,
        namespace: &str,
        replicas: i32,
    ) -> Result<(), RemediationError> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let patch = json!({ "spec": { "replicas": replicas } });
        api.patch_scale(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(ControlPlaneError::from)?;
        Ok(())
    }
}
