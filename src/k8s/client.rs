use crate::k8s::crd::MetricsProducer;
use crate::k8s::types::format_label_selector;
use crate::k8s::{ClusterState, ProducerSource};
use crate::{CapwatchError, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::api::ListParams;
use kube::{Api, Client};
use std::collections::BTreeMap;
use tracing::{debug, info};

#[derive(Clone)]
pub struct K8sClient {
    client: Client,
}

impl K8sClient {
    pub async fn try_default() -> Result<Self> {
        debug!("Initializing Kubernetes client");

        let client = Client::try_default().await.map_err(|e| {
            CapwatchError::KubernetesError(format!("Failed to create K8s client: {}", e))
        })?;

        info!("Successfully connected to Kubernetes cluster");

        Ok(Self { client })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    pub fn nodes(&self) -> Api<Node> {
        Api::all(self.client.clone())
    }

    pub fn pods_all(&self) -> Api<Pod> {
        Api::all(self.client.clone())
    }

    pub fn producers(&self, namespace: &str) -> Api<MetricsProducer> {
        Api::namespaced(self.client.clone(), namespace)
    }

    pub fn producers_all(&self) -> Api<MetricsProducer> {
        Api::all(self.client.clone())
    }

    pub async fn get_producer(&self, name: &str, namespace: &str) -> Result<MetricsProducer> {
        self.producers(namespace)
            .get(name)
            .await
            .map_err(|e| match e {
                kube::Error::Api(ref response) if response.code == 404 => {
                    CapwatchError::ProducerNotFound {
                        name: name.to_string(),
                        namespace: namespace.to_string(),
                    }
                }
                other => CapwatchError::Kube(other),
            })
    }

    pub async fn list_producers(&self, namespace: Option<&str>) -> Result<Vec<MetricsProducer>> {
        let producers = match namespace {
            Some(ns) => self.producers(ns),
            None => self.producers_all(),
        };

        let list = producers.list(&ListParams::default()).await?;

        Ok(list.items)
    }
}

#[async_trait]
impl ClusterState for K8sClient {
    async fn list_nodes(&self, selector: &BTreeMap<String, String>) -> Result<Vec<Node>> {
        let mut params = ListParams::default();
        if !selector.is_empty() {
            params = params.labels(&format_label_selector(selector));
        }

        let nodes = self.nodes().list(&params).await?;
        debug!("Listed {} nodes", nodes.items.len());

        Ok(nodes.items)
    }

    async fn list_pods_on_node(&self, node_name: &str) -> Result<Vec<Pod>> {
        let params = ListParams::default().fields(&format!("spec.nodeName={}", node_name));

        let pods = self.pods_all().list(&params).await?;
        debug!("Listed {} pods on node {}", pods.items.len(), node_name);

        Ok(pods.items)
    }
}

#[async_trait]
impl ProducerSource for K8sClient {
    async fn list_producers(&self, namespace: Option<&str>) -> Result<Vec<MetricsProducer>> {
        K8sClient::list_producers(self, namespace).await
    }
}
