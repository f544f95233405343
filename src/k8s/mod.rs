pub mod client;
pub mod crd;
pub mod node;
pub mod types;

pub use client::K8sClient;
pub use crd::{MetricsProducer, MetricsProducerSpec, MetricsProducerStatus, ReservedCapacitySpec};
pub use node::is_ready_and_schedulable;
pub use types::{format_label_selector, parse_label_selector, OwnerRef};

use crate::Result;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Pod};
use std::collections::BTreeMap;

/// Read-only view of the cluster used by a reconciliation pass.
#[async_trait]
pub trait ClusterState: Send + Sync {
    /// Nodes carrying every label in `selector`. An empty selector matches all nodes.
    async fn list_nodes(&self, selector: &BTreeMap<String, String>) -> Result<Vec<Node>>;

    /// Pods whose `spec.nodeName` is `node_name`.
    async fn list_pods_on_node(&self, node_name: &str) -> Result<Vec<Pod>>;
}

/// Where the controller discovers `MetricsProducer` objects.
#[async_trait]
pub trait ProducerSource: Send + Sync {
    /// Producers in `namespace`, or in every namespace when `None`.
    async fn list_producers(&self, namespace: Option<&str>) -> Result<Vec<MetricsProducer>>;
}
