//! One reserved capacity reconciliation pass.
//!
//! A pass lists the nodes matching the selector, keeps those that are ready
//! and schedulable, lists the pods bound to each, and folds everything into a
//! fresh [`Reservations`]. Reporting to the sinks only starts once every list
//! call has succeeded, so a failed pass leaves metrics and status untouched.

use crate::k8s::{format_label_selector, is_ready_and_schedulable, ClusterState, OwnerRef};
use crate::metrics::{MetricKind, MetricsSink};
use crate::reservation::Reservations;
use crate::status::{status_from, ReservedCapacityStatus, StatusSink};
use crate::{CapwatchError, Result};
use futures::stream::{self, StreamExt, TryStreamExt};
use k8s_openapi::api::core::v1::{Node, Pod};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Pod list requests a pass keeps in flight at once.
pub const DEFAULT_LIST_CONCURRENCY: usize = 10;

pub struct Producer {
    owner: OwnerRef,
    node_selector: BTreeMap<String, String>,
    cluster: Arc<dyn ClusterState>,
    list_concurrency: usize,
}

impl Producer {
    pub fn new(
        owner: OwnerRef,
        node_selector: BTreeMap<String, String>,
        cluster: Arc<dyn ClusterState>,
    ) -> Self {
        Self {
            owner,
            node_selector,
            cluster,
            list_concurrency: DEFAULT_LIST_CONCURRENCY,
        }
    }

    /// Caps concurrent pod list requests. Zero is treated as one.
    pub fn with_list_concurrency(mut self, limit: usize) -> Self {
        self.list_concurrency = limit.max(1);
        self
    }

    pub fn owner(&self) -> &OwnerRef {
        &self.owner
    }

    pub fn node_selector(&self) -> &BTreeMap<String, String> {
        &self.node_selector
    }

    /// Computes, records and persists reserved capacity.
    pub async fn reconcile(
        &self,
        metrics: &dyn MetricsSink,
        status: &dyn StatusSink,
    ) -> Result<ReservedCapacityStatus> {
        let reservations = self.compute().await?;

        let summary = self.record(&reservations, metrics)?;
        status.persist(&self.owner, &summary).await?;

        info!(
            "Reconciled {} across {} resources",
            self.owner,
            summary.len()
        );

        Ok(summary)
    }

    pub async fn compute(&self) -> Result<Reservations> {
        let nodes = self
            .cluster
            .list_nodes(&self.node_selector)
            .await
            .map_err(|e| CapwatchError::ListNodes {
                selector: format_label_selector(&self.node_selector),
                source: Box::new(e),
            })?;

        let listed = nodes.len();
        let eligible: Vec<Node> = nodes
            .into_iter()
            .filter(is_ready_and_schedulable)
            .collect();
        debug!(
            "{}: {} of {} nodes are ready and schedulable",
            self.owner,
            eligible.len(),
            listed
        );

        // `buffered` yields in node order, so pods stay paired with their node.
        let pods: Vec<Vec<Pod>> = stream::iter(eligible.iter().map(|node| self.pods_on(node)))
            .buffered(self.list_concurrency)
            .try_collect()
            .await?;

        let mut reservations = Reservations::new();
        for (node, pods) in eligible.iter().zip(&pods) {
            reservations.add(node, pods)?;
        }

        Ok(reservations)
    }

    /// Sends utilization, reserved and capacity for every resource to
    /// `metrics` and returns the status map.
    pub fn record(
        &self,
        reservations: &Reservations,
        metrics: &dyn MetricsSink,
    ) -> Result<ReservedCapacityStatus> {
        for (resource, aggregate) in reservations {
            metrics.record(
                resource,
                MetricKind::Utilization,
                &self.owner,
                aggregate.utilization(),
            )?;
            metrics.record(
                resource,
                MetricKind::Reserved,
                &self.owner,
                aggregate.reserved.as_f64(),
            )?;
            metrics.record(
                resource,
                MetricKind::Capacity,
                &self.owner,
                aggregate.capacity.as_f64(),
            )?;
        }

        Ok(status_from(reservations))
    }

    async fn pods_on(&self, node: &Node) -> Result<Vec<Pod>> {
        let name = node.metadata.name.as_deref().unwrap_or_default();

        self.cluster
            .list_pods_on_node(name)
            .await
            .map_err(|e| CapwatchError::ListPods {
                node: name.to_string(),
                source: Box::new(e),
            })
    }
}
