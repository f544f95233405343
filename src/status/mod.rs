//! Human-readable reserved capacity summaries and where they are persisted.

pub mod kube_sink;

pub use kube_sink::KubeStatusSink;

use crate::k8s::OwnerRef;
use crate::reservation::{ResourceName, Reservations};
use crate::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tracing::info;

/// Resource name to display string, e.g. `cpu -> "50.00%, 1/2"`.
pub type ReservedCapacityStatus = BTreeMap<ResourceName, String>;

pub fn status_from(reservations: &Reservations) -> ReservedCapacityStatus {
    reservations
        .iter()
        .map(|(resource, aggregate)| (resource.clone(), aggregate.summary()))
        .collect()
}

#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn persist(&self, owner: &OwnerRef, status: &ReservedCapacityStatus) -> Result<()>;
}

/// Writes each entry to the log. Used for producers that have no backing object.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogStatusSink;

#[async_trait]
impl StatusSink for LogStatusSink {
    async fn persist(&self, owner: &OwnerRef, status: &ReservedCapacityStatus) -> Result<()> {
        for (resource, summary) in status {
            info!(
                producer = %owner,
                resource = %resource,
                "Reserved capacity {}",
                summary
            );
        }
        Ok(())
    }
}
