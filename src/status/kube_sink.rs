use crate::k8s::{K8sClient, OwnerRef};
use crate::status::{ReservedCapacityStatus, StatusSink};
use crate::Result;
use async_trait::async_trait;
use kube::api::{Patch, PatchParams};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

/// Persists the summary into `status.reservedCapacity` of the owning
/// `MetricsProducer`.
#[derive(Clone)]
pub struct KubeStatusSink {
    client: K8sClient,
}

impl KubeStatusSink {
    pub fn new(client: K8sClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StatusSink for KubeStatusSink {
    async fn persist(&self, owner: &OwnerRef, status: &ReservedCapacityStatus) -> Result<()> {
        let api = self.client.producers(&owner.namespace);

        let current = api.get_status(&owner.name).await?;
        let previous = current.status.and_then(|s| s.reserved_capacity);
        let patch = status_patch(previous.as_ref(), status);

        api.patch_status(&owner.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        debug!("Updated status of {} with {} resources", owner, status.len());

        Ok(())
    }
}

/// Merge patch replacing `status.reservedCapacity`. Resources present before
/// but gone now are nulled so the API server drops them.
pub fn status_patch(
    previous: Option<&BTreeMap<String, String>>,
    status: &ReservedCapacityStatus,
) -> Value {
    let mut entries: Map<String, Value> = status
        .iter()
        .map(|(resource, summary)| (resource.clone(), Value::String(summary.clone())))
        .collect();

    if let Some(previous) = previous {
        for stale in previous.keys().filter(|k| !status.contains_key(*k)) {
            entries.insert(stale.clone(), Value::Null);
        }
    }

    json!({ "status": { "reservedCapacity": entries } })
}
