//! `MetricsProducer` custom resource.
//!
//! A producer names the node group to observe through
//! `spec.reservedCapacity.nodeSelector` and receives the formatted summary per
//! resource in `status.reservedCapacity`.

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::{
    CustomResourceDefinition, CustomResourceValidation, JSONSchemaProps,
};
use kube::{CustomResource, CustomResourceExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[kube(
    group = "capwatch.io",
    version = "v1alpha1",
    kind = "MetricsProducer",
    namespaced,
    status = "MetricsProducerStatus",
    shortname = "mp",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct MetricsProducerSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reserved_capacity: Option<ReservedCapacitySpec>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReservedCapacitySpec {
    #[serde(default)]
    pub node_selector: BTreeMap<String, String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetricsProducerStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reserved_capacity: Option<BTreeMap<String, String>>,
}

/// Installable CRD. The schema is left open so older and newer producers
/// round-trip through the API server unchanged.
pub fn crd_manifest() -> CustomResourceDefinition {
    let mut crd = MetricsProducer::crd();

    for version in &mut crd.spec.versions {
        version.schema = Some(CustomResourceValidation {
            open_api_v3_schema: Some(JSONSchemaProps {
                type_: Some("object".to_string()),
                x_kubernetes_preserve_unknown_fields: Some(true),
                ..Default::default()
            }),
        });
    }

    crd
}
