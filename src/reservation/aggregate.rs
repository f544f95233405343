//! Per-resource reservation totals for one reconciliation pass.
//!
//! [`Reservations`] accumulates node allocatable capacity and pod resource
//! requests keyed by resource name. The resource set is open: every name seen
//! on either side gets an entry, so a request for a resource no node declares
//! shows up with zero capacity instead of being dropped.

use super::quantity::ResourceQuantity;
use crate::{CapwatchError, Result};
use k8s_openapi::api::core::v1::{Node, Pod};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use serde::Serialize;
use std::collections::btree_map;
use std::collections::BTreeMap;

pub type ResourceName = String;

/// Reserved and capacity totals for a single resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResourceAggregate {
    pub reserved: ResourceQuantity,
    pub capacity: ResourceQuantity,
}

impl ResourceAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_capacity(&mut self, resource: &str, quantity: &ResourceQuantity) -> Result<()> {
        self.capacity
            .try_add(quantity)
            .map_err(|_| CapwatchError::QuantityOverflow {
                resource: resource.to_string(),
            })
    }

    pub fn add_reserved(&mut self, resource: &str, quantity: &ResourceQuantity) -> Result<()> {
        self.reserved
            .try_add(quantity)
            .map_err(|_| CapwatchError::QuantityOverflow {
                resource: resource.to_string(),
            })
    }

    /// Reserved over capacity. NaN when no capacity is known, which keeps
    /// "undefined" apart from "idle" (0.0).
    pub fn utilization(&self) -> f64 {
        if self.capacity.is_zero() {
            return f64::NAN;
        }
        self.reserved.as_f64() / self.capacity.as_f64()
    }

    /// Display form, e.g. `42.50%, 512Mi/1Gi`.
    pub fn summary(&self) -> String {
        format!(
            "{:.2}%, {}/{}",
            self.utilization() * 100.0,
            self.reserved,
            self.capacity
        )
    }
}

/// Resource name to aggregate, iterated in name order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Reservations {
    resources: BTreeMap<ResourceName, ResourceAggregate>,
}

impl Reservations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one node and the pods bound to it into the totals: the node's
    /// allocatable map into capacity, every container's requests into
    /// reserved. Limits are ignored.
    pub fn add(&mut self, node: &Node, pods: &[Pod]) -> Result<()> {
        if let Some(allocatable) = node.status.as_ref().and_then(|s| s.allocatable.as_ref()) {
            self.add_capacity_map(allocatable)?;
        }

        for pod in pods {
            let containers = pod.spec.iter().flat_map(|spec| spec.containers.iter());
            for container in containers {
                if let Some(requests) = container
                    .resources
                    .as_ref()
                    .and_then(|r| r.requests.as_ref())
                {
                    self.add_requests_map(requests)?;
                }
            }
        }

        Ok(())
    }

    pub fn add_capacity_map(&mut self, allocatable: &BTreeMap<String, Quantity>) -> Result<()> {
        for (resource, quantity) in allocatable {
            let quantity = parse_for(resource, quantity)?;
            self.entry(resource).add_capacity(resource, &quantity)?;
        }
        Ok(())
    }

    pub fn add_requests_map(&mut self, requests: &BTreeMap<String, Quantity>) -> Result<()> {
        for (resource, quantity) in requests {
            let quantity = parse_for(resource, quantity)?;
            self.entry(resource).add_reserved(resource, &quantity)?;
        }
        Ok(())
    }

    pub fn get(&self, resource: &str) -> Option<&ResourceAggregate> {
        self.resources.get(resource)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, ResourceName, ResourceAggregate> {
        self.resources.iter()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    fn entry(&mut self, resource: &str) -> &mut ResourceAggregate {
        self.resources.entry(resource.to_string()).or_default()
    }
}

impl<'a> IntoIterator for &'a Reservations {
    type Item = (&'a ResourceName, &'a ResourceAggregate);
    type IntoIter = btree_map::Iter<'a, ResourceName, ResourceAggregate>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

fn parse_for(resource: &str, quantity: &Quantity) -> Result<ResourceQuantity> {
    ResourceQuantity::try_from(quantity).map_err(|source| CapwatchError::InvalidQuantity {
        resource: resource.to_string(),
        value: quantity.0.clone(),
        source,
    })
}
