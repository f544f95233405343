use crate::k8s::crd::MetricsProducer;
use crate::{CapwatchError, Result};
use kube::ResourceExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Object that owns a set of reserved capacity observations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerRef {
    pub name: String,
    pub namespace: String,
}

impl OwnerRef {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    pub fn from_producer(producer: &MetricsProducer) -> Self {
        Self {
            name: producer.name_any(),
            namespace: producer.namespace().unwrap_or_else(|| "default".to_string()),
        }
    }
}

impl fmt::Display for OwnerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Renders a selector map as `k1=v1,k2=v2`.
pub fn format_label_selector(selector: &BTreeMap<String, String>) -> String {
    selector
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join(",")
}

pub fn parse_label_selector(text: &str) -> Result<BTreeMap<String, String>> {
    let mut selector = BTreeMap::new();

    for term in text.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let (key, value) = term.split_once('=').ok_or_else(|| {
            CapwatchError::ConfigError(format!("Label selector term {:?} is not key=value", term))
        })?;

        let key = key.trim();
        if key.is_empty() {
            return Err(CapwatchError::ConfigError(format!(
                "Label selector term {:?} has an empty key",
                term
            )));
        }

        selector.insert(key.to_string(), value.trim().to_string());
    }

    Ok(selector)
}
