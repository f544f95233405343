use crate::reservation::QuantityError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CapwatchError {
    #[error("Kubernetes error: {0}")]
    KubernetesError(String),

    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Listing nodes for {selector}, {source}")]
    ListNodes {
        selector: String,
        #[source]
        source: Box<CapwatchError>,
    },

    #[error("Listing pods for {node}, {source}")]
    ListPods {
        node: String,
        #[source]
        source: Box<CapwatchError>,
    },

    #[error("Invalid quantity {value:?} for resource {resource}: {source}")]
    InvalidQuantity {
        resource: String,
        value: String,
        #[source]
        source: QuantityError,
    },

    #[error("Quantity overflow while summing {resource}")]
    QuantityOverflow { resource: String },

    #[error("MetricsProducer not found: {name} in namespace {namespace}")]
    ProducerNotFound { name: String, namespace: String },

    #[error("Metrics error: {0}")]
    MetricsError(#[from] prometheus::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CapwatchError>;
