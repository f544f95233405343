use crate::producer::DEFAULT_LIST_CONCURRENCY;
use crate::{CapwatchError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_METRICS_PORT: u16 = 8080;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Seconds between reconciliation passes.
    pub interval_secs: u64,
    pub metrics_addr: SocketAddr,
    /// Restricts `MetricsProducer` discovery to one namespace.
    pub namespace: Option<String>,
    /// Reconcile `MetricsProducer` objects found in the cluster.
    pub watch_producers: bool,
    /// Producers declared here instead of in the cluster. Their status is logged.
    pub producers: Vec<StaticProducer>,
    /// Pod list requests kept in flight per producer.
    pub list_concurrency: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticProducer {
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub node_selector: BTreeMap<String, String>,
}

fn default_namespace() -> String {
    "default".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_INTERVAL_SECS,
            metrics_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_METRICS_PORT)),
            namespace: None,
            watch_producers: true,
            producers: Vec::new(),
            list_concurrency: DEFAULT_LIST_CONCURRENCY,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.interval_secs == 0 {
            return Err(CapwatchError::ConfigError(
                "interval_secs must be greater than zero".to_string(),
            ));
        }

        if self.list_concurrency == 0 {
            return Err(CapwatchError::ConfigError(
                "list_concurrency must be greater than zero".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for producer in &self.producers {
            if producer.name.is_empty() {
                return Err(CapwatchError::ConfigError(
                    "static producer without a name".to_string(),
                ));
            }
            if !seen.insert((producer.namespace.as_str(), producer.name.as_str())) {
                return Err(CapwatchError::ConfigError(format!(
                    "duplicate static producer {}/{}",
                    producer.namespace, producer.name
                )));
            }
        }

        if !self.watch_producers && self.producers.is_empty() {
            return Err(CapwatchError::ConfigError(
                "nothing to reconcile: watch_producers is off and no static producers are set"
                    .to_string(),
            ));
        }

        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}
