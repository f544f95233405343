pub mod exporter;
pub mod sink;

pub use exporter::PrometheusExporter;
pub use sink::PrometheusSink;

use crate::k8s::OwnerRef;
use crate::Result;

/// Destination for the per-resource observations of a reconciliation pass.
pub trait MetricsSink: Send + Sync {
    fn record(&self, resource: &str, kind: MetricKind, owner: &OwnerRef, value: f64) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Utilization,
    Reserved,
    Capacity,
}

impl MetricKind {
    pub const ALL: [MetricKind; 3] = [
        MetricKind::Utilization,
        MetricKind::Reserved,
        MetricKind::Capacity,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Utilization => "utilization",
            MetricKind::Reserved => "reserved",
            MetricKind::Capacity => "capacity",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
