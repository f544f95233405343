use crate::k8s::OwnerRef;
use crate::metrics::{MetricKind, MetricsSink};
use crate::Result;
use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};

pub const METRIC_NAMESPACE: &str = "capwatch";
pub const METRIC_SUBSYSTEM: &str = "reserved_capacity";

const LABELS: [&str; 3] = ["resource", "name", "namespace"];

/// Gauges for reserved capacity, held in a registry owned by the sink rather
/// than the process-wide default one.
#[derive(Clone)]
pub struct PrometheusSink {
    registry: Registry,
    utilization: GaugeVec,
    reserved: GaugeVec,
    capacity: GaugeVec,
}

impl PrometheusSink {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        #[cfg(target_os = "linux")]
        registry.register(Box::new(
            prometheus::process_collector::ProcessCollector::for_self(),
        ))?;

        Self::with_registry(registry)
    }

    pub fn with_registry(registry: Registry) -> Result<Self> {
        let utilization = register_gauge(
            &registry,
            MetricKind::Utilization,
            "Reserved over allocatable capacity; NaN when capacity is zero",
        )?;
        let reserved = register_gauge(
            &registry,
            MetricKind::Reserved,
            "Sum of container resource requests on eligible nodes",
        )?;
        let capacity = register_gauge(
            &registry,
            MetricKind::Capacity,
            "Sum of allocatable capacity of eligible nodes",
        )?;

        Ok(Self {
            registry,
            utilization,
            reserved,
            capacity,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Drops the series of `owner` for each of `resources`.
    pub fn forget(&self, owner: &OwnerRef, resources: &[String]) {
        for resource in resources {
            for kind in MetricKind::ALL {
                let _ = self.gauge(kind).remove_label_values(&[
                    resource.as_str(),
                    owner.name.as_str(),
                    owner.namespace.as_str(),
                ]);
            }
        }
    }

    /// Text exposition format of everything in the registry.
    pub fn encode(&self) -> Result<String> {
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer)?;

        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    fn gauge(&self, kind: MetricKind) -> &GaugeVec {
        match kind {
            MetricKind::Utilization => &self.utilization,
            MetricKind::Reserved => &self.reserved,
            MetricKind::Capacity => &self.capacity,
        }
    }
}

impl MetricsSink for PrometheusSink {
    fn record(&self, resource: &str, kind: MetricKind, owner: &OwnerRef, value: f64) -> Result<()> {
        self.gauge(kind)
            .get_metric_with_label_values(&[resource, owner.name.as_str(), owner.namespace.as_str()])?
            .set(value);
        Ok(())
    }
}

fn register_gauge(registry: &Registry, kind: MetricKind, help: &str) -> Result<GaugeVec> {
    let opts = Opts::new(kind.as_str(), help)
        .namespace(METRIC_NAMESPACE)
        .subsystem(METRIC_SUBSYSTEM);
    let gauge = GaugeVec::new(opts, &LABELS)?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}
