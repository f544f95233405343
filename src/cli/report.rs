use crate::cli::OutputFormat;
use crate::metrics::PrometheusSink;
use crate::producer::Producer;
use crate::reservation::{ResourceQuantity, Reservations};
use crate::Result;
use prometheus::Registry;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write;

#[derive(Debug, Clone, Serialize)]
pub struct ReportEntry {
    pub reserved: ResourceQuantity,
    pub capacity: ResourceQuantity,
    /// Serialized as `null` (JSON) or `.nan` (YAML) when capacity is zero.
    pub utilization: f64,
    pub summary: String,
}

pub fn report_entries(reservations: &Reservations) -> BTreeMap<String, ReportEntry> {
    reservations
        .iter()
        .map(|(resource, aggregate)| {
            (
                resource.clone(),
                ReportEntry {
                    reserved: aggregate.reserved.clone(),
                    capacity: aggregate.capacity.clone(),
                    utilization: aggregate.utilization(),
                    summary: aggregate.summary(),
                },
            )
        })
        .collect()
}

pub fn render(
    format: OutputFormat,
    producer: &Producer,
    reservations: &Reservations,
) -> Result<String> {
    match format {
        OutputFormat::Table => Ok(render_table(reservations)),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&report_entries(reservations))?),
        OutputFormat::Yaml => Ok(serde_yaml::to_string(&report_entries(reservations))?),
        OutputFormat::Prometheus => {
            let sink = PrometheusSink::with_registry(Registry::new())?;
            producer.record(reservations, &sink)?;
            sink.encode()
        }
    }
}

pub fn render_table(reservations: &Reservations) -> String {
    let width = reservations
        .iter()
        .map(|(resource, _)| resource.len())
        .max()
        .unwrap_or(0)
        .max("RESOURCE".len());

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<width$}  {:>11}  {:>12}  {:>12}",
        "RESOURCE",
        "UTILIZATION",
        "RESERVED",
        "CAPACITY",
        width = width
    );

    for (resource, aggregate) in reservations {
        let _ = writeln!(
            out,
            "{:<width$}  {:>11}  {:>12}  {:>12}",
            resource,
            format!("{:.2}%", aggregate.utilization() * 100.0),
            aggregate.reserved.to_string(),
            aggregate.capacity.to_string(),
            width = width
        );
    }

    out
}
