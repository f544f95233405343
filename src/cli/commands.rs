use crate::cli::report::render;
use crate::cli::{Commands, OutputFormat};
use crate::config::Config;
use crate::controller::Controller;
use crate::k8s::crd::crd_manifest;
use crate::k8s::{parse_label_selector, K8sClient, OwnerRef};
use crate::metrics::{PrometheusExporter, PrometheusSink};
use crate::producer::Producer;
use crate::CapwatchError;
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

pub async fn handle_command(command: Commands) -> Result<()> {
    match command {
        Commands::Run {
            config,
            interval,
            metrics_addr,
            namespace,
        } => handle_run(config, interval, metrics_addr, namespace).await,
        Commands::Report {
            selector,
            producer,
            namespace,
            format,
        } => handle_report(selector, producer, namespace, format).await,
        Commands::Crd => handle_crd(),
    }
}

async fn handle_run(
    config_path: Option<PathBuf>,
    interval: Option<u64>,
    metrics_addr: Option<SocketAddr>,
    namespace: Option<String>,
) -> Result<()> {
    let mut config = match &config_path {
        Some(path) => Config::load(path)
            .with_context(|| format!("Loading config from {}", path.display()))?,
        None => Config::default(),
    };

    if let Some(secs) = interval {
        config.interval_secs = secs;
    }
    if let Some(addr) = metrics_addr {
        config.metrics_addr = addr;
    }
    if namespace.is_some() {
        config.namespace = namespace;
    }
    config.validate().context("Invalid configuration")?;

    let client = K8sClient::try_default().await?;
    let sink = PrometheusSink::new()?;

    let exporter = PrometheusExporter::new(sink.clone(), config.metrics_addr);
    tokio::spawn(async move {
        if let Err(e) = exporter.start().await {
            error!("Prometheus exporter stopped: {}", e);
        }
    });

    let mut controller = Controller::new(client, sink, config);
    controller.run().await?;

    Ok(())
}

async fn handle_report(
    selector: String,
    producer: Option<String>,
    namespace: String,
    format: OutputFormat,
) -> Result<()> {
    let client = K8sClient::try_default().await?;

    let (owner, node_selector) = match producer {
        Some(name) => {
            let found = client.get_producer(&name, &namespace).await?;
            let spec = found.spec.reserved_capacity.ok_or_else(|| {
                CapwatchError::ConfigError(format!(
                    "MetricsProducer {}/{} has no reservedCapacity spec",
                    namespace, name
                ))
            })?;
            (OwnerRef::new(name, namespace), spec.node_selector)
        }
        None => (
            OwnerRef::new("report", namespace),
            parse_label_selector(&selector)?,
        ),
    };

    info!("Computing reserved capacity for {}", owner);

    let producer = Producer::new(owner, node_selector, Arc::new(client));
    let reservations = producer.compute().await?;

    print!("{}", render(format, &producer, &reservations)?);

    Ok(())
}

fn handle_crd() -> Result<()> {
    print!("{}", serde_yaml::to_string(&crd_manifest())?);
    Ok(())
}
