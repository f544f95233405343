pub mod commands;
pub mod report;

use clap::{Parser, Subcommand, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "capwatch")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Reserved capacity metrics for Kubernetes node groups", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Reconcile MetricsProducers periodically and serve Prometheus metrics")]
    Run {
        #[arg(short, long, help = "Path to a YAML config file")]
        config: Option<PathBuf>,

        #[arg(short, long, help = "Seconds between reconciliation passes")]
        interval: Option<u64>,

        #[arg(short, long, help = "Address of the /metrics endpoint")]
        metrics_addr: Option<SocketAddr>,

        #[arg(short, long, help = "Only reconcile MetricsProducers in this namespace")]
        namespace: Option<String>,
    },
    #[command(about = "Compute reserved capacity once and print it")]
    Report {
        #[arg(
            short,
            long,
            default_value = "",
            help = "Node label selector, e.g. pool=gpu,zone=a"
        )]
        selector: String,

        #[arg(
            short,
            long,
            conflicts_with = "selector",
            help = "Use the node selector of this MetricsProducer"
        )]
        producer: Option<String>,

        #[arg(short, long, default_value = "default", help = "Kubernetes namespace")]
        namespace: String,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table, help = "Output format")]
        format: OutputFormat,
    },
    #[command(about = "Print the MetricsProducer CustomResourceDefinition")]
    Crd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    Yaml,
    Prometheus,
}
