pub mod cli;
pub mod config;
pub mod controller;
pub mod error;
pub mod k8s;
pub mod metrics;
pub mod producer;
pub mod reservation;
pub mod status;

pub use error::{CapwatchError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
