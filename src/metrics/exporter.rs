use crate::metrics::sink::PrometheusSink;
use crate::Result;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{info, warn};

pub struct PrometheusExporter {
    sink: PrometheusSink,
    addr: SocketAddr,
}

impl PrometheusExporter {
    pub fn new(sink: PrometheusSink, addr: SocketAddr) -> Self {
        Self { sink, addr }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/metrics", get(metrics_handler))
            .route("/healthz", get(|| async { "ok" }))
            .with_state(self.sink.clone())
    }

    pub async fn start(&self) -> Result<()> {
        info!("Starting Prometheus exporter on {}", self.addr);

        let listener = TcpListener::bind(self.addr).await?;
        axum::serve(listener, self.router()).await?;

        Ok(())
    }
}

async fn metrics_handler(State(sink): State<PrometheusSink>) -> Response {
    match sink.encode() {
        Ok(body) => ([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response(),
        Err(e) => {
            warn!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}
