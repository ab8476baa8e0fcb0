//! HTTP `/metrics` endpoint
//!
//! Serves the [`MetricsCollector`] registry in Prometheus text format. The
//! server stops when the controller's shutdown token is cancelled.

use crate::error::{DigestdError, Result};
use crate::metrics::MetricsCollector;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

const CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Router exposing `GET /metrics`
pub fn router(metrics: MetricsCollector) -> Router {
    Router::new()
        .route("/metrics", get(serve_metrics))
        .with_state(metrics)
}

async fn serve_metrics(State(metrics): State<MetricsCollector>) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, CONTENT_TYPE)], metrics.gather_metrics())
}

/// Bound metrics server, not yet serving
pub struct MetricsServer {
    listener: TcpListener,
    metrics: MetricsCollector,
}

impl MetricsServer {
    pub async fn bind(addr: SocketAddr, metrics: MetricsCollector) -> Result<Self> {
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            DigestdError::Config(format!("Failed to bind metrics server to {}: {}", addr, e))
        })?;
        Ok(Self { listener, metrics })
    }

    /// Address actually bound (resolves port 0)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serves until `shutdown` is cancelled.
    pub async fn serve(self, shutdown: CancellationToken) -> Result<()> {
        let addr = self.local_addr()?;
        info!(%addr, "digestd: Metrics server listening");

        axum::serve(self.listener, router(self.metrics))
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await?;

        info!(%addr, "digestd: Metrics server stopped");
        Ok(())
    }
}
