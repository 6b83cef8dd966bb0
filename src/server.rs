//! HTTP server exposing the metrics endpoint.

use crate::prelude::*;

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio::sync::broadcast;

use crate::collector::Collector;
use crate::exposition;
use crate::modbus::RegisterRead;

pub fn create_router<C>(collector: Arc<Collector<C>>) -> Router
where
    C: RegisterRead + Send + 'static,
{
    Router::new()
        .route("/metrics", get(metrics_handler::<C>))
        .route("/health", get(health_handler))
        .with_state(collector)
}

/// Each request triggers one poll cycle against the device.
async fn metrics_handler<C>(State(collector): State<Arc<Collector<C>>>) -> Response
where
    C: RegisterRead + Send + 'static,
{
    let samples = collector.collect().await;
    let body = exposition::render(&samples);

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
        .into_response()
}

async fn health_handler() -> Response {
    (StatusCode::OK, "ok\n").into_response()
}

pub struct HttpServer<C> {
    collector: Arc<Collector<C>>,
    listen: String,
}

impl<C> HttpServer<C>
where
    C: RegisterRead + Send + 'static,
{
    pub fn new(collector: Arc<Collector<C>>, listen: String) -> Self {
        Self { collector, listen }
    }

    /// Serve until the shutdown signal arrives.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        let router = create_router(self.collector);

        let listener = tokio::net::TcpListener::bind(&self.listen)
            .await
            .map_err(|e| anyhow!("failed to bind {}: {}", self.listen, e))?;

        info!("http server listening on {}", self.listen);

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                info!("http server shutting down");
            })
            .await
            .map_err(|e| anyhow!("http server error: {}", e))?;

        Ok(())
    }
}
