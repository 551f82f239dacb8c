//! Probe endpoint server.
//!
//! One instance of this server runs in each probe region and answers trial
//! requests from the orchestrator.

mod handlers;

pub use handlers::*;

use crate::config::ServerConfig;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use tower_http::cors::{Any, CorsLayer};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
}

/// HTTP server exposing the connection probe.
pub struct Server {
    state: AppState,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            state: AppState { config },
        }
    }

    /// Build the router with all routes.
    fn routes(&self) -> Router {
        let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

        Router::new()
            .route("/", get(handlers::handle_identity))
            .route("/api/probe", post(handlers::handle_probe))
            .layer(cors)
            .layer(DefaultBodyLimit::max(64 * 1024))
            .with_state(self.state.clone())
    }

    /// Start the server on the configured port.
    pub async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.state.config.http_port));
        let router = self.routes();

        tracing::info!(
            "Probe server for region {} listening on {}",
            self.state.config.region_id,
            addr
        );

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router).await?;

        Ok(())
    }
}
