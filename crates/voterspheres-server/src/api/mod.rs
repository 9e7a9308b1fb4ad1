//! HTTP surface
//!
//! Assembles the feature routers with the middleware stack and runs the
//! server until the shutdown future resolves.

pub mod response;

use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use tower_http::compression::CompressionLayer;

use crate::config::{Config, CorsConfig};
use crate::features::{self, FeatureState};
use crate::middleware;

/// Create the application router with all routes and middleware
pub fn create_router(state: FeatureState, cors: &CorsConfig) -> Router {
    Router::new()
        .merge(features::page_router(state.clone()))
        .nest("/api/v1", features::api_router(state))
        // Apply layers from innermost to outermost
        .layer(CompressionLayer::new())
        .layer(middleware::tracing_layer())
        .layer(middleware::cors_layer(cors))
}

/// Bind and serve until `shutdown` completes
pub async fn serve<F>(config: &Config, app: Router, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
