//! Control-plane HTTP server
//!
//! A small axum router in front of [`CbzEngine`]. Every route is restricted
//! to loopback peers; anything else gets an empty 404.

use crate::engine::CbzEngine;
use crate::error::{Error, Result};
use axum::{Router, middleware, routing::get};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod error_response;
pub mod loopback;
pub mod openapi;
pub mod routes;
pub mod state;

pub use openapi::ApiDoc;
pub use state::AppState;

/// Create the API router with all route definitions
///
/// # Routes
///
/// ## Catalog
/// - `GET /search?q=&max_results=` - Search manga by title
/// - `GET /manga/:id` - HTML page with embedded metadata
///
/// ## Tasks
/// - `GET /to_cbz?manga_id=&language=&volume_name=&chapter_names=&prefix=&part=` - Submit (idempotent) and poll
/// - `GET /task/:id/status` - Poll a job
///
/// ## Download
/// - `GET /download/:id` - Stream the finished archive
///
/// ## System
/// - `GET /health` - Health check
/// - `GET /openapi.json` - OpenAPI specification
pub fn create_router(engine: Arc<CbzEngine>) -> Router {
    let cors_enabled = engine.config().api.cors_enabled;
    let state = AppState::new(engine);

    let router = Router::new()
        // Catalog
        .route("/search", get(routes::search))
        .route("/manga/:id", get(routes::manga_page))
        // Tasks
        .route("/to_cbz", get(routes::to_cbz))
        .route("/task/:id/status", get(routes::task_status))
        // Download
        .route("/download/:id", get(routes::download))
        // System
        .route("/health", get(routes::health_check))
        .route("/openapi.json", get(routes::openapi_spec))
        .with_state(state);

    // Last layer applied runs first: trace → loopback guard → handler
    let router = router
        .layer(middleware::from_fn(loopback::require_loopback))
        .layer(TraceLayer::new_for_http());

    if cors_enabled {
        router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        router
    }
}

/// Serve the control plane on the configured bind address until `shutdown` resolves
///
/// The router is served with peer addresses attached, which the loopback
/// guard requires.
///
/// # Example
///
/// ```no_run
/// use mangadex_cbz::{CbzEngine, Config};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let engine = Arc::new(CbzEngine::new(Config::default())?);
/// mangadex_cbz::api::start_api_server(engine, async {
///     tokio::signal::ctrl_c().await.ok();
/// })
/// .await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_api_server<S>(engine: Arc<CbzEngine>, shutdown: S) -> Result<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    let bind_address = engine.config().api.bind_address;
    let listener = TcpListener::bind(bind_address).await?;
    serve_listener(listener, engine, shutdown).await
}

/// Serve the control plane on an already bound listener
pub async fn serve_listener<S>(
    listener: TcpListener,
    engine: Arc<CbzEngine>,
    shutdown: S,
) -> Result<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    let local_addr = listener.local_addr()?;
    if !local_addr.ip().is_loopback() {
        tracing::warn!(
            address = %local_addr,
            "control plane bound to a non-loopback address; non-local callers still get 404"
        );
    }
    tracing::info!(address = %local_addr, "API server listening");

    let app = create_router(engine);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    .map_err(|e| Error::ApiServerError(e.to_string()))?;

    tracing::info!("API server stopped");
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
