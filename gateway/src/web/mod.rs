//! HTTP server
//!
//! Two routes: `/mcp` (the bridge, POST only, enforced in the handler so the
//! rejection carries the structured method-not-allowed body) and `/health`.

mod health;
mod mcp;
mod state;

pub use state::AppState;

use std::net::SocketAddr;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::{Json, Router};
use tower_http::trace::TraceLayer;

use mcp_common::ErrorBody;

/// Wraps the shared error body so handlers can return it as a response with
/// the kind's canonical HTTP status.
pub struct ApiError(pub ErrorBody);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.0.envelope())).into_response()
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Method enforcement happens inside the handler: a non-POST request
        // gets the structured 405 body, not axum's bare default.
        .route("/mcp", any(mcp::mcp_handler))
        .route("/health", get(health::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Binds and serves until the process is stopped.
pub async fn serve(state: AppState, port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "gateway listening");
    axum::serve(listener, create_router(state)).await?;
    Ok(())
}
