//! # HTTP Server for Label Preview and Writing
//!
//! ## Endpoints
//!
//! | Method | Path | Result |
//! |--------|------|--------|
//! | GET | `/api/models` | capability table |
//! | POST | `/api/preview` | PNG of the composed canvas |
//! | POST | `/api/write` | transfer report (409 busy, 404 unknown model, 502 transfer failure) |
//! | GET | `/api/labels/:address` | session state of one label |
//! | DELETE | `/api/labels/:address` | forget an idle label (409 while busy) |
//!
//! ## Usage
//!
//! ```bash
//! etiqueta serve --listen 0.0.0.0:8080 --simulate 28:AA:BB:CC:DD:EE@0x28
//! ```

mod error;
mod handlers;
mod state;

pub use error::ApiError;
pub use state::AppState;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::error::EtiquetaError;

/// Build the router over shared state.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/models", get(handlers::models::list))
        .route("/api/preview", post(handlers::labels::preview))
        .route("/api/write", post(handlers::labels::write))
        .route(
            "/api/labels/:address",
            get(handlers::labels::status).delete(handlers::labels::forget),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server and run until Ctrl-C.
///
/// On shutdown every in-flight transfer is cancelled, which disconnects its
/// link before the server returns.
pub async fn serve(state: Arc<AppState>, listen_addr: &str) -> Result<(), EtiquetaError> {
    let app = router(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .map_err(|e| EtiquetaError::Server(format!("Failed to bind to {}: {}", listen_addr, e)))?;

    tracing::info!(listen = listen_addr, "etiqueta HTTP server listening");

    let shutdown = state.shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
            tracing::info!("shutting down, cancelling transfers");
            shutdown.cancel();
        })
        .await
        .map_err(|e| EtiquetaError::Server(format!("Server error: {}", e)))?;

    Ok(())
}
