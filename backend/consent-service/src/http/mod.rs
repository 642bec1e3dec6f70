/// HTTP surface of the consent service
///
/// ## Endpoints
///
/// - `GET /health`: liveness, always 200
/// - `GET /ready`: 200 while connected with both consent keys cached, else 503
/// - `GET /consent?challenge=...`: authenticate the user and open a consent session
/// - `POST /consent`: apply the user's decision and redirect back to the client
mod consent;

pub use consent::{ConsentDecision, PendingConsent};

use axum::{
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Router,
};
use std::future::Future;
use std::sync::Arc;
use tracing::info;

use crate::idp::IdentityProvider;
use crate::providers::Provider;

/// Shared HTTP server state
#[derive(Clone)]
pub struct AppState {
    pub idp: Arc<IdentityProvider>,
    pub provider: Arc<dyn Provider>,
}

/// Build the HTTP router with all consent endpoints
pub fn build_router(state: AppState) -> Router {
    let state = Arc::new(state);

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route(
            "/consent",
            get(consent::begin_consent).post(consent::finish_consent),
        )
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_check(
    axum::extract::State(state): axum::extract::State<Arc<AppState>>,
) -> impl IntoResponse {
    if state.idp.is_ready().await {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

/// Serve until `shutdown` resolves
pub async fn start_http_server(
    state: AppState,
    host: &str,
    port: u16,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = build_router(state);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Starting consent HTTP server on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

    Ok(())
}
