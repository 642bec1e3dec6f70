/// Consent Service Main Entry Point
///
/// Starts the HTTP server with:
/// - Identity provider connected to the authorization server (startup fails otherwise)
/// - In-memory challenge session store
/// - HTTP Basic authentication from an htpasswd file
use anyhow::{Context, Result};
use consent_service::{
    config::Settings,
    http::{start_http_server, AppState},
    providers::BasicAuth,
    IdentityProvider, MemoryChallengeStore,
};
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "consent_service=info,info".into()),
        )
        .with_target(false)
        .json()
        .init();

    info!("Starting Consent Service");

    let settings = Settings::load().context("Failed to load configuration")?;
    info!("Configuration loaded successfully");

    let store = Arc::new(MemoryChallengeStore::default());
    let idp = IdentityProvider::new(settings.idp_config(), store);

    idp.connect()
        .await
        .context("Failed to connect to the authorization server")?;

    let provider = BasicAuth::from_file(
        &settings.basic_auth.htpasswd_file,
        settings.basic_auth.realm.clone(),
    )
    .context("Failed to load htpasswd file")?;

    let state = AppState {
        idp: Arc::clone(&idp),
        provider: Arc::new(provider),
    };

    start_http_server(
        state,
        &settings.server.host,
        settings.server.port,
        shutdown_signal(),
    )
    .await
    .context("HTTP server error")?;

    idp.close().await;
    info!("Consent service shutdown complete");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }

    info!("Shutting down gracefully...");
}
