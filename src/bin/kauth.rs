//! Keycloak-protected demo server binary.
//!
//! Loads configuration from the environment, wires the identity provider
//! client and the in-memory session store into the guarded router, and serves
//! it with graceful shutdown. Expired sessions are swept in the background.

use anyhow::Result;
use clap::Parser;
use kauth::{
    config::Config,
    http::{AppState, build_router, route_metadata},
    oauth::Keycloak,
    storage::{MemorySessionStore, SessionStore},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing_subscriber::prelude::*;

const SESSION_CLEANUP_INTERVAL_SECS: u64 = 300;

#[derive(Parser)]
#[command(
    name = "kauth",
    about = "Keycloak authentication and authorization gateway",
    version = env!("CARGO_PKG_VERSION")
)]
struct Cli {
    /// Listen port, overriding HTTP_PORT
    #[arg(long, help = "Port to listen on (overrides the HTTP_PORT environment variable)")]
    port: Option<u16>,

    /// Reject bearer values without a scheme, overriding KEYCLOAK_STRICT
    #[arg(long, help = "Require the Bearer scheme on Authorization headers")]
    strict: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "kauth=debug,info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().pretty())
        .init();

    let config = Config::new()?;
    tracing::info!(version = ?config.version, realm = ?config.keycloak.realm, "Starting kauth");

    let http_client = reqwest::Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(*config.http_client_timeout.as_ref())
        .build()?;

    let mut options = config.keycloak.clone();
    if cli.strict {
        options = options.with_strict(true);
    }
    let keycloak = Keycloak::new(Arc::new(options), http_client);
    let session_ttl = chrono::Duration::from_std(*config.session_ttl.as_ref())?;
    let session_store = Arc::new(MemorySessionStore::with_ttl(session_ttl));
    let app = build_router(AppState::new(
        keycloak,
        session_store.clone(),
        route_metadata(),
    ));

    // Setup graceful shutdown
    let tracker = TaskTracker::new();
    let token = CancellationToken::new();

    {
        let tracker = tracker.clone();
        let inner_token = token.clone();

        let ctrl_c = async {
            if let Err(err) = signal::ctrl_c().await {
                tracing::error!("failed to install Ctrl+C handler: {}", err);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(err) => {
                    tracing::error!("failed to install signal handler: {}", err);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::spawn(async move {
            tokio::select! {
                () = inner_token.cancelled() => { },
                _ = terminate => {},
                _ = ctrl_c => {},
            }

            tracker.close();
            inner_token.cancel();
        });
    }

    // Sweep expired sessions
    {
        let inner_token = token.clone();
        let sweep_every = Duration::from_secs(SESSION_CLEANUP_INTERVAL_SECS)
            .min(*config.session_ttl.as_ref());
        tracker.spawn(async move {
            let mut interval = tokio::time::interval(sweep_every);
            loop {
                tokio::select! {
                    () = inner_token.cancelled() => break,
                    _ = interval.tick() => {
                        match session_store.cleanup_expired_sessions().await {
                            Ok(0) => {}
                            Ok(removed) => tracing::debug!(removed, "expired sessions removed"),
                            Err(err) => tracing::error!(error = %err, "session cleanup failed"),
                        }
                    }
                }
            }
        });
    }

    // Start HTTP server
    {
        let http_port = cli.port.unwrap_or(*config.http_port.as_ref());
        let inner_token = token.clone();
        tracker.spawn(async move {
            let bind_address = format!("0.0.0.0:{http_port}");
            tracing::info!("Starting server on {bind_address}");
            let listener = match TcpListener::bind(&bind_address).await {
                Ok(listener) => listener,
                Err(err) => {
                    tracing::error!("failed to bind {}: {}", bind_address, err);
                    inner_token.cancel();
                    return;
                }
            };

            let shutdown_token = inner_token.clone();
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_token.cancelled().await;
                    tracing::info!("axum graceful shutdown complete");
                })
                .await;
            if let Err(err) = result {
                tracing::error!("axum task failed: {}", err);
            }

            inner_token.cancel();
        });
    }

    tracker.wait().await;

    Ok(())
}
