//! Entry point for the hostpulse agent. Reads config, starts the background
//! tasks and serves HTTP/WebSocket until Ctrl-C or SIGTERM.

use std::net::SocketAddr;
use std::sync::Arc;

use hostpulse_agent::api::router;
use hostpulse_agent::config::{Config, Invocation};
use hostpulse_agent::lifecycle::Lifecycle;
use hostpulse_agent::metrics::{SharedProvider, SysinfoProvider};
use hostpulse_agent::registry::ConnectionRegistry;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // .env is optional
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("hostpulse_agent=info")),
        )
        .init();

    let config = match Config::from_env_and_args()? {
        Invocation::Run(c) => Arc::new(c),
        Invocation::Help(usage) => {
            println!("{usage}");
            return Ok(());
        }
    };

    let provider: SharedProvider = Arc::new(SysinfoProvider::new());
    let registry = Arc::new(ConnectionRegistry::new());

    let mut lifecycle = Lifecycle::new(Arc::clone(&config));
    let state = lifecycle.start(provider, registry).await?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "hostpulse agent listening");

    let served = axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await;

    lifecycle.stop().await?;
    served?;
    Ok(())
}

/// Resolves on SIGINT (Ctrl-C) or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received SIGINT (Ctrl-C), shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
