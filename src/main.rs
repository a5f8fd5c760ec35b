use eth_fee_reconciler::app::{create_router, create_state};
use eth_fee_reconciler::config::AppConfig;
use eth_fee_reconciler::error::{Error, Result};
use tokio::signal;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize config from environment
    let config = AppConfig::from_env()?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(config.log_level.clone())
        .init();

    tracing::info!("Starting Ethereum fee reconciler service");
    tracing::debug!("Using configuration: {:?}", config);

    let state = create_state(&config).await?;
    let router = create_router(state.clone());
    let addr = config.server_address();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Server(format!("Couldn't bind {}: {}", addr, e)))?;

    tracing::info!("Listening on {}", addr);

    let served = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| Error::Server(e.to_string()));

    // Release every polling registration before exiting.
    state.registry.shutdown().await;

    served
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
