use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::signal;

use civreg_notify::config::Settings;
use civreg_notify::fanout::FanoutService;
use civreg_notify::server::{create_app, AppState};
use civreg_notify::shutdown::GracefulShutdown;
use civreg_notify::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first so logging can honour it
    let settings = Settings::new()?;

    let _telemetry = init_telemetry(&settings.logging, &settings.otel)?;
    tracing::info!(
        keep_alive_secs = settings.stream.keep_alive_interval,
        stale_threshold_secs = settings.stream.stale_threshold,
        "Configuration loaded"
    );

    // Create application state
    let state = AppState::new(settings.clone());
    state.fanout.start();
    tracing::info!("Application state initialized");

    let app = create_app(state.clone());

    // Start server
    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // Open event streams only end once their connections are closed, so the
    // fan-out teardown runs inside the signal future, before axum drains.
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_handler(state.fanout.clone()))
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal_handler(fanout: Arc<FanoutService>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
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
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }

    GracefulShutdown::new(fanout).execute("signal received").await;
}
