use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use order_service::app::App;
use order_service::config::Config;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    // Default to INFO level, can be overridden with RUST_LOG env var
    // Example: RUST_LOG=debug cargo run
    let (json_layer, text_layer) = if config.is_production() {
        (Some(fmt::layer().json().with_target(true).with_thread_ids(true)), None)
    } else {
        (None, Some(fmt::layer().with_target(true).with_thread_ids(true)))
    };
    tracing_subscriber::registry()
        .with(json_layer)
        .with(text_layer)
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,order_service=debug")),
        )
        .init();

    tracing::info!(env = %config.env, "Starting order service");

    let cancel = CancellationToken::new();
    let mut app = App::build(config).await?;

    if let Err(e) = app.run(&cancel).await {
        tracing::error!(error = %e, "Order service failed to start");
        cancel.cancel();
        if let Err(shutdown_err) = app.shutdown().await {
            tracing::error!(error = %shutdown_err, "Shutdown after failed start");
        }
        return Err(e);
    }

    wait_for_signal().await;
    tracing::info!("Shutdown signal received");
    cancel.cancel();

    app.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!(error = %e, "Cannot listen for SIGTERM, waiting for Ctrl+C only");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
