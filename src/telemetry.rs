use std::path::PathBuf;

use tokio::signal;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initializes the global tracing subscriber: console output plus a rolling
/// file under `LOG_DIR` (default `./logs`), level from `LOG_LEVEL` or
/// `RUST_LOG`. Returns the file appender's guard — the caller must
/// keep it alive for the process lifetime or buffered lines are lost on
/// exit.
pub fn init_tracing() -> WorkerGuard {
    let log_dir = std::env::var("LOG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./logs"));
    std::fs::create_dir_all(&log_dir).ok();

    let filter = std::env::var("LOG_LEVEL")
        .ok()
        .and_then(|level| EnvFilter::try_new(level).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));

    let file_appender = tracing_appender::rolling::daily(&log_dir, "open-surplus-manager.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().json())
        .with(tracing_subscriber::fmt::layer().json().with_writer(non_blocking))
        .init();

    guard
}

/// Waits for `Ctrl+C` or `SIGTERM`, whichever comes first — a clean
/// shutdown this way exits `0`.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received");
}
