use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Routes `tracing` output to `logs/healthfinder.log`, rolled daily.
///
/// The terminal belongs to the TUI, so nothing is written to stdout. Keep the
/// returned guard alive for the whole run or buffered lines are lost.
pub fn initialize_logging() -> WorkerGuard {
    // Create 'logs' directory if it doesn't exist
    let _ = std::fs::create_dir_all("logs");

    let file_appender = tracing_appender::rolling::daily("logs", "healthfinder.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    tracing::info!("Logging initialized successfully.");
    guard
}
