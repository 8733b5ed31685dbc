//! skadi - command-line client for the skadi school management backend.
//!
//! Signs in, keeps the session between runs and exposes the member
//! administration endpoints. Expired access tokens are refreshed
//! transparently by the core pipeline.

mod app;
mod cli;
mod keychain;

use std::io;
use std::path::Path;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use app::App;
use cli::Cli;

/// Log file written inside `SKADI_LOG_DIR`
const LOG_FILE_NAME: &str = "skadi.log";

/// Background writer appending to `<dir>/skadi.log`
fn log_file_writer(dir: &Path) -> (NonBlocking, WorkerGuard) {
    let appender = tracing_appender::rolling::never(dir, LOG_FILE_NAME);
    tracing_appender::non_blocking(appender)
}

/// Initialize the tracing subscriber for logging.
///
/// The returned guard flushes the log file and must live until exit.
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=skadi_core=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var_os("SKADI_LOG_DIR") {
        Some(dir) => {
            let (writer, guard) = log_file_writer(Path::new(&dir));
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _log_guard = init_tracing();
    info!(command = ?cli.command, "skadi starting");

    let mut app = App::new()?;
    app.run(cli.command).await
}
