mod commands;
mod error;
mod feed_file;
mod settings;

use clap::Parser;
use settings::Settings;
use std::process::ExitCode;

/// Initialize logging to stderr, keeping stdout for command output.
///
/// If RUST_LOG is not set, a default matching the build profile is used.
fn setup_logging() {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::fmt;

    if std::env::var("RUST_LOG").is_err() {
        // Safety: single-threaded at startup
        unsafe {
            if cfg!(debug_assertions) {
                std::env::set_var("RUST_LOG", "debug");
            } else {
                std::env::set_var("RUST_LOG", "info");
            }
        }
    }

    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    setup_logging();
    let settings = Settings::parse();
    tracing::debug!("Settings: {:?}", settings);

    let stdout = std::io::stdout();
    match commands::run(&settings, &mut stdout.lock()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{}", err);
            ExitCode::FAILURE
        }
    }
}
