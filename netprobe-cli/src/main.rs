//! `netprobe` command-line entry point.
//!
//! Runs one probe and prints its JSON envelope on stdout. Logs go to stderr,
//! filtered by `RUST_LOG`. Any envelope, including `error` and `timeout`,
//! exits with status 0; only configuration or output failures do not.

mod cli;
mod config;

use std::process::ExitCode;

use clap::Parser;
use cli::Cli;
use netprobe_engine::ProbeEngine;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> ExitCode {
    // stdout carries the envelope
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .without_time()
                .with_ansi(false),
        )
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let engine_config = match config::load_config(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("{e:#}");
            return ExitCode::FAILURE;
        }
    };

    let engine = ProbeEngine::new(engine_config);
    tracing::debug!("Engine config: {:?}", engine.config());
    let options = cli.probe_options();
    tracing::debug!("Running {} probe against {}", cli.kind, cli.target);
    let result = engine.run_probe(&cli.kind, &cli.target, &options).await;

    let rendered = if cli.pretty {
        serde_json::to_string_pretty(&result)
    } else {
        serde_json::to_string(&result)
    };
    match rendered {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("Failed to serialize result: {e}");
            ExitCode::FAILURE
        }
    }
}
