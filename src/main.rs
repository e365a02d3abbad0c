// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(mnemo_server::default_config_path);

    match cli.command {
        Commands::Serve { port, data_dir } => run_serve(config_path, port, data_dir).await,
        Commands::Status { port } => run_status(&config_path, port).await,
        Commands::ShowConfig => run_show_config(&config_path),
    }
}

async fn run_serve(
    config_path: PathBuf,
    port_override: Option<u16>,
    data_dir_override: Option<PathBuf>,
) -> anyhow::Result<()> {
    if port_override.is_some() || data_dir_override.is_some() {
        let mut config = mnemo_server::load_config(&config_path)
            .unwrap_or_else(|_| mnemo_config::Config::default());
        if let Some(port) = port_override {
            config.server.port = port;
        }
        if let Some(data_dir) = &data_dir_override {
            config.server.data_dir = Some(data_dir.to_string_lossy().into_owned());
        }
        mnemo_config::save(&config_path, &config).context("writing settings.json")?;
    }

    mnemo_server::run(config_path).await
}

async fn run_status(config_path: &std::path::Path, port_override: Option<u16>) -> anyhow::Result<()> {
    let port = match port_override {
        Some(port) => port,
        None => {
            let config = mnemo_server::load_config(config_path)
                .context("loading settings.json to resolve the worker's port")?;
            config.server.port
        }
    };

    let url = format!("http://127.0.0.1:{port}/api/status");
    let body = reqwest::get(&url)
        .await
        .with_context(|| format!("connecting to mnemod worker at {url} — is it running?"))?
        .error_for_status()
        .context("worker returned an error status")?
        .text()
        .await
        .context("reading response body")?;

    let parsed: serde_json::Value = serde_json::from_str(&body).unwrap_or(serde_json::Value::Null);
    println!("{}", serde_json::to_string_pretty(&parsed)?);
    Ok(())
}

fn run_show_config(config_path: &std::path::Path) -> anyhow::Result<()> {
    let config = mnemo_server::load_config(config_path).context("loading settings.json")?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

/// Mirrors the worker's own logging setup: human-readable to stderr by
/// default, or to a file when MNEMOD_LOG_FILE is set so a daemon supervisor
/// sees a clean stdout/stderr pair. `--verbose` raises the default filter.
fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if let Ok(log_path) = std::env::var("MNEMOD_LOG_FILE") {
        use std::sync::Mutex;
        if let Ok(file) = std::fs::OpenOptions::new().create(true).append(true).open(&log_path) {
            let _ = tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_ansi(false).with_writer(Mutex::new(file)))
                .with(filter)
                .try_init();
            return;
        }
    }

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}
