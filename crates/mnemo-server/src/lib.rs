// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The worker orchestrator: background initialization, the localhost HTTP
//! surface, the recovery/reaper/maintenance timers, and the graceful
//! shutdown sequence that ties every other crate in this workspace together
//! into one running process.

pub mod error;
mod http;
mod init;
pub mod paths;
mod policy;
mod recovery;
mod state;

pub use error::ApiError;
pub use paths::{DataPaths, PidFile};
pub use state::AppState;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use mnemo_config::{Config, SettingsWatcher};
use tracing::{info, warn};

/// Runs the worker until it receives Ctrl+C or a `/api/admin/shutdown` call,
/// then shuts down in the documented order: stop the settings watcher, stop
/// the recovery/reaper timers, request every active session to stop in
/// parallel, stop accepting HTTP connections, close the vector index
/// manager, and finally close the record store.
pub async fn run(config_path: PathBuf) -> anyhow::Result<()> {
    let config = mnemo_config::load(&config_path).context("loading settings.json")?;
    let port = config.server.port;

    let init::Initialized { state } = init::initialize(config.clone()).await.context("worker initialization failed")?;

    let settings_watcher = SettingsWatcher::new(state.paths.settings_file(), config.clone());
    let settings_task = recovery::spawn_settings_watcher(state.clone(), settings_watcher);
    let recovery_task = recovery::spawn_recovery_timer(state.clone());
    let reaper_task = recovery::spawn_reaper_timer(state.clone());
    let maintenance_task = recovery::spawn_vector_maintenance_timer(state.clone());

    let router = http::router(state.clone());
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr).await.with_context(|| format!("binding {addr}"))?;
    let bound_addr = listener.local_addr().context("reading bound local address")?;

    paths::PidFile::write(&state.paths.pid_file(), bound_addr.port(), state.started_at)
        .context("writing worker.pid")?;
    info!(addr = %bound_addr, "mnemod worker listening");

    let serve_state = state.clone();
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        serve_state.wait_for_shutdown().await;
    });

    tokio::select! {
        result = server => {
            if let Err(err) = result {
                warn!(error = %err, "HTTP server exited with an error");
            }
        }
        _ = wait_for_stop_signal() => {
            info!("received shutdown signal");
            state.request_shutdown();
        }
    }

    shutdown(&state, [settings_task, recovery_task, reaper_task, maintenance_task]).await;
    Ok(())
}

/// Waits for whichever stop signal the host launcher sends: Ctrl+C
/// (SIGINT) everywhere, or SIGTERM on Unix (the signal a process
/// supervisor sends to ask a daemon to stop).
async fn wait_for_stop_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

async fn shutdown(state: &Arc<AppState>, background_tasks: [tokio::task::JoinHandle<()>; 4]) {
    for task in background_tasks {
        task.abort();
    }

    let active = state.sessions.active_session_ids();
    info!(count = active.len(), "stopping active session processors");
    let grace = std::time::Duration::from_secs(5);
    let stops = active.into_iter().map(|id| state.sessions.delete_session(id, grace));
    futures::future::join_all(stops).await;

    if let Some(vector_server) = &state.vector_server {
        vector_server.shutdown().await;
    }
    if let Err(err) = state.vector.close().await {
        warn!(error = %err, "vector index close reported an error");
    }

    let _ = std::fs::remove_file(state.paths.pid_file());
    info!("mnemod worker shut down cleanly");
}

/// Used by the CLI to resolve the default config path before calling
/// [`run`], and by the `settings`/`status` subcommands to read a running
/// worker's config without starting a second instance.
pub fn default_config_path() -> PathBuf {
    let data_dir = dirs::data_dir().unwrap_or_else(|| PathBuf::from(".")).join("mnemod");
    data_dir.join("settings.json")
}

pub fn load_config(path: &std::path::Path) -> anyhow::Result<Config> {
    mnemo_config::load(path)
}
