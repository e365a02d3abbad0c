// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Background initialization: open the record store, recover any work a
//! crashed prior run left `processing`, bring the vector index online, and
//! assemble the shared [`AppState`]. Any failure here is fatal — the worker
//! has nothing useful to serve without its store and queue.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use mnemo_config::Config;
use mnemo_queue::DurableQueue;
use mnemo_session::{ProcessorDeps, SessionManager};
use mnemo_store::RecordStore;
use mnemo_vector::{HttpVectorBackend, ServerManager, ServerManagerConfig, StdioVectorBackend, VectorIndex};

use crate::paths::DataPaths;
use crate::state::AppState;

pub struct Initialized {
    pub state: Arc<AppState>,
}

pub async fn initialize(config: Config) -> anyhow::Result<Initialized> {
    let paths = DataPaths::resolve(config.server.data_dir.as_deref());
    paths.ensure_root().with_context(|| format!("creating data directory {}", paths.root().display()))?;

    let store = Arc::new(RecordStore::open(paths.db_file()).context("opening record store")?);
    let queue = Arc::new(DurableQueue::new(store.shared_conn()));
    let stuck = queue.reset_stuck(config.server.stuck_threshold_secs as i64).context("resetting stuck queue rows")?;
    if stuck > 0 {
        info!(count = stuck, "recovered stuck pending rows from a prior run");
    }

    let (vector, vector_server) = build_vector_backend(&config, &paths).await?;

    let deps = ProcessorDeps { store: store.clone(), queue: queue.clone(), vector: vector.clone() };
    let sessions = SessionManager::new(deps);

    // settings.json may not exist yet on a first run; seed it with the
    // config we just loaded so the hot-reload watcher has a baseline file.
    if !paths.settings_file().is_file() {
        mnemo_config::save(&paths.settings_file(), &config).context("seeding settings.json")?;
    }

    let state = Arc::new(AppState::new(store, queue, vector, vector_server, sessions, config, paths));
    state.mark_initialized();

    Ok(Initialized { state })
}

/// Chooses and brings up the configured vector backend. `embedding_command`
/// present means the worker owns the child's lifecycle; absent means the
/// embedding server is assumed already running and only ever discovered.
async fn build_vector_backend(config: &Config, paths: &DataPaths) -> anyhow::Result<(Arc<dyn VectorIndex>, Option<Arc<ServerManager>>)> {
    let Some(base_url) = config.vector.embedding_base_url.as_deref() else {
        info!("no embedding_base_url configured, falling back to legacy stdio backend");
        let command = config
            .vector
            .embedding_command
            .clone()
            .context("vector.embedding_command is required when embedding_base_url is unset")?;
        let backend: Arc<dyn VectorIndex> = Arc::new(StdioVectorBackend::new(&command));
        return Ok((backend, None));
    };

    let backend: Arc<dyn VectorIndex> = Arc::new(HttpVectorBackend::new(base_url));

    let Some(command) = config.vector.embedding_command.clone() else {
        info!(base_url, "embedding server externally managed, discovery only");
        return Ok((backend, None));
    };

    let manager = Arc::new(ServerManager::new(ServerManagerConfig {
        command,
        data_dir: paths.vector_dir().to_string_lossy().into_owned(),
        base_url: base_url.to_string(),
        startup_timeout_secs: config.vector.startup_timeout_secs,
        health_interval_secs: config.vector.health_interval_secs,
        restart_backoff_min_secs: config.vector.restart_backoff_min_secs,
        restart_backoff_max_secs: config.vector.restart_backoff_max_secs,
        circuit_breaker_threshold: config.vector.circuit_breaker_threshold,
    }));
    manager.ensure_started().await.context("starting embedding server")?;

    Ok((backend, Some(manager)))
}
