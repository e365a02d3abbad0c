// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Background timers the orchestrator keeps running for the life of the
//! process: periodic queue recovery, finished-session reaping, the embedding
//! server's health check, vector maintenance, and the settings hot-reload
//! watcher.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, info, warn};

use mnemo_config::SettingsWatcher;
use mnemo_vector::{format_observation, format_summary, DocMeta};

use crate::state::AppState;

/// Adds 0-20% jitter to a base interval so many worker processes on the same
/// host don't all wake for recovery at the same instant.
fn jittered(base_secs: u64) -> Duration {
    let jitter_fraction: f64 = rand::thread_rng().gen_range(0.0..0.2);
    Duration::from_secs_f64(base_secs as f64 * (1.0 + jitter_fraction))
}

/// Re-starts a processor loop for any session left with pending work that
/// has no active loop — the case after a crash, or a restart that raced an
/// in-flight enqueue. Capped per pass at `server.recovery_cap` so a large
/// backlog doesn't thunder every session's provider client at once.
pub fn spawn_recovery_timer(state: Arc<AppState>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let interval = state.config().recovery.effective_interval_secs();
            tokio::time::sleep(jittered(interval)).await;

            if let Err(err) = run_recovery_pass(&state) {
                warn!(error = %err, "recovery pass failed");
            }
        }
    })
}

fn run_recovery_pass(state: &Arc<AppState>) -> anyhow::Result<()> {
    let cap = state.config().server.recovery_cap;
    let pending_sessions = state.queue.sessions_with_pending_messages()?;
    let mut started = 0;

    for session_id in pending_sessions {
        if started >= cap {
            debug!(cap, "recovery pass hit its per-pass cap, remaining sessions wait for next pass");
            break;
        }
        if state.sessions.is_active(session_id) {
            continue;
        }
        let Some(session) = state.store.get_session_by_id(session_id)? else {
            continue;
        };
        info!(session_id, "recovery timer restarting processor for session with pending work");
        state.sessions.ensure_started(session_id, session.content_session_id, session.project, state.config());
        started += 1;
    }

    Ok(())
}

/// Reaps processor tasks that exited on their own (e.g. `FatalAbandoned`)
/// without anyone calling `delete_session`, and ticks the embedding server's
/// health check so a silently-died child gets restarted.
pub fn spawn_reaper_timer(state: Arc<AppState>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let interval = state.config().recovery.reaper_interval_secs.max(30);
            tokio::time::sleep(Duration::from_secs(interval)).await;

            state.sessions.reap_finished();

            if let Some(vector_server) = &state.vector_server {
                if let Err(err) = vector_server.health_check_once().await {
                    warn!(error = %err, "embedding server health check failed");
                }
            }
        }
    })
}

/// Best-effort vector maintenance: orphan-collection cleanup and per-project
/// retention pruning, both skippable via `vector.maintenance_enabled`.
pub fn spawn_vector_maintenance_timer(state: Arc<AppState>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let config = state.config();
            if !config.vector.maintenance_enabled {
                tokio::time::sleep(Duration::from_secs(config.recovery.effective_interval_secs())).await;
                continue;
            }
            tokio::time::sleep(Duration::from_secs(config.vector.health_interval_secs.max(60) * 6)).await;

            let cleaned = mnemo_vector::run_orphan_cleanup(state.vector.as_ref()).await;
            if cleaned > 0 {
                info!(cleaned, "vector maintenance removed orphaned collections");
            }

            if let Err(err) = run_retention_pass(&state, config.vector.retention_max_items).await {
                warn!(error = %err, "vector retention pass failed");
            }
        }
    })
}

async fn run_retention_pass(state: &Arc<AppState>, max_items: usize) -> anyhow::Result<()> {
    for project in state.store.distinct_projects()? {
        let mut metas: Vec<DocMeta> = Vec::new();
        for obs in state.store.list_observations_for_project(&project)? {
            for doc in format_observation(&obs) {
                metas.push(DocMeta { id: doc.id, doc_type: obs_doc_type(&doc), sqlite_id: obs.id, created_at_epoch: obs.created_at_epoch });
            }
        }
        for summary in state.store.list_summaries_for_project(&project)? {
            for doc in format_summary(&summary) {
                metas.push(DocMeta { id: doc.id, doc_type: "summary".to_string(), sqlite_id: summary.id, created_at_epoch: summary.created_at_epoch });
            }
        }

        let pruned = mnemo_vector::run_retention_prune(state.vector.as_ref(), &project, &metas, max_items).await;
        if pruned > 0 {
            info!(project, pruned, "vector retention pass pruned old documents");
        }
    }
    Ok(())
}

fn obs_doc_type(doc: &mnemo_vector::Document) -> String {
    doc.metadata.get("doc_type").and_then(|v| v.as_str()).unwrap_or("observation").to_string()
}

/// Polls `settings.json` for changes and schedules restarts for whichever
/// sessions the diff affects. Runs at a fixed short interval independent of
/// the recovery timer — hot-reload should feel near-immediate.
pub fn spawn_settings_watcher(state: Arc<AppState>, mut watcher: SettingsWatcher) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(2)).await;
            let Some((new_config, triggers)) = watcher.poll() else { continue };

            state.set_config(new_config.clone());
            if let Some(vector_server) = &state.vector_server {
                vector_server.reset_circuit_breaker();
            }
            if !triggers.is_empty() {
                info!(?triggers, "settings.json changed on disk, scheduling session restarts");
                state.sessions.schedule_restarts_for_settings_change("settings file changed", &new_config);
            }
        }
    })
}
