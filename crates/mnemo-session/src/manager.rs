// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Session registry: starts, tracks, restarts, and stops per-session
//! processor loops on behalf of the worker orchestrator.
//!
//! A session `HashMap` behind a mutex, with a cheap-to-clone handle shared
//! across the HTTP layer; each entry owns a `watch`-based cancellation token
//! and a `SharedState` for its processor loop.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use mnemo_config::Config;
use mnemo_types::SessionEvent;

use crate::processor::{self, ProcessorDeps};
use crate::state::SharedState;

struct ActiveSession {
    cancel_tx: watch::Sender<bool>,
    events_tx: broadcast::Sender<SessionEvent>,
    shared: Arc<SharedState>,
    handle: JoinHandle<()>,
}

/// Registry of every session with a running processor loop. Cheap to clone —
/// internals live behind an `Arc<Mutex<_>>` so every HTTP handler and the
/// recovery timer can hold their own copy.
#[derive(Clone)]
pub struct SessionManager {
    deps: ProcessorDeps,
    wake: Arc<mnemo_queue::WakeBus>,
    sessions: Arc<Mutex<HashMap<i64, ActiveSession>>>,
}

impl SessionManager {
    pub fn new(deps: ProcessorDeps) -> Self {
        let wake = deps.queue.bus();
        Self { deps, wake, sessions: Arc::new(Mutex::new(HashMap::new())) }
    }

    /// Starts a processor loop for `session_id` if one isn't already
    /// running; a no-op when it is.
    pub fn ensure_started(&self, session_id: i64, content_session_id: String, project: String, config: Config) {
        let mut sessions = self.sessions.lock().expect("session registry poisoned");
        if sessions.contains_key(&session_id) {
            return;
        }

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (events_tx, _) = broadcast::channel(256);
        let shared = Arc::new(SharedState::new(config.provider));
        let notify = self.wake.notifier(session_id);

        let handle = processor::spawn(
            self.deps.clone(),
            session_id,
            content_session_id,
            project,
            config,
            cancel_rx,
            events_tx.clone(),
            shared.clone(),
            notify,
        );

        info!(session_id, "session processor started");
        sessions.insert(session_id, ActiveSession { cancel_tx, events_tx, shared, handle });
    }

    /// Subscribe to a running session's event stream; `None` if it isn't
    /// active.
    pub fn subscribe(&self, session_id: i64) -> Option<broadcast::Receiver<SessionEvent>> {
        let sessions = self.sessions.lock().expect("session registry poisoned");
        sessions.get(&session_id).map(|s| s.events_tx.subscribe())
    }

    /// Wake a session's processor loop sooner than its next idle-timeout
    /// poll, e.g. right after enqueueing new work for it.
    pub fn wake(&self, session_id: i64) {
        self.wake.wake(session_id);
    }

    pub fn is_active(&self, session_id: i64) -> bool {
        self.sessions.lock().expect("session registry poisoned").contains_key(&session_id)
    }

    pub fn active_session_ids(&self) -> Vec<i64> {
        self.sessions.lock().expect("session registry poisoned").keys().copied().collect()
    }

    pub fn in_flight_count(&self, session_id: i64) -> Option<u32> {
        let sessions = self.sessions.lock().expect("session registry poisoned");
        sessions.get(&session_id).map(|s| s.shared.in_flight_count())
    }

    pub fn status(&self, session_id: i64) -> Option<ProcessorStatusSnapshot> {
        let sessions = self.sessions.lock().expect("session registry poisoned");
        sessions.get(&session_id).map(|s| ProcessorStatusSnapshot {
            status: s.shared.status(),
            in_flight: s.shared.in_flight_count(),
            current_provider: s.shared.current_provider(),
        })
    }

    /// True when every active session is idle with nothing in flight — the
    /// condition the settings hot-reload path waits for before applying a
    /// change that doesn't warrant a staggered restart.
    pub fn all_safe_to_restart(&self) -> bool {
        let sessions = self.sessions.lock().expect("session registry poisoned");
        sessions.values().all(|s| s.shared.safe_to_restart())
    }

    /// Requests a restart of every active session against `new_config`,
    /// staggering busy sessions by `new_config.server.restart_stagger_ms` so
    /// a fleet-wide settings change doesn't thunder all provider clients at
    /// once. Sessions already idle restart immediately: the supervisor loop
    /// picks the request up on its very next pass through the top of
    /// [`processor::spawn`]'s loop, because `ensure_started` is a no-op for
    /// an id already in the registry — the running loop keeps its identity
    /// and just notices `shared.pending_restart` was set.
    pub fn schedule_restarts_for_settings_change(&self, reason: impl Into<String>, new_config: &Config) {
        let reason = reason.into();
        let stagger = Duration::from_millis(new_config.server.restart_stagger_ms);
        let sessions = self.sessions.lock().expect("session registry poisoned");
        for (idx, (session_id, session)) in sessions.iter().enumerate() {
            session.shared.request_restart(reason.clone());
            let wake = self.wake.clone();
            let session_id = *session_id;
            let delay = stagger * idx as u32;
            tokio::spawn(async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                wake.wake(session_id);
            });
        }
    }

    /// Cooperatively stops a session's processor loop and removes it from
    /// the registry. Waits up to `grace` for the task to exit on its own
    /// before giving up on the join (the task itself is left running in that
    /// case — `watch` cancellation is best-effort, never a hard kill).
    pub async fn delete_session(&self, session_id: i64, grace: Duration) {
        let active = { self.sessions.lock().expect("session registry poisoned").remove(&session_id) };
        let Some(active) = active else { return };

        let _ = active.cancel_tx.send(true);
        match tokio::time::timeout(grace, active.handle).await {
            Ok(Ok(())) => info!(session_id, "session processor stopped"),
            Ok(Err(err)) => warn!(session_id, error = %err, "session processor task panicked"),
            Err(_) => warn!(session_id, "session processor did not stop within grace period"),
        }
        self.wake.remove(session_id);
        let _ = active.events_tx.send(SessionEvent::SessionCompleted { session_id });
    }

    /// Removes any session whose supervisor task has already exited on its
    /// own (e.g. `FatalAbandoned`) without anyone calling `delete_session`.
    /// Intended to run alongside the periodic recovery timer.
    pub fn reap_finished(&self) {
        let mut sessions = self.sessions.lock().expect("session registry poisoned");
        sessions.retain(|session_id, s| {
            let finished = s.handle.is_finished();
            if finished {
                info!(session_id, "reaping finished session processor");
            }
            !finished
        });
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ProcessorStatusSnapshot {
    pub status: crate::state::ProcessorStatus,
    pub in_flight: u32,
    pub current_provider: mnemo_config::ProviderKind,
}
