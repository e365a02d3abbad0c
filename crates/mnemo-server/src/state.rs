// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The state every HTTP handler and background task shares, assembled once
//! by [`crate::init::initialize`] and held behind an `Arc` for cheap cloning
//! into axum's `State` extractor and each spawned timer task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::Notify;

use mnemo_config::Config;
use mnemo_queue::DurableQueue;
use mnemo_session::SessionManager;
use mnemo_store::RecordStore;
use mnemo_vector::{ServerManager, VectorIndex};

use crate::paths::DataPaths;

pub struct AppState {
    pub store: Arc<RecordStore>,
    pub queue: Arc<DurableQueue>,
    pub vector: Arc<dyn VectorIndex>,
    /// `None` when the configured backend doesn't own a child process (a
    /// discovered-already-running server, or the stdio legacy backend
    /// managing its own lifecycle internally).
    pub vector_server: Option<Arc<ServerManager>>,
    pub sessions: SessionManager,
    pub config: RwLock<Config>,
    pub paths: DataPaths,
    pub started_at: i64,
    pub version: &'static str,
    initialized: AtomicBool,
    shutdown: Arc<Notify>,
}

impl AppState {
    pub fn new(
        store: Arc<RecordStore>,
        queue: Arc<DurableQueue>,
        vector: Arc<dyn VectorIndex>,
        vector_server: Option<Arc<ServerManager>>,
        sessions: SessionManager,
        config: Config,
        paths: DataPaths,
    ) -> Self {
        Self {
            store,
            queue,
            vector,
            vector_server,
            sessions,
            config: RwLock::new(config),
            paths,
            started_at: chrono::Utc::now().timestamp(),
            version: env!("CARGO_PKG_VERSION"),
            initialized: AtomicBool::new(false),
            shutdown: Arc::new(Notify::new()),
        }
    }

    pub fn config(&self) -> Config {
        self.config.read().expect("config lock poisoned").clone()
    }

    pub fn set_config(&self, config: Config) {
        *self.config.write().expect("config lock poisoned") = config;
    }

    pub fn mark_initialized(&self) {
        self.initialized.store(true, Ordering::SeqCst);
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn request_shutdown(&self) {
        self.shutdown.notify_waiters();
    }

    pub async fn wait_for_shutdown(&self) {
        self.shutdown.notified().await;
    }
}
