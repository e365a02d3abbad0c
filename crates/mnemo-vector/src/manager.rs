// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Lifecycle manager for the child embedding server: discover-or-spawn,
//! health polling, periodic health checks, a circuit breaker on repeated
//! restart failure, and graceful shutdown.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{info, warn};

use mnemo_util::url::join;

use crate::error::{Result, VectorError};

pub struct ServerManagerConfig {
    pub command: String,
    pub data_dir: String,
    pub base_url: String,
    pub startup_timeout_secs: u64,
    pub health_interval_secs: u64,
    pub restart_backoff_min_secs: u64,
    pub restart_backoff_max_secs: u64,
    pub circuit_breaker_threshold: u32,
}

/// Tracks the spawned child (if we own it) and the circuit breaker state.
/// A server discovered already running via heartbeat has `child: None` and
/// is never killed by [`ServerManager::shutdown`].
pub struct ServerManager {
    cfg: ServerManagerConfig,
    client: reqwest::Client,
    child: Mutex<Option<Child>>,
    consecutive_failures: AtomicU32,
    circuit_open: AtomicBool,
}

impl ServerManager {
    pub fn new(cfg: ServerManagerConfig) -> Self {
        Self {
            client: reqwest::Client::builder().timeout(Duration::from_secs(5)).build().expect("reqwest client"),
            cfg,
            child: Mutex::new(None),
            consecutive_failures: AtomicU32::new(0),
            circuit_open: AtomicBool::new(false),
        }
    }

    pub fn is_healthy_recently(&self) -> bool {
        !self.circuit_open.load(Ordering::SeqCst)
    }

    pub fn is_circuit_open(&self) -> bool {
        self.circuit_open.load(Ordering::SeqCst)
    }

    /// Clears the failure count and re-closes the breaker. Called after an
    /// operator-initiated restart or config reload.
    pub fn reset_circuit_breaker(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
        self.circuit_open.store(false, Ordering::SeqCst);
    }

    async fn heartbeat(&self) -> bool {
        self.client.get(join(&self.cfg.base_url, "v1/health")).send().await.map(|r| r.status().is_success()).unwrap_or(false)
    }

    /// Reuse an already-running server if the heartbeat succeeds; otherwise
    /// spawn the child and poll until healthy or the startup timeout elapses.
    pub async fn ensure_started(&self) -> Result<()> {
        if self.heartbeat().await {
            info!(base_url = %self.cfg.base_url, "embedding server already running, reusing");
            return Ok(());
        }

        if self.circuit_open.load(Ordering::SeqCst) {
            return Err(VectorError::CircuitOpen);
        }

        self.spawn_and_wait_healthy().await
    }

    async fn spawn_and_wait_healthy(&self) -> Result<()> {
        info!(cmd = %self.cfg.command, data_dir = %self.cfg.data_dir, "spawning embedding server");
        let child = Command::new("sh")
            .arg("-c")
            .arg(&self.cfg.command)
            .env("MNEMOD_VECTOR_DATA_DIR", &self.cfg.data_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(VectorError::Spawn)?;

        *self.child.lock().await = Some(child);

        let deadline = tokio::time::Instant::now() + Duration::from_secs(self.cfg.startup_timeout_secs);
        loop {
            if self.heartbeat().await {
                self.consecutive_failures.store(0, Ordering::SeqCst);
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                self.record_failure().await;
                return Err(VectorError::StartupTimeout);
            }
            tokio::time::sleep(Duration::from_millis(300)).await;
        }
    }

    async fn record_failure(&self) -> u32 {
        let n = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        if n >= self.cfg.circuit_breaker_threshold {
            warn!(failures = n, "embedding server circuit breaker tripped, restarts disabled");
            self.circuit_open.store(true, Ordering::SeqCst);
        }
        n
    }

    fn restart_backoff_for(&self, attempt: u32) -> Duration {
        let min = self.cfg.restart_backoff_min_secs.max(1);
        let max = self.cfg.restart_backoff_max_secs.max(min);
        let secs = min.saturating_mul(1u64 << attempt.min(16)).min(max);
        Duration::from_secs(secs)
    }

    /// One iteration of the periodic health check. On failure, triggers a
    /// controlled restart (subject to the circuit breaker).
    pub async fn health_check_once(&self) -> Result<()> {
        if self.heartbeat().await {
            self.consecutive_failures.store(0, Ordering::SeqCst);
            return Ok(());
        }

        if self.circuit_open.load(Ordering::SeqCst) {
            return Err(VectorError::CircuitOpen);
        }

        let attempt = self.consecutive_failures.load(Ordering::SeqCst);
        tokio::time::sleep(self.restart_backoff_for(attempt)).await;
        self.spawn_and_wait_healthy().await
    }

    /// Terminate the owned child gracefully: SIGTERM-equivalent, wait up to
    /// 5s, then kill. No-op if the server was discovered rather than owned.
    pub async fn shutdown(&self) {
        let mut guard = self.child.lock().await;
        let Some(mut child) = guard.take() else {
            return;
        };
        #[cfg(unix)]
        if let Some(pid) = child.id() {
            unsafe {
                libc::kill(pid as i32, libc::SIGTERM);
            }
        }
        #[cfg(not(unix))]
        {
            let _ = child.start_kill();
        }
        let waited = tokio::time::timeout(Duration::from_secs(5), child.wait()).await;
        if waited.is_err() {
            warn!("embedding server did not exit after SIGTERM, killing forcibly");
            let _ = child.kill().await;
        }
    }
}
