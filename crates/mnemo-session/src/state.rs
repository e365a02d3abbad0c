// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Shared, lock-light state a processor loop publishes and the session
//! manager reads — `in_flight_count`, idle tracking, pending-restart
//! requests, recovery status, and the currently active provider.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::Mutex;

use mnemo_config::ProviderKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorStatus {
    Starting,
    Idle,
    Busy,
    Stopping,
    Terminated,
}

#[derive(Debug, Clone)]
pub struct PendingRestart {
    pub reason: String,
    pub requested_at_epoch: i64,
}

pub struct SharedState {
    pub status: Mutex<ProcessorStatus>,
    pub in_flight: AtomicU32,
    /// Epoch seconds the loop last became idle; 0 while busy/starting.
    pub idle_since_epoch: AtomicI64,
    pub recovery_in_progress: AtomicBool,
    pub current_provider: Mutex<ProviderKind>,
    pub pending_restart: Mutex<Option<PendingRestart>>,
}

impl SharedState {
    pub fn new(initial_provider: ProviderKind) -> Self {
        Self {
            status: Mutex::new(ProcessorStatus::Starting),
            in_flight: AtomicU32::new(0),
            idle_since_epoch: AtomicI64::new(0),
            recovery_in_progress: AtomicBool::new(false),
            current_provider: Mutex::new(initial_provider),
            pending_restart: Mutex::new(None),
        }
    }

    pub fn status(&self) -> ProcessorStatus {
        *self.status.lock().expect("session state mutex poisoned")
    }

    pub fn set_status(&self, status: ProcessorStatus) {
        *self.status.lock().expect("session state mutex poisoned") = status;
    }

    pub fn mark_busy(&self) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.idle_since_epoch.store(0, Ordering::SeqCst);
        self.set_status(ProcessorStatus::Busy);
    }

    pub fn mark_idle(&self) {
        self.in_flight.store(0, Ordering::SeqCst);
        self.idle_since_epoch.store(chrono::Utc::now().timestamp(), Ordering::SeqCst);
        self.set_status(ProcessorStatus::Idle);
    }

    pub fn in_flight_count(&self) -> u32 {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn is_idle(&self) -> bool {
        self.status() == ProcessorStatus::Idle
    }

    /// `safe_to_restart`: generator is idle and nothing is in flight.
    pub fn safe_to_restart(&self) -> bool {
        self.is_idle() && self.in_flight_count() == 0
    }

    pub fn request_restart(&self, reason: impl Into<String>) {
        *self.pending_restart.lock().expect("session state mutex poisoned") =
            Some(PendingRestart { reason: reason.into(), requested_at_epoch: chrono::Utc::now().timestamp() });
    }

    /// Take and clear any pending restart request.
    pub fn take_pending_restart(&self) -> Option<PendingRestart> {
        self.pending_restart.lock().expect("session state mutex poisoned").take()
    }

    pub fn set_current_provider(&self, kind: ProviderKind) {
        *self.current_provider.lock().expect("session state mutex poisoned") = kind;
    }

    pub fn current_provider(&self) -> ProviderKind {
        *self.current_provider.lock().expect("session state mutex poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_to_restart_requires_idle_and_zero_in_flight() {
        let s = SharedState::new(ProviderKind::Native);
        assert!(!s.safe_to_restart());
        s.mark_idle();
        assert!(s.safe_to_restart());
        s.mark_busy();
        assert!(!s.safe_to_restart());
    }

    #[test]
    fn pending_restart_round_trips() {
        let s = SharedState::new(ProviderKind::Native);
        assert!(s.take_pending_restart().is_none());
        s.request_restart("settings changed");
        let pending = s.take_pending_restart().unwrap();
        assert_eq!(pending.reason, "settings changed");
        assert!(s.take_pending_restart().is_none());
    }
}
