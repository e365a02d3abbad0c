// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! In-process per-session wake signal. Not persisted — durability comes from
//! the queue rows themselves; this only wakes an idle processor loop sooner
//! than its next poll.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

#[derive(Default)]
pub struct WakeBus {
    notifiers: Mutex<HashMap<i64, Arc<Notify>>>,
}

impl WakeBus {
    pub fn notifier(&self, session_id: i64) -> Arc<Notify> {
        let mut map = self.notifiers.lock().expect("wake bus mutex poisoned");
        map.entry(session_id).or_insert_with(|| Arc::new(Notify::new())).clone()
    }

    pub fn wake(&self, session_id: i64) {
        self.notifier(session_id).notify_waiters();
    }

    /// Drop the per-session notifier so new waiters get a fresh one instead
    /// of catching a stale `notify_waiters` from a previous loop instance.
    pub fn remove(&self, session_id: i64) {
        self.notifiers.lock().expect("wake bus mutex poisoned").remove(&session_id);
    }
}
