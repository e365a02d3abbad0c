// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Optional per-provider request spacing: enforce a minimum inter-request gap
//! derived from a known per-model RPM table plus a safety margin, rather than
//! reacting only after a 429 comes back.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Safety margin applied on top of the raw RPM-derived spacing so jitter in
/// actual request timing doesn't creep past the provider's real limit.
const SAFETY_MARGIN: f64 = 1.15;

/// Known per-model requests-per-minute ceilings. Unlisted models are
/// unthrottled (`None` from [`rpm_for_model`]) — the backoff schedule on 429
/// is the fallback for those.
pub fn rpm_for_model(model: &str) -> Option<u32> {
    match model {
        m if m.contains("haiku") => Some(100),
        m if m.contains("sonnet") => Some(50),
        m if m.contains("opus") => Some(20),
        m if m.contains("gemini-2.5-flash") => Some(60),
        m if m.contains("gemini-2.5-pro") => Some(30),
        _ => None,
    }
}

pub struct RateLimiter {
    min_spacing: Option<Duration>,
    last_request: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn for_model(model: &str) -> Self {
        let min_spacing = rpm_for_model(model).map(|rpm| {
            let raw_secs = 60.0 / rpm as f64;
            Duration::from_secs_f64(raw_secs * SAFETY_MARGIN)
        });
        Self { min_spacing, last_request: Mutex::new(None) }
    }

    pub fn unlimited() -> Self {
        Self { min_spacing: None, last_request: Mutex::new(None) }
    }

    /// Sleep, if needed, so the gap since the previous call is at least the
    /// configured minimum spacing. Records the new call time before
    /// returning so back-to-back callers serialize correctly.
    pub async fn wait_turn(&self) {
        let Some(min_spacing) = self.min_spacing else { return };
        let wait_for = {
            let mut guard = self.last_request.lock().expect("rate limiter mutex poisoned");
            let now = Instant::now();
            let wait_for = guard.map(|last| min_spacing.saturating_sub(now.duration_since(last)));
            *guard = Some(now + wait_for.unwrap_or_default());
            wait_for
        };
        if let Some(d) = wait_for {
            if !d.is_zero() {
                tokio::time::sleep(d).await;
            }
        }
    }
}
