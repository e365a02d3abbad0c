// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The capability set every provider client implements: a trait object
//! behind `Arc<dyn ModelClient>`, carrying the resume-token / memory
//! session bootstrap semantics this system's data model requires. The
//! session processor needs one XML blob back per call, not token-by-token
//! deltas, so there is no streaming variant.

use async_trait::async_trait;
use tokio::sync::watch;

use crate::error::Result;
use crate::message::Message;

/// Per-call knobs the session processor supplies.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Provider-side handle to continue a multi-turn conversation. Only the
    /// native client uses this; REST providers ignore it and fall back to
    /// full-history replay.
    pub resume_token: Option<String>,
    /// The session's already-assigned `memory_session_id`, if any. Clients
    /// for providers that don't hand back a session id mint one on first
    /// call and return it in [`QueryOutcome::memory_session_id`].
    pub existing_memory_session_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub content: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    /// Updated resume token, when the provider supports one. `None` clears
    /// it (rollover).
    pub resume_token: Option<String>,
    /// Set only when this call minted a fresh memory session id — `None`
    /// when one was already supplied or the provider returns its own session
    /// identity elsewhere.
    pub memory_session_id: Option<String>,
    /// Set when an aggressive-truncation retry still failed with context
    /// overflow — the caller should record the item as skipped rather than
    /// erroring out.
    pub skipped: bool,
}

#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Human-readable provider name, matching `mnemo_config::ProviderKind`'s
    /// serde name, for status display and credential lookups.
    fn name(&self) -> &'static str;

    /// True only for the native SDK client — the one provider with a
    /// resumable session concept subject to rollover.
    fn supports_resume(&self) -> bool {
        false
    }

    /// Send the conversation history plus one new user message and return the
    /// assistant's raw reply. Must honor `cancel`: if it fires mid-call the
    /// implementation should abort as soon as the underlying transport
    /// allows and the caller treats this as a clean stop, not a failure.
    async fn query(
        &self,
        history: &[Message],
        new_user_message: &Message,
        options: QueryOptions,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<QueryOutcome>;
}
