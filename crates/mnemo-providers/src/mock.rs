// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Scripted test double implementing [`ModelClient`], so the session
//! processor's tests can exercise retry/fallback/truncation paths without
//! network access. A pop-from-the-front script queue of canned outcomes.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::watch;

use crate::client::{ModelClient, QueryOptions, QueryOutcome};
use crate::error::{ProviderError, Result};
use crate::message::Message;

pub struct ScriptedMockClient {
    scripts: Arc<Mutex<Vec<Result<QueryOutcome>>>>,
    name: &'static str,
    supports_resume: bool,
    /// The most recent request this client saw, for assertions in tests.
    pub last_history: Arc<Mutex<Option<Vec<Message>>>>,
}

impl ScriptedMockClient {
    pub fn new(scripts: Vec<Result<QueryOutcome>>) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(scripts)),
            name: "mock",
            supports_resume: false,
            last_history: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_resume_support(mut self) -> Self {
        self.supports_resume = true;
        self
    }

    /// Convenience: client that always returns the same text reply.
    pub fn always_text(reply: impl Into<String>) -> Self {
        Self::new(vec![Ok(QueryOutcome {
            content: reply.into(),
            input_tokens: 5,
            output_tokens: 5,
            resume_token: None,
            memory_session_id: Some("mock-session".into()),
            skipped: false,
        })])
    }

    /// Convenience: client whose first call fails transiently, second call succeeds.
    pub fn transient_then_text(reply: impl Into<String>) -> Self {
        Self::new(vec![
            Err(ProviderError::Transient("mock transient failure".into())),
            Ok(QueryOutcome {
                content: reply.into(),
                input_tokens: 5,
                output_tokens: 5,
                resume_token: None,
                memory_session_id: None,
                skipped: false,
            }),
        ])
    }
}

#[async_trait]
impl ModelClient for ScriptedMockClient {
    fn name(&self) -> &'static str {
        self.name
    }

    fn supports_resume(&self) -> bool {
        self.supports_resume
    }

    async fn query(
        &self,
        history: &[Message],
        new_user_message: &Message,
        _options: QueryOptions,
        _cancel: &mut watch::Receiver<bool>,
    ) -> Result<QueryOutcome> {
        let mut recorded = history.to_vec();
        recorded.push(new_user_message.clone());
        *self.last_history.lock().expect("mock mutex poisoned") = Some(recorded);

        let mut scripts = self.scripts.lock().expect("mock mutex poisoned");
        if scripts.is_empty() {
            return Err(ProviderError::Fatal("scripted mock client exhausted".into()));
        }
        scripts.remove(0)
    }
}
