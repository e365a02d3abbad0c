// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Any OpenAI-compatible `/chat/completions` endpoint: a local proxy,
//! LiteLLM, vLLM, or similar. Same bootstrap semantics as [`crate::gemini`]
//! — no resumable session, mints its own `memory_session_id` on first call.

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::watch;

use crate::client::{ModelClient, QueryOptions, QueryOutcome};
use crate::error::{ProviderError, Result};
use crate::message::{Message, Role};
use crate::rate_limit::RateLimiter;

pub struct OpenAiCompatClient {
    model: String,
    api_key: Option<String>,
    base_url: String,
    client: reqwest::Client,
    limiter: RateLimiter,
}

impl OpenAiCompatClient {
    pub fn new(model: String, api_key: Option<String>, base_url: Option<String>) -> Self {
        let limiter = RateLimiter::for_model(&model);
        Self {
            model,
            api_key,
            base_url: base_url.unwrap_or_else(|| "http://localhost:11434/v1".into()),
            client: reqwest::Client::new(),
            limiter,
        }
    }

    fn to_messages(history: &[Message], new_user_message: &Message) -> Vec<serde_json::Value> {
        history
            .iter()
            .chain(std::iter::once(new_user_message))
            .map(|m| {
                let role = match m.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                };
                json!({"role": role, "content": m.text})
            })
            .collect()
    }
}

#[async_trait]
impl ModelClient for OpenAiCompatClient {
    fn name(&self) -> &'static str {
        "openai_compat"
    }

    async fn query(
        &self,
        history: &[Message],
        new_user_message: &Message,
        options: QueryOptions,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<QueryOutcome> {
        self.limiter.wait_turn().await;

        let body = json!({
            "model": self.model,
            "messages": Self::to_messages(history, new_user_message),
        });

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let mut request = self.client.post(url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = tokio::select! {
            r = request.send() => r.map_err(|e| ProviderError::Transient(e.to_string()))?,
            _ = cancel.changed() => return Err(ProviderError::Transient("cancelled".into())),
        };

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::classify_http(status, &text));
        }

        let parsed: serde_json::Value = response.json().await.map_err(|e| ProviderError::Fatal(e.to_string()))?;

        let content = parsed["choices"][0]["message"]["content"].as_str().unwrap_or_default().to_string();

        let input_tokens = parsed["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32;
        let output_tokens = parsed["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32;

        let memory_session_id =
            if options.existing_memory_session_id.is_none() { Some(uuid::Uuid::new_v4().to_string()) } else { None };

        Ok(QueryOutcome { content, input_tokens, output_tokens, resume_token: None, memory_session_id, skipped: false })
    }
}
