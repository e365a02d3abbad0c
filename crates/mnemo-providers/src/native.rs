// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Native SDK-style client — the one provider with a resumable session and
//! the only target of rollover. Builds a request the way a streaming chat
//! client would, but returns one parsed text blob instead of token-by-token
//! deltas, since the writer needs the full XML body before it can parse.

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::watch;
use tracing::debug;

use crate::client::{ModelClient, QueryOptions, QueryOutcome};
use crate::error::{ProviderError, Result};
use crate::message::{Message, Role};
use crate::rate_limit::RateLimiter;

pub struct NativeClient {
    model: String,
    api_key: Option<String>,
    base_url: String,
    max_tokens: u32,
    client: reqwest::Client,
    limiter: RateLimiter,
}

impl NativeClient {
    pub fn new(model: String, api_key: Option<String>, base_url: Option<String>) -> Self {
        let limiter = RateLimiter::for_model(&model);
        Self {
            model,
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://api.anthropic.com".into()),
            max_tokens: 4096,
            client: reqwest::Client::new(),
            limiter,
        }
    }

    fn to_api_messages(history: &[Message], new_user_message: &Message) -> (Option<String>, Vec<serde_json::Value>) {
        let mut system = None;
        let mut out = Vec::with_capacity(history.len() + 1);
        for m in history.iter().chain(std::iter::once(new_user_message)) {
            match m.role {
                Role::System => system = Some(m.text.clone()),
                Role::User => out.push(json!({"role": "user", "content": m.text})),
                Role::Assistant => out.push(json!({"role": "assistant", "content": m.text})),
            }
        }
        (system, out)
    }
}

#[async_trait]
impl ModelClient for NativeClient {
    fn name(&self) -> &'static str {
        "native"
    }

    fn supports_resume(&self) -> bool {
        true
    }

    async fn query(
        &self,
        history: &[Message],
        new_user_message: &Message,
        options: QueryOptions,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<QueryOutcome> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::Fatal("native provider API key not configured".into()))?;

        self.limiter.wait_turn().await;

        let (system, messages) = Self::to_api_messages(history, new_user_message);
        let mut body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": messages,
        });
        if let Some(system) = system {
            body["system"] = json!(system);
        }

        debug!(resume_token = ?options.resume_token, "native client sending request");

        let request = self
            .client
            .post(format!("{}/v1/messages", self.base_url.trim_end_matches('/')))
            .header("x-api-key", api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send();

        let response = tokio::select! {
            r = request => r.map_err(|e| ProviderError::Transient(e.to_string()))?,
            _ = cancel.changed() => return Err(ProviderError::Transient("cancelled".into())),
        };

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            if text.contains("session") && text.contains("expired") {
                return Err(ProviderError::TerminalResume(format!("{status}: {text}")));
            }
            return Err(ProviderError::classify_http(status, &text));
        }

        let parsed: serde_json::Value = response.json().await.map_err(|e| ProviderError::Fatal(e.to_string()))?;

        let content = parsed["content"]
            .as_array()
            .and_then(|blocks| blocks.iter().find_map(|b| b["text"].as_str()))
            .unwrap_or_default()
            .to_string();

        let input_tokens = parsed["usage"]["input_tokens"].as_u64().unwrap_or(0) as u32;
        let output_tokens = parsed["usage"]["output_tokens"].as_u64().unwrap_or(0) as u32;

        let resume_token = options.resume_token.or_else(|| Some(uuid::Uuid::new_v4().to_string()));
        let memory_session_id =
            if options.existing_memory_session_id.is_none() { Some(uuid::Uuid::new_v4().to_string()) } else { None };

        Ok(QueryOutcome { content, input_tokens, output_tokens, resume_token, memory_session_id, skipped: false })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_api_messages_separates_system_from_turns() {
        let history = vec![Message::system("be terse"), Message::user("hi"), Message::assistant("hello")];
        let (system, msgs) = NativeClient::to_api_messages(&history, &Message::user("again"));
        assert_eq!(system.as_deref(), Some("be terse"));
        assert_eq!(msgs.len(), 3);
    }
}
