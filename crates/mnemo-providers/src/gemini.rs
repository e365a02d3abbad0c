// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Gemini REST client. No resumable session concept — every call replays
//! the full conversation history and the client mints its own
//! `memory_session_id` on first contact.

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::watch;

use crate::client::{ModelClient, QueryOptions, QueryOutcome};
use crate::error::{ProviderError, Result};
use crate::message::{Message, Role};
use crate::rate_limit::RateLimiter;

pub struct GeminiClient {
    model: String,
    api_key: Option<String>,
    base_url: String,
    client: reqwest::Client,
    limiter: RateLimiter,
}

impl GeminiClient {
    pub fn new(model: String, api_key: Option<String>, base_url: Option<String>) -> Self {
        let limiter = RateLimiter::for_model(&model);
        Self {
            model,
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://generativelanguage.googleapis.com".into()),
            client: reqwest::Client::new(),
            limiter,
        }
    }

    fn to_contents(history: &[Message], new_user_message: &Message) -> (Option<String>, Vec<serde_json::Value>) {
        let mut system = None;
        let mut contents = Vec::with_capacity(history.len() + 1);
        for m in history.iter().chain(std::iter::once(new_user_message)) {
            match m.role {
                Role::System => system = Some(m.text.clone()),
                Role::User => contents.push(json!({"role": "user", "parts": [{"text": m.text}]})),
                Role::Assistant => contents.push(json!({"role": "model", "parts": [{"text": m.text}]})),
            }
        }
        (system, contents)
    }
}

#[async_trait]
impl ModelClient for GeminiClient {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn query(
        &self,
        history: &[Message],
        new_user_message: &Message,
        options: QueryOptions,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<QueryOutcome> {
        let api_key =
            self.api_key.as_deref().ok_or_else(|| ProviderError::Fatal("gemini API key not configured".into()))?;

        self.limiter.wait_turn().await;

        let (system, contents) = Self::to_contents(history, new_user_message);
        let mut body = json!({ "contents": contents });
        if let Some(system) = system {
            body["systemInstruction"] = json!({ "parts": [{"text": system}] });
        }

        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url.trim_end_matches('/'),
            self.model,
            api_key
        );

        let request = self.client.post(url).json(&body).send();
        let response = tokio::select! {
            r = request => r.map_err(|e| ProviderError::Transient(e.to_string()))?,
            _ = cancel.changed() => return Err(ProviderError::Transient("cancelled".into())),
        };

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::classify_http(status, &text));
        }

        let parsed: serde_json::Value = response.json().await.map_err(|e| ProviderError::Fatal(e.to_string()))?;

        let content = parsed["candidates"][0]["content"]["parts"][0]["text"].as_str().unwrap_or_default().to_string();

        let input_tokens = parsed["usageMetadata"]["promptTokenCount"].as_u64().unwrap_or(0) as u32;
        let output_tokens = parsed["usageMetadata"]["candidatesTokenCount"].as_u64().unwrap_or(0) as u32;

        let memory_session_id =
            if options.existing_memory_session_id.is_none() { Some(uuid::Uuid::new_v4().to_string()) } else { None };

        Ok(QueryOutcome { content, input_tokens, output_tokens, resume_token: None, memory_session_id, skipped: false })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_contents_maps_assistant_role_to_model() {
        let history = vec![Message::assistant("prior reply")];
        let (_, contents) = GeminiClient::to_contents(&history, &Message::user("next"));
        assert_eq!(contents[0]["role"], "model");
        assert_eq!(contents[1]["role"], "user");
    }
}
