// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Three interchangeable provider clients behind one trait, plus the shared
//! retry/truncation/rollover policy and per-model rate limiting that apply
//! across all of them.

mod client;
mod error;
mod gemini;
mod message;
pub mod mock;
mod native;
mod openai_compat;
mod rate_limit;
mod retry;

pub use client::{ModelClient, QueryOptions, QueryOutcome};
pub use error::{ProviderError, Result};
pub use gemini::GeminiClient;
pub use message::{Message, Role, PINNED_CONTINUATION_MARKER, PINNED_INIT_MARKER};
pub use native::NativeClient;
pub use openai_compat::OpenAiCompatClient;
pub use rate_limit::{rpm_for_model, RateLimiter};
pub use retry::query_with_retry;

use std::sync::Arc;

use mnemo_config::{Config, ProviderKind};

/// Build the client for `kind`, resolving its API key from the environment
/// variable named by `config.api_key_env` (falling back to
/// `config.provider_credentials` when `kind` isn't the currently active
/// provider — used by the fallback chain to try the next candidate).
pub fn build_client(kind: ProviderKind, config: &Config) -> Arc<dyn ModelClient> {
    let api_key = resolve_api_key(kind, config);
    let base_url = config.base_url.clone();

    match kind {
        ProviderKind::Native => Arc::new(NativeClient::new(config.model.clone(), api_key, base_url)),
        ProviderKind::Gemini => Arc::new(GeminiClient::new(config.model.clone(), api_key, base_url)),
        ProviderKind::OpenAiCompat => Arc::new(OpenAiCompatClient::new(config.model.clone(), api_key, base_url)),
    }
}

fn resolve_api_key(kind: ProviderKind, config: &Config) -> Option<String> {
    if kind == config.provider {
        if let Some(env_var) = &config.api_key_env {
            if let Ok(key) = std::env::var(env_var) {
                return Some(key);
            }
        }
    }
    let serde_name = match kind {
        ProviderKind::Native => "native",
        ProviderKind::Gemini => "gemini",
        ProviderKind::OpenAiCompat => "openai_compat",
    };
    config
        .provider_credentials
        .get(serde_name)
        .and_then(|env_var| std::env::var(env_var).ok())
}
