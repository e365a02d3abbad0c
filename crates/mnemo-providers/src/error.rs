// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Tagged-union error kinds, preferred over message-string matching so the
//! retry policy in [`crate::retry`] never has to pattern-match provider
//! response text. Each concrete client classifies its transport-level
//! failures into one of these at the boundary; string matching is used only
//! as a last resort inside [`ProviderError::classify_http`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    /// Rate limit, 5xx, or network failure — retried with exponential backoff.
    #[error("transient provider error: {0}")]
    Transient(String),
    /// Input too large for the model's context window.
    #[error("context overflow: {0}")]
    ContextOverflow(String),
    /// Provider-side session/resume handle is invalid or expired (native SDK only).
    #[error("terminal resume error: {0}")]
    TerminalResume(String),
    /// Auth failure, quota exhaustion, or a response that doesn't match the
    /// expected schema — triggers the provider fallback chain.
    #[error("fatal provider error: {0}")]
    Fatal(String),
}

impl ProviderError {
    /// Last-resort string classification for transports (plain REST clients)
    /// that hand back only a status code and body.
    pub fn classify_http(status: reqwest::StatusCode, body: &str) -> Self {
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return ProviderError::Transient(format!("{status}: {body}"));
        }
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return ProviderError::Fatal(format!("{status}: {body}"));
        }
        if status == reqwest::StatusCode::BAD_REQUEST && body.to_lowercase().contains("context") {
            return ProviderError::ContextOverflow(format!("{status}: {body}"));
        }
        ProviderError::Fatal(format!("{status}: {body}"))
    }
}

pub type Result<T> = std::result::Result<T, ProviderError>;
