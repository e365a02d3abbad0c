// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("prompt_number must increase monotonically: session {content_session_id} already has {last}, got {attempted}")]
    PromptNumberOutOfOrder {
        content_session_id: String,
        last: i64,
        attempted: i64,
    },
    #[error("observation/summary requires memory_session_id to already be set for session {session_id}")]
    MissingMemorySessionId { session_id: i64 },
    #[error("no session found with id {0}")]
    SessionNotFound(i64),
}

pub type Result<T> = std::result::Result<T, StoreError>;
