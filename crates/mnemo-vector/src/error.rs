// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VectorError {
    #[error("embedding server request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("malformed embedding server message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("embedding server returned an error: {0}")]
    Server(String),
    #[error("failed to spawn embedding server: {0}")]
    Spawn(std::io::Error),
    #[error("embedding server did not become healthy within the startup timeout")]
    StartupTimeout,
    #[error("vector index circuit breaker is open; restarts are disabled until manually reset")]
    CircuitOpen,
}

pub type Result<T> = std::result::Result<T, VectorError>;
