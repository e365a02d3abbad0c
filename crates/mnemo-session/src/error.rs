// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Store(#[from] mnemo_store::StoreError),
    #[error(transparent)]
    Queue(#[from] mnemo_queue::QueueError),
    #[error(transparent)]
    Writer(#[from] mnemo_writer::WriterError),
    #[error("session {0} has no record in the store")]
    MissingSession(i64),
}

pub type Result<T> = std::result::Result<T, SessionError>;
