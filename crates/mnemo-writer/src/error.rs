// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WriterError {
    #[error("xml parse error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error(transparent)]
    Store(#[from] mnemo_store::StoreError),
    #[error(transparent)]
    Queue(#[from] mnemo_queue::QueueError),
}

pub type Result<T> = std::result::Result<T, WriterError>;
