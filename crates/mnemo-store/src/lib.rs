// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Single-writer relational store for Sessions, UserPrompts, Observations,
//! Summaries, and PendingMessage rows.
//!
//! One [`rusqlite::Connection`] is opened per process and shared behind a
//! mutex; the durable queue crate (`mnemo-queue`) is handed the same
//! connection via [`RecordStore::shared_conn`] so both crates serialize
//! through a single writer without a second database file or a cross-crate
//! dependency cycle.

mod error;
mod helpers;
mod maintenance;
mod prompts;
mod schema;
mod sessions;
mod write_ops;

pub use error::{Result, StoreError};

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;

pub use mnemo_types::{Observation, PendingMessage, Session, Summary, UserPrompt};

/// Shared connection handle type, reused by `mnemo-queue` to operate on
/// `pending_messages` under the same single-writer mutex.
pub type SharedConn = Arc<Mutex<Connection>>;

pub struct RecordStore {
    conn: SharedConn,
}

impl RecordStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        schema::init(&conn)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::init(&conn)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    /// Hand out the shared connection so `mnemo-queue` can serialize through
    /// the same writer. Never exposed for schema bypass outside this crate
    /// and `mnemo-queue`.
    pub fn shared_conn(&self) -> SharedConn {
        self.conn.clone()
    }
}

pub use write_ops::{NewObservation, NewSummary, StoreObservationsOutcome, StoreObservationsRequest};

impl RecordStore {
    pub fn create_or_get_session(&self, content_session_id: &str, project: &str) -> Result<i64> {
        sessions::create_or_get_session(&self.conn, content_session_id, project)
    }

    pub fn get_session_by_id(&self, session_id: i64) -> Result<Option<Session>> {
        sessions::get_session_by_id(&self.conn, session_id)
    }

    pub fn get_session_by_content_id(&self, content_session_id: &str) -> Result<Option<Session>> {
        sessions::get_session_by_content_id(&self.conn, content_session_id)
    }

    pub fn update_memory_session_id(&self, session_id: i64, memory_session_id: &str) -> Result<()> {
        sessions::update_memory_session_id(&self.conn, session_id, memory_session_id)
    }

    pub fn update_provider_resume_token(&self, session_id: i64, token: Option<&str>) -> Result<()> {
        sessions::update_provider_resume_token(&self.conn, session_id, token)
    }

    pub fn update_last_input_tokens(&self, session_id: i64, tokens: Option<u32>) -> Result<()> {
        sessions::update_last_input_tokens(&self.conn, session_id, tokens)
    }

    pub fn save_user_prompt(&self, content_session_id: &str, prompt_number: i64, text: &str) -> Result<UserPrompt> {
        prompts::save_user_prompt(&self.conn, content_session_id, prompt_number, text)
    }

    pub fn get_latest_user_prompt(&self, content_session_id: &str) -> Result<Option<UserPrompt>> {
        prompts::get_latest_user_prompt(&self.conn, content_session_id)
    }

    pub fn get_prompt_number_from_prompts(&self, content_session_id: &str) -> Result<i64> {
        prompts::get_prompt_number_from_prompts(&self.conn, content_session_id)
    }

    pub fn store_observations_atomic(
        &self,
        req: StoreObservationsRequest,
    ) -> Result<StoreObservationsOutcome> {
        write_ops::store_observations_atomic(&self.conn, req)
    }

    /// Every distinct project name with at least one session, ordered
    /// alphabetically. Used by the vector retention-prune pass to iterate
    /// per-project collections.
    pub fn distinct_projects(&self) -> Result<Vec<String>> {
        maintenance::distinct_projects(&self.conn)
    }

    pub fn list_observations_for_project(&self, project: &str) -> Result<Vec<Observation>> {
        maintenance::list_observations_for_project(&self.conn, project)
    }

    pub fn list_summaries_for_project(&self, project: &str) -> Result<Vec<Summary>> {
        maintenance::list_summaries_for_project(&self.conn, project)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_in_memory_creates_schema() {
        let store = RecordStore::open_in_memory().unwrap();
        assert!(store.get_session_by_id(1).unwrap().is_none());
    }
}
