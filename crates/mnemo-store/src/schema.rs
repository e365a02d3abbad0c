// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Schema for all tables this repo persists, including `pending_messages`
//! (owned here so `store_observations_atomic` can mark a queue row processed
//! in the same transaction that writes its records — the durable queue
//! operates on this same table through a shared connection handle).

use rusqlite::Connection;

use crate::error::Result;

pub(crate) fn init(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS sessions (
            session_id INTEGER PRIMARY KEY AUTOINCREMENT,
            content_session_id TEXT NOT NULL UNIQUE,
            memory_session_id TEXT,
            provider_resume_token TEXT,
            project TEXT NOT NULL,
            last_input_tokens INTEGER,
            last_prompt_number INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS user_prompts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            content_session_id TEXT NOT NULL,
            prompt_number INTEGER NOT NULL,
            text TEXT NOT NULL,
            created_at_epoch INTEGER NOT NULL,
            UNIQUE(content_session_id, prompt_number)
        );
        CREATE INDEX IF NOT EXISTS idx_user_prompts_session
            ON user_prompts(content_session_id);

        CREATE TABLE IF NOT EXISTS observations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            memory_session_id TEXT NOT NULL,
            project TEXT NOT NULL,
            type TEXT NOT NULL,
            title TEXT NOT NULL,
            subtitle TEXT,
            narrative TEXT,
            facts TEXT NOT NULL DEFAULT '[]',
            concepts TEXT NOT NULL DEFAULT '[]',
            files_read TEXT NOT NULL DEFAULT '[]',
            files_modified TEXT NOT NULL DEFAULT '[]',
            prompt_number INTEGER NOT NULL,
            discovery_tokens INTEGER NOT NULL DEFAULT 0,
            created_at_epoch INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_observations_memory_session
            ON observations(memory_session_id);

        CREATE TABLE IF NOT EXISTS summaries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            memory_session_id TEXT NOT NULL,
            project TEXT NOT NULL,
            request TEXT NOT NULL,
            investigated TEXT NOT NULL,
            learned TEXT NOT NULL,
            completed TEXT NOT NULL,
            next_steps TEXT NOT NULL,
            notes TEXT,
            prompt_number INTEGER NOT NULL,
            discovery_tokens INTEGER NOT NULL DEFAULT 0,
            created_at_epoch INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_summaries_memory_session
            ON summaries(memory_session_id);

        CREATE TABLE IF NOT EXISTS pending_messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id INTEGER NOT NULL,
            content_session_id TEXT NOT NULL,
            payload TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            attempt_count INTEGER NOT NULL DEFAULT 0,
            created_at_epoch INTEGER NOT NULL,
            claimed_at_epoch INTEGER,
            cwd TEXT NOT NULL DEFAULT ''
        );
        CREATE INDEX IF NOT EXISTS idx_pending_session_status
            ON pending_messages(session_id, status, id);
        ",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init(&conn).unwrap();
        init(&conn).unwrap();
    }
}
