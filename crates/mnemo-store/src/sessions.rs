// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use rusqlite::{params, OptionalExtension, Row};
use tracing::debug;

use mnemo_types::Session;

use crate::error::Result;
use crate::SharedConn;

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        session_id: row.get(0)?,
        content_session_id: row.get(1)?,
        memory_session_id: row.get(2)?,
        provider_resume_token: row.get(3)?,
        project: row.get(4)?,
        last_input_tokens: row.get::<_, Option<i64>>(5)?.map(|v| v as u32),
        last_prompt_number: row.get(6)?,
    })
}

const SELECT_COLUMNS: &str = "session_id, content_session_id, memory_session_id, provider_resume_token, project, last_input_tokens, last_prompt_number";

/// Idempotent on `content_session_id`: returns the existing session if one
/// already exists, otherwise creates one.
pub(crate) fn create_or_get_session(conn: &SharedConn, content_session_id: &str, project: &str) -> Result<i64> {
    let conn = conn.lock().expect("store mutex poisoned");
    if let Some(id) = conn
        .query_row(
            "SELECT session_id FROM sessions WHERE content_session_id = ?",
            params![content_session_id],
            |r| r.get::<_, i64>(0),
        )
        .optional()?
    {
        return Ok(id);
    }

    conn.execute(
        "INSERT INTO sessions (content_session_id, project, last_prompt_number) VALUES (?, ?, 0)",
        params![content_session_id, project],
    )?;
    let id = conn.last_insert_rowid();
    debug!(session_id = id, content_session_id, "created session");
    Ok(id)
}

pub(crate) fn get_session_by_id(conn: &SharedConn, session_id: i64) -> Result<Option<Session>> {
    let conn = conn.lock().expect("store mutex poisoned");
    let sql = format!("SELECT {SELECT_COLUMNS} FROM sessions WHERE session_id = ?");
    Ok(conn.query_row(&sql, params![session_id], session_from_row).optional()?)
}

pub(crate) fn get_session_by_content_id(conn: &SharedConn, content_session_id: &str) -> Result<Option<Session>> {
    let conn = conn.lock().expect("store mutex poisoned");
    let sql = format!("SELECT {SELECT_COLUMNS} FROM sessions WHERE content_session_id = ?");
    Ok(conn.query_row(&sql, params![content_session_id], session_from_row).optional()?)
}

/// Assigned lazily on first provider response; never changed afterward once
/// set (the caller is responsible for only calling this once per session).
pub(crate) fn update_memory_session_id(conn: &SharedConn, session_id: i64, memory_session_id: &str) -> Result<()> {
    let conn = conn.lock().expect("store mutex poisoned");
    conn.execute(
        "UPDATE sessions SET memory_session_id = ? WHERE session_id = ? AND memory_session_id IS NULL",
        params![memory_session_id, session_id],
    )?;
    Ok(())
}

/// May be cleared (`None`) by rollover without touching `memory_session_id`.
pub(crate) fn update_provider_resume_token(conn: &SharedConn, session_id: i64, token: Option<&str>) -> Result<()> {
    let conn = conn.lock().expect("store mutex poisoned");
    conn.execute(
        "UPDATE sessions SET provider_resume_token = ? WHERE session_id = ?",
        params![token, session_id],
    )?;
    Ok(())
}

pub(crate) fn update_last_input_tokens(conn: &SharedConn, session_id: i64, tokens: Option<u32>) -> Result<()> {
    let conn = conn.lock().expect("store mutex poisoned");
    conn.execute(
        "UPDATE sessions SET last_input_tokens = ? WHERE session_id = ?",
        params![tokens.map(|t| t as i64), session_id],
    )?;
    Ok(())
}
