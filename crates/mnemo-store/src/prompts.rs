// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use rusqlite::{params, OptionalExtension, Row};

use mnemo_types::UserPrompt;

use crate::error::{Result, StoreError};
use crate::helpers::now_epoch;
use crate::SharedConn;

fn prompt_from_row(row: &Row<'_>) -> rusqlite::Result<UserPrompt> {
    Ok(UserPrompt {
        id: row.get(0)?,
        content_session_id: row.get(1)?,
        prompt_number: row.get(2)?,
        text: row.get(3)?,
        created_at_epoch: row.get(4)?,
    })
}

/// Enforces per-session monotonic numbering: `prompt_number` must be exactly
/// one greater than the last stored prompt for this session.
pub(crate) fn save_user_prompt(
    conn: &SharedConn,
    content_session_id: &str,
    prompt_number: i64,
    text: &str,
) -> Result<UserPrompt> {
    let conn = conn.lock().expect("store mutex poisoned");

    let last: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(prompt_number), 0) FROM user_prompts WHERE content_session_id = ?",
            params![content_session_id],
            |r| r.get(0),
        )
        .unwrap_or(0);

    if prompt_number != last + 1 {
        return Err(StoreError::PromptNumberOutOfOrder {
            content_session_id: content_session_id.to_string(),
            last,
            attempted: prompt_number,
        });
    }

    let created_at_epoch = now_epoch();
    conn.execute(
        "INSERT INTO user_prompts (content_session_id, prompt_number, text, created_at_epoch) VALUES (?, ?, ?, ?)",
        params![content_session_id, prompt_number, text, created_at_epoch],
    )?;
    let id = conn.last_insert_rowid();

    conn.execute(
        "UPDATE sessions SET last_prompt_number = ? WHERE content_session_id = ?",
        params![prompt_number, content_session_id],
    )?;

    Ok(UserPrompt {
        id,
        content_session_id: content_session_id.to_string(),
        prompt_number,
        text: text.to_string(),
        created_at_epoch,
    })
}

pub(crate) fn get_latest_user_prompt(conn: &SharedConn, content_session_id: &str) -> Result<Option<UserPrompt>> {
    let conn = conn.lock().expect("store mutex poisoned");
    Ok(conn
        .query_row(
            "SELECT id, content_session_id, prompt_number, text, created_at_epoch
             FROM user_prompts WHERE content_session_id = ? ORDER BY prompt_number DESC LIMIT 1",
            params![content_session_id],
            prompt_from_row,
        )
        .optional()?)
}

pub(crate) fn get_prompt_number_from_prompts(conn: &SharedConn, content_session_id: &str) -> Result<i64> {
    let conn = conn.lock().expect("store mutex poisoned");
    Ok(conn.query_row(
        "SELECT COALESCE(MAX(prompt_number), 0) FROM user_prompts WHERE content_session_id = ?",
        params![content_session_id],
        |r| r.get(0),
    )?)
}
