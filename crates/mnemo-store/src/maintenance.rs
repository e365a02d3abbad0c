// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Read-only queries backing the vector index's retention-prune pass: which
//! projects exist, and every observation/summary recorded for one of them.

use rusqlite::{params, Row};

use mnemo_types::{Observation, ObservationType, Summary};

use crate::error::Result;
use crate::helpers::from_json;
use crate::SharedConn;

pub(crate) fn distinct_projects(conn: &SharedConn) -> Result<Vec<String>> {
    let conn = conn.lock().expect("store mutex poisoned");
    let mut stmt = conn.prepare("SELECT DISTINCT project FROM sessions ORDER BY project")?;
    let rows = stmt.query_map([], |r| r.get(0))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn observation_kind(raw: &str) -> ObservationType {
    serde_json::from_value(serde_json::Value::String(raw.to_string())).unwrap_or(ObservationType::Other)
}

fn observation_from_row(row: &Row<'_>) -> rusqlite::Result<Observation> {
    let kind_raw: String = row.get(3)?;
    let facts_raw: String = row.get(7)?;
    let concepts_raw: String = row.get(8)?;
    let files_read_raw: String = row.get(9)?;
    let files_modified_raw: String = row.get(10)?;
    Ok(Observation {
        id: row.get(0)?,
        memory_session_id: row.get(1)?,
        project: row.get(2)?,
        kind: observation_kind(&kind_raw),
        title: row.get(4)?,
        subtitle: row.get(5)?,
        narrative: row.get(6)?,
        facts: from_json(&facts_raw),
        concepts: from_json(&concepts_raw),
        files_read: from_json(&files_read_raw),
        files_modified: from_json(&files_modified_raw),
        prompt_number: row.get(11)?,
        discovery_tokens: row.get(12)?,
        created_at_epoch: row.get(13)?,
    })
}

pub(crate) fn list_observations_for_project(conn: &SharedConn, project: &str) -> Result<Vec<Observation>> {
    let conn = conn.lock().expect("store mutex poisoned");
    let mut stmt = conn.prepare(
        "SELECT id, memory_session_id, project, type, title, subtitle, narrative,
                facts, concepts, files_read, files_modified, prompt_number, discovery_tokens, created_at_epoch
         FROM observations WHERE project = ?",
    )?;
    let rows = stmt.query_map(params![project], observation_from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn summary_from_row(row: &Row<'_>) -> rusqlite::Result<Summary> {
    Ok(Summary {
        id: row.get(0)?,
        memory_session_id: row.get(1)?,
        project: row.get(2)?,
        request: row.get(3)?,
        investigated: row.get(4)?,
        learned: row.get(5)?,
        completed: row.get(6)?,
        next_steps: row.get(7)?,
        notes: row.get(8)?,
        prompt_number: row.get(9)?,
        discovery_tokens: row.get(10)?,
        created_at_epoch: row.get(11)?,
    })
}

pub(crate) fn list_summaries_for_project(conn: &SharedConn, project: &str) -> Result<Vec<Summary>> {
    let conn = conn.lock().expect("store mutex poisoned");
    let mut stmt = conn.prepare(
        "SELECT id, memory_session_id, project, request, investigated, learned,
                completed, next_steps, notes, prompt_number, discovery_tokens, created_at_epoch
         FROM summaries WHERE project = ?",
    )?;
    let rows = stmt.query_map(params![project], summary_from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}
