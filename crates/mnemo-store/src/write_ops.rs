// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! `store_observations_atomic`: the single write transaction that persists
//! zero or more observations plus at most one summary and, when a queue
//! `message_id` is supplied, marks that `pending_messages` row `processed`
//! in the same transaction — the "store and ack" atomicity this whole
//! design hinges on.

use rusqlite::{params, Transaction};

use mnemo_types::{Observation, ObservationType, Summary};

use crate::error::{Result, StoreError};
use crate::helpers::{now_epoch, to_json};
use crate::SharedConn;

#[derive(Debug, Clone)]
pub struct NewObservation {
    pub kind: ObservationType,
    pub title: String,
    pub subtitle: Option<String>,
    pub narrative: Option<String>,
    pub facts: Vec<String>,
    pub concepts: Vec<String>,
    pub files_read: Vec<String>,
    pub files_modified: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct NewSummary {
    pub request: String,
    pub investigated: String,
    pub learned: String,
    pub completed: String,
    pub next_steps: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StoreObservationsRequest {
    pub memory_session_id: String,
    pub project: String,
    pub observations: Vec<NewObservation>,
    pub summary: Option<NewSummary>,
    /// When set, the matching `pending_messages` row is marked `processed`
    /// inside this same transaction.
    pub message_id: Option<i64>,
    pub prompt_number: i64,
    pub discovery_tokens: i64,
    /// Falls back to now when not supplied.
    pub created_at_epoch: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct StoreObservationsOutcome {
    pub obs_ids: Vec<i64>,
    pub summary_id: Option<i64>,
    pub created_at_epoch: i64,
    pub observations: Vec<Observation>,
    pub summary: Option<Summary>,
}

pub(crate) fn store_observations_atomic(
    conn: &SharedConn,
    req: StoreObservationsRequest,
) -> Result<StoreObservationsOutcome> {
    let mut conn = conn.lock().expect("store mutex poisoned");

    // A memory_session_id must already exist for this to be legal.
    let session_exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sessions WHERE memory_session_id = ?)",
        params![req.memory_session_id],
        |r| r.get(0),
    )?;
    if !session_exists {
        return Err(StoreError::MissingMemorySessionId { session_id: 0 });
    }

    let created_at_epoch = req.created_at_epoch.unwrap_or_else(now_epoch);

    let tx = conn.transaction()?;

    let mut obs_ids = Vec::with_capacity(req.observations.len());
    let mut observations = Vec::with_capacity(req.observations.len());
    for new_obs in &req.observations {
        let id = insert_observation(&tx, &req, new_obs, created_at_epoch)?;
        obs_ids.push(id);
        observations.push(Observation {
            id,
            memory_session_id: req.memory_session_id.clone(),
            project: req.project.clone(),
            kind: new_obs.kind,
            title: new_obs.title.clone(),
            subtitle: new_obs.subtitle.clone(),
            narrative: new_obs.narrative.clone(),
            facts: new_obs.facts.clone(),
            concepts: new_obs.concepts.clone(),
            files_read: new_obs.files_read.clone(),
            files_modified: new_obs.files_modified.clone(),
            prompt_number: req.prompt_number,
            discovery_tokens: req.discovery_tokens,
            created_at_epoch,
        });
    }

    let mut summary_id = None;
    let mut summary_out = None;
    if let Some(new_summary) = &req.summary {
        let id = insert_summary(&tx, &req, new_summary, created_at_epoch)?;
        summary_id = Some(id);
        summary_out = Some(Summary {
            id,
            memory_session_id: req.memory_session_id.clone(),
            project: req.project.clone(),
            request: new_summary.request.clone(),
            investigated: new_summary.investigated.clone(),
            learned: new_summary.learned.clone(),
            completed: new_summary.completed.clone(),
            next_steps: new_summary.next_steps.clone(),
            notes: new_summary.notes.clone(),
            prompt_number: req.prompt_number,
            discovery_tokens: req.discovery_tokens,
            created_at_epoch,
        });
    }

    if let Some(message_id) = req.message_id {
        tx.execute(
            "UPDATE pending_messages SET status = 'processed' WHERE id = ? AND status = 'processing'",
            params![message_id],
        )?;
    }

    tx.commit()?;

    Ok(StoreObservationsOutcome { obs_ids, summary_id, created_at_epoch, observations, summary: summary_out })
}

fn insert_observation(
    tx: &Transaction<'_>,
    req: &StoreObservationsRequest,
    obs: &NewObservation,
    created_at_epoch: i64,
) -> Result<i64> {
    let kind_str = serde_json::to_value(obs.kind)?.as_str().unwrap_or("other").to_string();
    tx.execute(
        "INSERT INTO observations (
            memory_session_id, project, type, title, subtitle, narrative,
            facts, concepts, files_read, files_modified,
            prompt_number, discovery_tokens, created_at_epoch
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            req.memory_session_id,
            req.project,
            kind_str,
            obs.title,
            obs.subtitle,
            obs.narrative,
            to_json(&obs.facts)?,
            to_json(&obs.concepts)?,
            to_json(&obs.files_read)?,
            to_json(&obs.files_modified)?,
            req.prompt_number,
            req.discovery_tokens,
            created_at_epoch,
        ],
    )?;
    Ok(tx.last_insert_rowid())
}

fn insert_summary(
    tx: &Transaction<'_>,
    req: &StoreObservationsRequest,
    summary: &NewSummary,
    created_at_epoch: i64,
) -> Result<i64> {
    tx.execute(
        "INSERT INTO summaries (
            memory_session_id, project, request, investigated, learned,
            completed, next_steps, notes, prompt_number, discovery_tokens, created_at_epoch
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            req.memory_session_id,
            req.project,
            summary.request,
            summary.investigated,
            summary.learned,
            summary.completed,
            summary.next_steps,
            summary.notes,
            req.prompt_number,
            req.discovery_tokens,
            created_at_epoch,
        ],
    )?;
    Ok(tx.last_insert_rowid())
}
