// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Vector index manager: formats observation/summary/prompt records into
//! documents, syncs them to a child embedding server, runs semantic queries,
//! and performs best-effort orphan/retention maintenance.

pub mod documents;
pub mod error;
pub mod http_backend;
pub mod index;
pub mod maintenance;
pub mod manager;
pub mod stdio_backend;

pub use documents::{format_observation, format_prompt, format_summary, Document};
pub use error::{Result, VectorError};
pub use http_backend::HttpVectorBackend;
pub use index::{collection_name, dedup_by_sqlite_id, QueryMatch, VectorIndex};
pub use maintenance::{identify_documents_to_prune, identify_orphaned_collections, DocMeta, COLLECTION_PREFIX};
pub use manager::{ServerManager, ServerManagerConfig};
pub use stdio_backend::StdioVectorBackend;

use mnemo_types::{Observation, Summary, UserPrompt};
use tracing::warn;

/// Sync one observation (and its optional summary) to the index. Failures
/// are logged and swallowed: vector sync is fire-and-forget from the
/// writer's perspective.
pub async fn sync_observation(index: &dyn VectorIndex, project: &str, obs: &Observation) {
    let docs = format_observation(obs);
    if docs.is_empty() {
        return;
    }
    if let Err(err) = index.batch_add(project, docs).await {
        warn!(error = %err, observation_id = obs.id, "vector sync failed for observation");
    }
}

pub async fn sync_summary(index: &dyn VectorIndex, project: &str, summary: &Summary) {
    let docs = format_summary(summary);
    if docs.is_empty() {
        return;
    }
    if let Err(err) = index.batch_add(project, docs).await {
        warn!(error = %err, summary_id = summary.id, "vector sync failed for summary");
    }
}

pub async fn sync_prompt(index: &dyn VectorIndex, project: &str, prompt: &UserPrompt) {
    let Some(doc) = format_prompt(prompt, project) else {
        return;
    };
    if let Err(err) = index.upsert(project, doc).await {
        warn!(error = %err, prompt_id = prompt.id, "vector sync failed for prompt");
    }
}

/// Query that never fails outward: an unreachable/circuit-broken index
/// short-circuits to an empty result set rather than propagating an error.
pub async fn query_or_empty(index: &dyn VectorIndex, project: &str, text: &str, top_k: usize) -> Vec<QueryMatch> {
    match index.query(project, text, top_k).await {
        Ok(matches) => matches,
        Err(err) => {
            warn!(error = %err, project, "vector query unavailable, returning empty results");
            Vec::new()
        }
    }
}

/// Best-effort orphan-collection cleanup, driven by the pure logic in
/// [`maintenance`].
pub async fn run_orphan_cleanup(index: &dyn VectorIndex) -> usize {
    let collections = match index.list_collections().await {
        Ok(c) => c,
        Err(err) => {
            warn!(error = %err, "could not list collections for orphan cleanup");
            return 0;
        }
    };
    let orphans = identify_orphaned_collections(&collections);
    let mut cleaned = 0;
    for name in &orphans {
        match index.delete_collection(name).await {
            Ok(()) => cleaned += 1,
            Err(err) => warn!(error = %err, collection = %name, "failed to delete orphaned collection"),
        }
    }
    cleaned
}

/// Best-effort retention-cap enforcement for one project's collection, given
/// the document metadata already fetched by the caller (list_ids alone does
/// not carry metadata, so callers typically source `metas` from the record
/// store rather than the index itself).
pub async fn run_retention_prune(index: &dyn VectorIndex, project: &str, metas: &[DocMeta], max_items: usize) -> usize {
    let ids = identify_documents_to_prune(metas, max_items);
    if ids.is_empty() {
        return 0;
    }
    match index.delete_documents(project, &ids).await {
        Ok(()) => ids.len(),
        Err(err) => {
            warn!(error = %err, project, "failed to prune retention-capped documents");
            0
        }
    }
}
