// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Abstract capability set every vector index backend must provide.

use async_trait::async_trait;

use crate::documents::Document;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq)]
pub struct QueryMatch {
    pub id: String,
    pub text: String,
    pub score: f32,
    pub metadata: serde_json::Value,
}

/// One collection per project, named `cm__<project>`.
pub fn collection_name(project: &str) -> String {
    format!("cm__{project}")
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Upsert a single document into a project's collection. Idempotent by
    /// document id.
    async fn upsert(&self, project: &str, doc: Document) -> Result<()>;

    /// Upsert many documents, chunked internally at a fixed batch size.
    async fn batch_add(&self, project: &str, docs: Vec<Document>) -> Result<()>;

    /// Semantic query, deduplicated by `sqlite_id` before returning.
    async fn query(&self, project: &str, text: &str, top_k: usize) -> Result<Vec<QueryMatch>>;

    /// Document ids currently stored for a project's collection.
    async fn list_ids(&self, project: &str) -> Result<Vec<String>>;

    /// Every collection name the backend currently holds.
    async fn list_collections(&self) -> Result<Vec<String>>;

    async fn delete_collection(&self, name: &str) -> Result<()>;

    async fn delete_documents(&self, project: &str, ids: &[String]) -> Result<()>;

    /// Release any resources (HTTP connections, child handles). Idempotent.
    async fn close(&self) -> Result<()>;
}

pub fn dedup_by_sqlite_id(matches: Vec<QueryMatch>) -> Vec<QueryMatch> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::with_capacity(matches.len());
    for m in matches {
        let key = m.metadata.get("sqlite_id").cloned().unwrap_or(serde_json::Value::Null);
        let key = (m.metadata.get("doc_type").cloned().unwrap_or(serde_json::Value::Null), key);
        if seen.insert(key) {
            out.push(m);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn qm(id: &str, sqlite_id: i64, doc_type: &str) -> QueryMatch {
        QueryMatch { id: id.into(), text: id.into(), score: 1.0, metadata: json!({"sqlite_id": sqlite_id, "doc_type": doc_type}) }
    }

    #[test]
    fn dedup_keeps_first_occurrence_per_sqlite_id_and_doc_type() {
        let matches = vec![qm("a", 1, "observation_fact"), qm("b", 1, "observation_fact"), qm("c", 2, "observation_fact")];
        let deduped = dedup_by_sqlite_id(matches);
        assert_eq!(deduped.iter().map(|m| m.id.clone()).collect::<Vec<_>>(), vec!["a", "c"]);
    }

    #[test]
    fn collection_name_uses_prefix() {
        assert_eq!(collection_name("acme"), "cm__acme");
    }
}
