// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Document formatting: one source record becomes one or more vector
//! documents, each carrying metadata the maintenance jobs and query
//! post-processing rely on.

use serde_json::json;

use mnemo_types::{Observation, Summary, UserPrompt};

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub text: String,
    pub metadata: serde_json::Value,
}

fn base_metadata(sqlite_id: i64, doc_type: &str, project: &str, created_at_epoch: i64) -> serde_json::Value {
    json!({
        "sqlite_id": sqlite_id,
        "doc_type": doc_type,
        "project": project,
        "created_at_epoch": created_at_epoch,
    })
}

/// One narrative document (if present), zero or one text document, and one
/// document per fact.
pub fn format_observation(obs: &Observation) -> Vec<Document> {
    let mut out = Vec::new();

    if let Some(narrative) = obs.narrative.as_ref().filter(|n| !n.trim().is_empty()) {
        let mut meta = base_metadata(obs.id, "observation_narrative", &obs.project, obs.created_at_epoch);
        meta["memory_session_id"] = json!(obs.memory_session_id);
        out.push(Document { id: format!("obs_{}_narrative", obs.id), text: narrative.clone(), metadata: meta });
    }

    if !obs.title.trim().is_empty() {
        let mut meta = base_metadata(obs.id, "observation_text", &obs.project, obs.created_at_epoch);
        meta["memory_session_id"] = json!(obs.memory_session_id);
        out.push(Document { id: format!("obs_{}_text", obs.id), text: obs.title.clone(), metadata: meta });
    }

    for (i, fact) in obs.facts.iter().enumerate() {
        if fact.trim().is_empty() {
            continue;
        }
        let mut meta = base_metadata(obs.id, "observation_fact", &obs.project, obs.created_at_epoch);
        meta["memory_session_id"] = json!(obs.memory_session_id);
        out.push(Document { id: format!("obs_{}_fact_{}", obs.id, i), text: fact.clone(), metadata: meta });
    }

    out
}

/// Up to six documents, one per non-empty field (request, investigated,
/// learned, completed, next_steps, notes).
pub fn format_summary(summary: &Summary) -> Vec<Document> {
    summary
        .non_empty_fields()
        .into_iter()
        .map(|(field, text)| {
            let mut meta = base_metadata(summary.id, "summary", &summary.project, summary.created_at_epoch);
            meta["memory_session_id"] = json!(summary.memory_session_id);
            meta["field"] = json!(field);
            Document { id: format!("summary_{}_{}", summary.id, field), text: text.to_string(), metadata: meta }
        })
        .collect()
}

/// One document per user prompt. `project` isn't part of `UserPrompt`; the
/// caller (writer/backfill) supplies it since it is session-level state.
pub fn format_prompt(prompt: &UserPrompt, project: &str) -> Option<Document> {
    if prompt.text.trim().is_empty() {
        return None;
    }
    let meta = base_metadata(prompt.id, "prompt", project, prompt.created_at_epoch);
    Some(Document { id: format!("prompt_{}", prompt.id), text: prompt.text.clone(), metadata: meta })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemo_types::ObservationType;

    fn obs() -> Observation {
        Observation {
            id: 1,
            memory_session_id: "mem-1".into(),
            project: "proj".into(),
            kind: ObservationType::Discovery,
            title: "Wrote a.md".into(),
            subtitle: None,
            narrative: Some("Wrote a.md to document the API".into()),
            facts: vec!["a.md created".into(), "".into(), "used markdown".into()],
            concepts: vec![],
            files_read: vec![],
            files_modified: vec!["a.md".into()],
            prompt_number: 1,
            discovery_tokens: 10,
            created_at_epoch: 1000,
        }
    }

    #[test]
    fn format_observation_produces_narrative_text_and_nonblank_facts() {
        let docs = format_observation(&obs());
        let ids: Vec<_> = docs.iter().map(|d| d.id.clone()).collect();
        assert_eq!(ids, vec!["obs_1_narrative", "obs_1_text", "obs_1_fact_0", "obs_1_fact_2"]);
    }

    #[test]
    fn format_observation_skips_missing_narrative() {
        let mut o = obs();
        o.narrative = None;
        let docs = format_observation(&o);
        assert!(!docs.iter().any(|d| d.id == "obs_1_narrative"));
    }

    #[test]
    fn format_observation_metadata_includes_required_fields() {
        let docs = format_observation(&obs());
        let narrative_doc = docs.iter().find(|d| d.id == "obs_1_narrative").unwrap();
        assert_eq!(narrative_doc.metadata["sqlite_id"], 1);
        assert_eq!(narrative_doc.metadata["doc_type"], "observation_narrative");
        assert_eq!(narrative_doc.metadata["project"], "proj");
        assert_eq!(narrative_doc.metadata["created_at_epoch"], 1000);
    }

    #[test]
    fn format_summary_skips_blank_fields_and_caps_at_six() {
        let summary = Summary {
            id: 2,
            memory_session_id: "mem-1".into(),
            project: "proj".into(),
            request: "do x".into(),
            investigated: "".into(),
            learned: "y".into(),
            completed: "z".into(),
            next_steps: "ship".into(),
            notes: Some("careful".into()),
            prompt_number: 1,
            discovery_tokens: 0,
            created_at_epoch: 2000,
        };
        let docs = format_summary(&summary);
        assert_eq!(docs.len(), 5);
        assert!(docs.iter().all(|d| d.metadata["doc_type"] == "summary"));
    }

    #[test]
    fn format_prompt_skips_blank_text() {
        let p = UserPrompt { id: 3, content_session_id: "c1".into(), prompt_number: 1, text: "   ".into(), created_at_epoch: 0 };
        assert!(format_prompt(&p, "proj").is_none());
    }

    #[test]
    fn format_prompt_produces_single_document() {
        let p = UserPrompt { id: 3, content_session_id: "c1".into(), prompt_number: 1, text: "hello".into(), created_at_epoch: 500 };
        let doc = format_prompt(&p, "proj").unwrap();
        assert_eq!(doc.id, "prompt_3");
        assert_eq!(doc.metadata["doc_type"], "prompt");
    }
}
