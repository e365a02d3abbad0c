// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Cross-crate end-to-end tests driving the session processing core the
//! way the worker orchestrator wires it together: store + queue + writer +
//! a scripted provider client, without any HTTP surface or live network
//! access. Each test follows one of the seed scenarios the crate's design
//! notes enumerate (happy path, privacy, crash recovery, provider fallback).

use std::sync::Arc;

use mnemo_providers::mock::ScriptedMockClient;
use mnemo_providers::{ModelClient, ProviderError, QueryOptions};
use mnemo_queue::DurableQueue;
use mnemo_store::RecordStore;
use mnemo_types::MessagePayload;
use mnemo_util::privacy;
use mnemo_vector::{Document, QueryMatch, VectorIndex};
use mnemo_writer::WriteRequest;
use tokio::sync::broadcast;

/// A recording [`VectorIndex`] so tests can assert on what the writer synced
/// without a live embedding server.
#[derive(Default)]
struct RecordingIndex {
    upserted: std::sync::Mutex<Vec<String>>,
}

#[async_trait::async_trait]
impl VectorIndex for RecordingIndex {
    async fn upsert(&self, _project: &str, doc: Document) -> mnemo_vector::Result<()> {
        self.upserted.lock().unwrap().push(doc.id);
        Ok(())
    }
    async fn batch_add(&self, _project: &str, docs: Vec<Document>) -> mnemo_vector::Result<()> {
        self.upserted.lock().unwrap().extend(docs.into_iter().map(|d| d.id));
        Ok(())
    }
    async fn query(&self, _project: &str, _text: &str, _top_k: usize) -> mnemo_vector::Result<Vec<QueryMatch>> {
        Ok(Vec::new())
    }
    async fn list_ids(&self, _project: &str) -> mnemo_vector::Result<Vec<String>> {
        Ok(Vec::new())
    }
    async fn list_collections(&self) -> mnemo_vector::Result<Vec<String>> {
        Ok(Vec::new())
    }
    async fn delete_collection(&self, _name: &str) -> mnemo_vector::Result<()> {
        Ok(())
    }
    async fn delete_documents(&self, _project: &str, _ids: &[String]) -> mnemo_vector::Result<()> {
        Ok(())
    }
    async fn close(&self) -> mnemo_vector::Result<()> {
        Ok(())
    }
}

fn observation_reply(narrative: &str) -> String {
    format!(
        r#"<response>
            <observation>
                <type>discovery</type>
                <title>{narrative}</title>
                <narrative>{narrative}</narrative>
                <file_modified>a.md</file_modified>
            </observation>
        </response>"#
    )
}

/// Happy path: init a session, enqueue one tool observation, let a scripted
/// provider reply with a single observation, and confirm the full write
/// lands atomically with the queue acknowledged and one document synced to
/// the vector index.
#[tokio::test]
async fn happy_path_observation_is_stored_and_synced_and_acknowledged() {
    let store = RecordStore::open_in_memory().unwrap();
    let queue = DurableQueue::new(store.shared_conn());
    let index = Arc::new(RecordingIndex::default());

    let session_id = store.create_or_get_session("c1", "p").unwrap();
    store.save_user_prompt("c1", 1, "hello").unwrap();

    let payload = MessagePayload::ToolObservation {
        tool_name: "Write".into(),
        tool_input: serde_json::json!({"file_path": "a.md"}),
        tool_response: serde_json::json!({"ok": true}),
    };
    let message_id = queue.enqueue(session_id, "c1", &payload, "/tmp/proj").unwrap();

    let claimed = queue.claim(session_id).unwrap().expect("message should be claimable");
    assert_eq!(claimed.id, message_id);

    let client = ScriptedMockClient::always_text(observation_reply("Wrote a.md"));
    let (_cancel_tx, mut cancel_rx) = tokio::sync::watch::channel(false);
    let outcome = client
        .query(&[], &mnemo_providers::Message::user("observe"), QueryOptions::default(), &mut cancel_rx)
        .await
        .unwrap();

    store.update_memory_session_id(session_id, outcome.memory_session_id.as_deref().unwrap()).unwrap();

    let (events_tx, mut events_rx) = broadcast::channel(16);
    let write_req = WriteRequest {
        memory_session_id: outcome.memory_session_id.clone().unwrap(),
        project: "p".into(),
        message_id: Some(message_id),
        prompt_number: 1,
        discovery_tokens: outcome.output_tokens as i64,
    };
    let write_outcome =
        mnemo_writer::write_response(&store, &queue, index.clone(), &events_tx, session_id, write_req, &outcome.content)
            .await
            .unwrap();

    assert_eq!(write_outcome.observations_written, 1);
    assert_eq!(queue.pending_count(session_id).unwrap(), 0, "queue row should be acknowledged");
    // The vector-sync fan-out runs on its own spawned task; wait for the
    // event it publishes rather than polling with `try_recv`.
    assert!(matches!(events_rx.recv().await, Ok(_)), "a record event should be published");
    assert_eq!(index.upserted.lock().unwrap().len(), 1, "exactly one document should be synced");

    let session = store.get_session_by_id(session_id).unwrap().unwrap();
    assert!(session.memory_session_id.is_some());
}

/// A prompt that is entirely private must never reach storage, and a
/// partially private prompt is persisted with only the private span
/// removed.
#[tokio::test]
async fn private_prompt_is_scrubbed_or_skipped_entirely() {
    let store = RecordStore::open_in_memory().unwrap();

    let scrubbed = privacy::scrub("public <private>secret</private>");
    assert_eq!(scrubbed, "public");
    store.save_user_prompt("c2", 1, &scrubbed).unwrap();
    let saved = store.get_latest_user_prompt("c2").unwrap().unwrap();
    assert_eq!(saved.text, "public");
    assert!(!saved.text.contains("secret"));

    assert!(privacy::is_entirely_private("<private>only</private>"));
}

/// A message left `processing` by a crashed worker is reclaimed by
/// `reset_stuck` on the next start, and the reclaim is idempotent.
#[tokio::test]
async fn reset_stuck_reclaims_crashed_processing_rows_idempotently() {
    let store = RecordStore::open_in_memory().unwrap();
    let queue = DurableQueue::new(store.shared_conn());
    let session_id = store.create_or_get_session("c3", "p").unwrap();

    for _ in 0..5 {
        queue
            .enqueue(
                session_id,
                "c3",
                &MessagePayload::Summarize { last_assistant_message: "done".into() },
                "/tmp",
            )
            .unwrap();
    }

    // Claim message 2 (simulating a crash mid-processing) but never ack it.
    let _first = queue.claim(session_id).unwrap().unwrap();
    let second = queue.claim(session_id).unwrap().unwrap();
    assert_eq!(queue.pending_count(session_id).unwrap(), 3);

    // A crash leaves `second` stuck in `processing`. `reset_stuck` with a
    // threshold of 0 reclaims anything currently processing.
    let reclaimed = queue.reset_stuck(0).unwrap();
    assert_eq!(reclaimed, 1, "exactly the stuck row should be reclaimed");
    assert_eq!(queue.pending_count(session_id).unwrap(), 4);

    // Idempotent: running it again finds nothing left to reset.
    let reclaimed_again = queue.reset_stuck(0).unwrap();
    assert_eq!(reclaimed_again, 0);

    let _ = second.id;
}

/// The retry layer surfaces a `Fatal` error immediately with no wasted
/// retries, which is the signal the session processor uses to walk the
/// provider fallback chain.
#[tokio::test]
async fn fatal_provider_error_surfaces_without_exhausting_retry_budget() {
    let client = ScriptedMockClient::new(vec![Err(ProviderError::Fatal("invalid api key".into()))]);
    let (_tx, mut rx) = tokio::sync::watch::channel(false);
    let err = mnemo_providers::query_with_retry(
        &client,
        &[],
        &mnemo_providers::Message::user("hi"),
        QueryOptions::default(),
        &mut rx,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ProviderError::Fatal(_)));
}

/// Orphan-collection cleanup identifies collections that don't match the
/// project naming convention and leaves conforming ones alone.
#[tokio::test]
async fn orphan_collections_are_identified_for_cleanup() {
    let cols = vec!["cm__p".to_string(), "cm__q".to_string(), "junk-uuid".to_string()];
    let orphaned = mnemo_vector::identify_orphaned_collections(&cols);
    assert_eq!(orphaned, vec!["junk-uuid".to_string()]);
}

/// An observation whose response contains no `<observation>` elements still
/// acknowledges the queue row (B2), even though nothing was written.
#[tokio::test]
async fn response_with_no_records_still_acknowledges_queue_row() {
    let store = RecordStore::open_in_memory().unwrap();
    let queue = DurableQueue::new(store.shared_conn());
    let index = Arc::new(RecordingIndex::default());
    let session_id = store.create_or_get_session("c4", "p").unwrap();
    store.update_memory_session_id(session_id, "mem-4").unwrap();

    let message_id = queue
        .enqueue(session_id, "c4", &MessagePayload::Summarize { last_assistant_message: "noop".into() }, "/tmp")
        .unwrap();
    queue.claim(session_id).unwrap();

    let (events_tx, _rx) = broadcast::channel(16);
    let write_req = WriteRequest {
        memory_session_id: "mem-4".into(),
        project: "p".into(),
        message_id: Some(message_id),
        prompt_number: 1,
        discovery_tokens: 0,
    };
    let outcome =
        mnemo_writer::write_response(&store, &queue, index.clone(), &events_tx, session_id, write_req, "<response></response>")
            .await
            .unwrap();

    assert_eq!(outcome.observations_written, 0);
    assert_eq!(queue.pending_count(session_id).unwrap(), 0);
    assert!(index.upserted.lock().unwrap().is_empty());
}

/// `create_or_get_session` is idempotent on `content_session_id`: two inits
/// for the same content session id must resolve to the same session.
#[tokio::test]
async fn create_or_get_session_is_idempotent() {
    let store = RecordStore::open_in_memory().unwrap();
    let first = store.create_or_get_session("same-cid", "p").unwrap();
    let second = store.create_or_get_session("same-cid", "p").unwrap();
    assert_eq!(first, second);
}

/// Config round trips through the on-disk settings file the way the
/// worker's settings watcher and `/api/settings` route both rely on.
#[test]
fn config_save_then_load_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");

    let mut config = mnemo_config::Config::default();
    config.server.port = 4731;
    mnemo_config::save(&path, &config).unwrap();

    let loaded = mnemo_config::load(&path).unwrap();
    assert_eq!(loaded.server.port, 4731);
}
