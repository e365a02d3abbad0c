// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Response parser and writer: turns a provider's raw XML reply into
//! stored records, acknowledges the originating queue message in the same
//! transaction, then fans the result out to the vector index and the
//! session's event bus. The write itself commits synchronously; the fan-out
//! is spawned onto its own short-lived task so a slow or down embedding
//! server never stalls the processor loop waiting on `write_response`.

pub mod error;
pub mod parser;

pub use error::{Result, WriterError};
pub use parser::{parse_response, ParsedResponse};

use std::sync::{Arc, LazyLock};

use mnemo_queue::{DurableQueue, WakeBus};
use mnemo_store::{RecordStore, StoreObservationsOutcome, StoreObservationsRequest};
use mnemo_types::{RecordKind, SessionEvent};
use mnemo_vector::VectorIndex;
use tokio::sync::{broadcast, Semaphore};
use tracing::warn;

/// Caps the number of fan-out tasks ([`publish_and_sync`]) running at once.
/// Without a bound, a stalled embedding server would let spawned tasks pile
/// up without limit under sustained write throughput; dropping a fan-out
/// when the pool is full just means the vector index lags a bit further
/// behind the durable store, which is within the index's documented slack.
static FANOUT_PERMITS: LazyLock<Arc<Semaphore>> = LazyLock::new(|| Arc::new(Semaphore::new(32)));

/// Everything a single `write` call needs beyond the raw XML: which queue
/// message to ack, which session the event bus belongs to, and the bits of
/// bookkeeping (`prompt_number`, `discovery_tokens`) the store requires.
#[derive(Debug, Clone)]
pub struct WriteRequest {
    pub memory_session_id: String,
    pub project: String,
    pub message_id: Option<i64>,
    pub prompt_number: i64,
    pub discovery_tokens: i64,
}

/// Outcome of a completed write, exposed mainly for tests and callers that
/// want to log counts without re-deriving them from the store outcome.
#[derive(Debug, Clone, Default)]
pub struct WriteOutcome {
    pub observations_written: usize,
    pub summary_written: bool,
}

/// Parses a provider reply and persists it, acknowledging the queue message
/// in the same transaction as the store write when records were produced.
/// When the reply yields no observations and no summary, the message is
/// still acknowledged (B2) — just via a separate `mark_processed` call,
/// since there is nothing for `store_observations_atomic` to commit.
pub async fn write_response(
    store: &RecordStore,
    queue: &DurableQueue,
    vector: Arc<dyn VectorIndex>,
    events: &broadcast::Sender<SessionEvent>,
    session_id: i64,
    req: WriteRequest,
    raw_xml: &str,
) -> Result<WriteOutcome> {
    let parsed = parse_response(raw_xml)?;

    if parsed.observations.is_empty() && parsed.summary.is_none() {
        if let Some(message_id) = req.message_id {
            queue.mark_processed(message_id)?;
        }
        return Ok(WriteOutcome::default());
    }

    let store_req = StoreObservationsRequest {
        memory_session_id: req.memory_session_id,
        project: req.project.clone(),
        observations: parsed.observations,
        summary: parsed.summary,
        message_id: req.message_id,
        prompt_number: req.prompt_number,
        discovery_tokens: req.discovery_tokens,
        created_at_epoch: None,
    };

    let outcome = store.store_observations_atomic(store_req)?;

    let write_outcome =
        WriteOutcome { observations_written: outcome.observations.len(), summary_written: outcome.summary.is_some() };

    spawn_fanout(vector, events.clone(), session_id, req.project, outcome);

    Ok(write_outcome)
}

/// Hands the vector-sync/event-broadcast fan-out to its own task so
/// `write_response` returns as soon as the durable store has committed.
/// Bounded by [`FANOUT_PERMITS`]; when the pool is saturated the fan-out for
/// this write is dropped rather than queued, since the processor loop must
/// never wait on it.
fn spawn_fanout(
    vector: Arc<dyn VectorIndex>,
    events: broadcast::Sender<SessionEvent>,
    session_id: i64,
    project: String,
    outcome: StoreObservationsOutcome,
) {
    let Ok(permit) = Arc::clone(&FANOUT_PERMITS).try_acquire_owned() else {
        warn!(session_id, "vector sync fan-out pool saturated, dropping this batch's sync");
        return;
    };
    tokio::spawn(async move {
        let _permit = permit;
        publish_and_sync(vector.as_ref(), &events, &project, &outcome).await;
    });
}

/// Fire-and-forget: vector sync failures are logged by `mnemo-vector` and
/// never surface here, and a lack of event subscribers is not an error
/// (`broadcast::Sender::send` returning `Err` just means nobody's listening
/// right now).
async fn publish_and_sync(
    vector: &dyn VectorIndex,
    events: &broadcast::Sender<SessionEvent>,
    project: &str,
    outcome: &StoreObservationsOutcome,
) {
    for obs in &outcome.observations {
        mnemo_vector::sync_observation(vector, project, obs).await;
        let _ = events.send(SessionEvent::Message(RecordKind::Observation(obs.clone())));
    }
    if let Some(summary) = &outcome.summary {
        mnemo_vector::sync_summary(vector, project, summary).await;
        let _ = events.send(SessionEvent::Message(RecordKind::Summary(summary.clone())));
    }
}

/// Acknowledge a message that produced no parseable records at all — e.g.
/// the provider returned something that failed to parse as XML after
/// retries were exhausted. Kept distinct from the empty-but-valid-XML case
/// in [`write_response`] so callers can log the two differently.
pub fn acknowledge_without_records(queue: &DurableQueue, message_id: i64) -> Result<()> {
    queue.mark_processed(message_id)?;
    Ok(())
}

/// Wakes a session's processor loop after an external enqueue, bypassing
/// the poll interval. Thin re-export so callers depending on `mnemo-writer`
/// don't need a direct `mnemo-queue` dependency just for this.
pub fn wake_session(bus: &Arc<WakeBus>, session_id: i64) {
    bus.wake(session_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemo_store::RecordStore;
    use mnemo_types::MessagePayload;

    fn setup() -> (RecordStore, DurableQueue, i64, String) {
        let store = RecordStore::open_in_memory().unwrap();
        let queue = DurableQueue::new(store.shared_conn());
        let session_id = store.create_or_get_session("content-1", "proj").unwrap();
        store.update_memory_session_id(session_id, "mem-1").unwrap();
        (store, queue, session_id, "mem-1".to_string())
    }

    struct NullIndex;

    #[async_trait::async_trait]
    impl VectorIndex for NullIndex {
        async fn upsert(&self, _project: &str, _doc: mnemo_vector::Document) -> mnemo_vector::Result<()> {
            Ok(())
        }
        async fn batch_add(&self, _project: &str, _docs: Vec<mnemo_vector::Document>) -> mnemo_vector::Result<()> {
            Ok(())
        }
        async fn query(&self, _project: &str, _text: &str, _top_k: usize) -> mnemo_vector::Result<Vec<mnemo_vector::QueryMatch>> {
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

    fn xml_with_one_observation() -> &'static str {
        r#"<response>
            <observation>
                <type>discovery</type>
                <title>Wrote a.md</title>
                <narrative>Wrote a.md</narrative>
                <file_modified>a.md</file_modified>
            </observation>
        </response>"#
    }

    #[tokio::test]
    async fn write_response_stores_observation_and_acks_message() {
        let (store, queue, session_id, mem_id) = setup();
        let message_id = queue
            .enqueue(
                session_id,
                "content-1",
                &MessagePayload::Summarize { last_assistant_message: "done".into() },
                "/tmp",
            )
            .unwrap();
        queue.claim(session_id).unwrap();

        let index: Arc<dyn VectorIndex> = Arc::new(NullIndex);
        let (tx, mut rx) = broadcast::channel(16);
        let req = WriteRequest {
            memory_session_id: mem_id,
            project: "proj".into(),
            message_id: Some(message_id),
            prompt_number: 1,
            discovery_tokens: 50,
        };

        let outcome = write_response(&store, &queue, index, &tx, session_id, req, xml_with_one_observation())
            .await
            .unwrap();

        assert_eq!(outcome.observations_written, 1);
        assert_eq!(queue.pending_count(session_id).unwrap(), 0);
        // The vector-sync/event fan-out runs on its own spawned task, so wait
        // on the event rather than polling it with `try_recv`.
        assert!(matches!(rx.recv().await.unwrap(), SessionEvent::Message(RecordKind::Observation(_))));
    }

    #[tokio::test]
    async fn write_response_with_no_records_still_acknowledges_message() {
        let (store, queue, session_id, mem_id) = setup();
        let message_id = queue
            .enqueue(
                session_id,
                "content-1",
                &MessagePayload::Summarize { last_assistant_message: "noop".into() },
                "/tmp",
            )
            .unwrap();
        queue.claim(session_id).unwrap();

        let index: Arc<dyn VectorIndex> = Arc::new(NullIndex);
        let (tx, _rx) = broadcast::channel(16);
        let req = WriteRequest {
            memory_session_id: mem_id,
            project: "proj".into(),
            message_id: Some(message_id),
            prompt_number: 1,
            discovery_tokens: 0,
        };

        let outcome = write_response(&store, &queue, index, &tx, session_id, req, "<response></response>")
            .await
            .unwrap();

        assert_eq!(outcome.observations_written, 0);
        assert!(!outcome.summary_written);
        assert_eq!(queue.pending_count(session_id).unwrap(), 0);
    }
}
