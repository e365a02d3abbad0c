// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Durable per-session FIFO queue. Built atop `mnemo-store`'s shared
//! connection — `pending_messages` rows are the only thing this crate
//! touches, so it serializes through the exact same single writer the
//! record store uses, with short transactions per operation.

mod bus;
mod error;

pub use bus::WakeBus;
pub use error::{QueueError, Result};

use std::sync::Arc;

use rusqlite::{params, OptionalExtension, Row};
use tracing::debug;

use mnemo_store::SharedConn;
use mnemo_types::{MessagePayload, PendingMessage, PendingStatus, MAX_ATTEMPT_COUNT};

pub struct DurableQueue {
    conn: SharedConn,
    bus: Arc<WakeBus>,
}

fn status_str(status: PendingStatus) -> &'static str {
    match status {
        PendingStatus::Pending => "pending",
        PendingStatus::Processing => "processing",
        PendingStatus::Processed => "processed",
        PendingStatus::Failed => "failed",
        PendingStatus::Abandoned => "abandoned",
    }
}

fn parse_status(raw: &str) -> PendingStatus {
    match raw {
        "processing" => PendingStatus::Processing,
        "processed" => PendingStatus::Processed,
        "failed" => PendingStatus::Failed,
        "abandoned" => PendingStatus::Abandoned,
        _ => PendingStatus::Pending,
    }
}

fn row_to_message(row: &Row<'_>) -> rusqlite::Result<PendingMessage> {
    let payload_raw: String = row.get(3)?;
    let status_raw: String = row.get(4)?;
    let payload: MessagePayload = serde_json::from_str(&payload_raw).unwrap_or(MessagePayload::Summarize {
        last_assistant_message: String::new(),
    });
    Ok(PendingMessage {
        id: row.get(0)?,
        session_id: row.get(1)?,
        content_session_id: row.get(2)?,
        payload,
        status: parse_status(&status_raw),
        attempt_count: row.get(5)?,
        created_at_epoch: row.get(6)?,
        claimed_at_epoch: row.get(7)?,
        cwd: row.get(8)?,
    })
}

const SELECT_COLUMNS: &str =
    "id, session_id, content_session_id, payload, status, attempt_count, created_at_epoch, claimed_at_epoch, cwd";

impl DurableQueue {
    pub fn new(conn: SharedConn) -> Self {
        Self { conn, bus: Arc::new(WakeBus::default()) }
    }

    pub fn bus(&self) -> Arc<WakeBus> {
        self.bus.clone()
    }

    /// Appends a pending row and wakes the session's processor loop.
    pub fn enqueue(&self, session_id: i64, content_session_id: &str, payload: &MessagePayload, cwd: &str) -> Result<i64> {
        let payload_json = serde_json::to_string(payload)?;
        let created_at_epoch = chrono::Utc::now().timestamp();
        let id = {
            let conn = self.conn.lock().expect("store mutex poisoned");
            conn.execute(
                "INSERT INTO pending_messages (session_id, content_session_id, payload, status, created_at_epoch, cwd)
                 VALUES (?, ?, ?, 'pending', ?, ?)",
                params![session_id, content_session_id, payload_json, created_at_epoch, cwd],
            )?;
            conn.last_insert_rowid()
        };
        debug!(session_id, message_id = id, "enqueued pending message");
        self.bus.wake(session_id);
        Ok(id)
    }

    /// Atomic select-and-update: the oldest pending row transitions to
    /// `processing` and is returned; `None` when nothing is pending (FIFO
    /// order within a session).
    pub fn claim(&self, session_id: i64) -> Result<Option<PendingMessage>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let claimed_at = chrono::Utc::now().timestamp();
        let id: Option<i64> = conn
            .query_row(
                "SELECT id FROM pending_messages WHERE session_id = ? AND status = 'pending' ORDER BY id ASC LIMIT 1",
                params![session_id],
                |r| r.get(0),
            )
            .optional()?;
        let Some(id) = id else { return Ok(None) };

        conn.execute(
            "UPDATE pending_messages SET status = 'processing', claimed_at_epoch = ? WHERE id = ? AND status = 'pending'",
            params![claimed_at, id],
        )?;

        let sql = format!("SELECT {SELECT_COLUMNS} FROM pending_messages WHERE id = ?");
        Ok(conn.query_row(&sql, params![id], row_to_message).optional()?)
    }

    /// Normally invoked as part of `store_observations_atomic`'s transaction;
    /// exposed here too for the "no records produced" path, which
    /// acknowledges the message on its own.
    pub fn mark_processed(&self, message_id: i64) -> Result<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.execute(
            "UPDATE pending_messages SET status = 'processed' WHERE id = ?",
            params![message_id],
        )?;
        Ok(())
    }

    /// processing -> failed; bumps `attempt_count`, abandoning once the cap
    /// is exceeded rather than leaving it eligible for another claim.
    pub fn mark_failed(&self, message_id: i64) -> Result<PendingStatus> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let attempt_count: i32 = conn
            .query_row("SELECT attempt_count FROM pending_messages WHERE id = ?", params![message_id], |r| r.get(0))
            .optional()?
            .ok_or(QueueError::NotFound(message_id))?;
        let new_count = attempt_count + 1;
        let next_status = if new_count >= MAX_ATTEMPT_COUNT { PendingStatus::Abandoned } else { PendingStatus::Failed };
        conn.execute(
            "UPDATE pending_messages SET status = ?, attempt_count = ? WHERE id = ?",
            params![status_str(next_status), new_count, message_id],
        )?;
        Ok(next_status)
    }

    pub fn mark_all_session_failed(&self, session_id: i64) -> Result<usize> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        Ok(conn.execute(
            "UPDATE pending_messages SET status = 'failed' WHERE session_id = ? AND status IN ('pending', 'processing')",
            params![session_id],
        )?)
    }

    pub fn mark_all_session_abandoned(&self, session_id: i64) -> Result<usize> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        Ok(conn.execute(
            "UPDATE pending_messages SET status = 'abandoned' WHERE session_id = ? AND status IN ('pending', 'processing', 'failed')",
            params![session_id],
        )?)
    }

    /// Crash-recovery entry point: any row left `processing` older than
    /// `threshold_secs` reverts to `pending`. Idempotent — a second run with
    /// the same threshold finds nothing left to reset.
    pub fn reset_stuck(&self, threshold_secs: i64) -> Result<usize> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let cutoff = chrono::Utc::now().timestamp() - threshold_secs;
        Ok(conn.execute(
            "UPDATE pending_messages SET status = 'pending', claimed_at_epoch = NULL
             WHERE status = 'processing' AND claimed_at_epoch IS NOT NULL AND claimed_at_epoch < ?",
            params![cutoff],
        )?)
    }

    /// Used during safe drain for settings hot-reload: puts every
    /// `processing` row for a session back to `pending` so message order is
    /// preserved for the restarted loop.
    pub fn reset_processing_to_pending(&self, session_id: i64) -> Result<usize> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        Ok(conn.execute(
            "UPDATE pending_messages SET status = 'pending', claimed_at_epoch = NULL
             WHERE session_id = ? AND status = 'processing'",
            params![session_id],
        )?)
    }

    pub fn has_any_pending_work(&self) -> Result<bool> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        Ok(conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM pending_messages WHERE status = 'pending')",
            [],
            |r| r.get(0),
        )?)
    }

    pub fn pending_count(&self, session_id: i64) -> Result<i64> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM pending_messages WHERE session_id = ? AND status = 'pending'",
            params![session_id],
            |r| r.get(0),
        )?)
    }

    pub fn sessions_with_pending_messages(&self) -> Result<Vec<i64>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT DISTINCT session_id FROM pending_messages WHERE status = 'pending' ORDER BY session_id",
        )?;
        let rows = stmt.query_map([], |r| r.get(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemo_store::RecordStore;

    fn queue() -> DurableQueue {
        let store = RecordStore::open_in_memory().unwrap();
        DurableQueue::new(store.shared_conn())
    }

    fn obs_payload() -> MessagePayload {
        MessagePayload::ToolObservation {
            tool_name: "Write".into(),
            tool_input: serde_json::json!({"file_path": "a.md"}),
            tool_response: serde_json::json!({"ok": true}),
        }
    }

    #[test]
    fn enqueue_then_claim_returns_pending_row() {
        let q = queue();
        q.enqueue(1, "c1", &obs_payload(), "/tmp").unwrap();
        let claimed = q.claim(1).unwrap().expect("should claim");
        assert_eq!(claimed.status, PendingStatus::Processing);
    }

    #[test]
    fn claim_returns_none_when_empty() {
        let q = queue();
        assert!(q.claim(1).unwrap().is_none());
    }

    #[test]
    fn claim_is_fifo_within_session() {
        let q = queue();
        let id1 = q.enqueue(1, "c1", &obs_payload(), "/tmp").unwrap();
        let _id2 = q.enqueue(1, "c1", &obs_payload(), "/tmp").unwrap();
        let claimed = q.claim(1).unwrap().unwrap();
        assert_eq!(claimed.id, id1);
    }

    #[test]
    fn mark_processed_is_terminal() {
        let q = queue();
        q.enqueue(1, "c1", &obs_payload(), "/tmp").unwrap();
        let claimed = q.claim(1).unwrap().unwrap();
        q.mark_processed(claimed.id).unwrap();
        assert_eq!(q.pending_count(1).unwrap(), 0);
        assert!(q.claim(1).unwrap().is_none());
    }

    #[test]
    fn mark_failed_increments_attempt_count_until_abandoned() {
        let q = queue();
        q.enqueue(1, "c1", &obs_payload(), "/tmp").unwrap();
        let claimed = q.claim(1).unwrap().unwrap();
        let mut status = q.mark_failed(claimed.id).unwrap();
        assert_eq!(status, PendingStatus::Failed);
        // Re-claim isn't possible until reset; directly re-fail to hit the cap.
        for _ in 0..(MAX_ATTEMPT_COUNT - 1) {
            status = q.mark_failed(claimed.id).unwrap();
        }
        assert_eq!(status, PendingStatus::Abandoned);
    }

    #[test]
    fn mark_all_session_failed_covers_pending_and_processing() {
        let q = queue();
        q.enqueue(1, "c1", &obs_payload(), "/tmp").unwrap();
        q.enqueue(1, "c1", &obs_payload(), "/tmp").unwrap();
        let _ = q.claim(1).unwrap();
        let n = q.mark_all_session_failed(1).unwrap();
        assert_eq!(n, 2);
    }

    #[test]
    fn mark_all_session_abandoned_covers_failed_rows_too() {
        let q = queue();
        q.enqueue(1, "c1", &obs_payload(), "/tmp").unwrap();
        q.mark_all_session_failed(1).unwrap();
        let n = q.mark_all_session_abandoned(1).unwrap();
        assert_eq!(n, 1);
    }

    #[test]
    fn reset_stuck_reclaims_old_processing_rows() {
        let q = queue();
        q.enqueue(1, "c1", &obs_payload(), "/tmp").unwrap();
        let claimed = q.claim(1).unwrap().unwrap();
        {
            let conn = q.conn.lock().unwrap();
            conn.execute(
                "UPDATE pending_messages SET claimed_at_epoch = ? WHERE id = ?",
                params![chrono::Utc::now().timestamp() - 10_000, claimed.id],
            )
            .unwrap();
        }
        let n = q.reset_stuck(300).unwrap();
        assert_eq!(n, 1);
        assert_eq!(q.pending_count(1).unwrap(), 1);
    }

    #[test]
    fn reset_stuck_is_idempotent() {
        let q = queue();
        q.enqueue(1, "c1", &obs_payload(), "/tmp").unwrap();
        let claimed = q.claim(1).unwrap().unwrap();
        {
            let conn = q.conn.lock().unwrap();
            conn.execute(
                "UPDATE pending_messages SET claimed_at_epoch = ? WHERE id = ?",
                params![chrono::Utc::now().timestamp() - 10_000, claimed.id],
            )
            .unwrap();
        }
        assert_eq!(q.reset_stuck(300).unwrap(), 1);
        assert_eq!(q.reset_stuck(300).unwrap(), 0);
    }

    #[test]
    fn reset_stuck_leaves_fresh_processing_rows_alone() {
        let q = queue();
        q.enqueue(1, "c1", &obs_payload(), "/tmp").unwrap();
        let _claimed = q.claim(1).unwrap().unwrap();
        assert_eq!(q.reset_stuck(300).unwrap(), 0);
    }

    #[test]
    fn sessions_with_pending_messages_lists_distinct_sessions() {
        let q = queue();
        q.enqueue(1, "c1", &obs_payload(), "/tmp").unwrap();
        q.enqueue(2, "c2", &obs_payload(), "/tmp").unwrap();
        q.enqueue(1, "c1", &obs_payload(), "/tmp").unwrap();
        assert_eq!(q.sessions_with_pending_messages().unwrap(), vec![1, 2]);
    }

    #[test]
    fn has_any_pending_work_reflects_queue_state() {
        let q = queue();
        assert!(!q.has_any_pending_work().unwrap());
        q.enqueue(1, "c1", &obs_payload(), "/tmp").unwrap();
        assert!(q.has_any_pending_work().unwrap());
    }

    #[test]
    fn claim_then_mark_processed_drains_pending_work() {
        let q = queue();
        q.enqueue(1, "c1", &obs_payload(), "/tmp").unwrap();
        let claimed = q.claim(1).unwrap().unwrap();
        q.mark_processed(claimed.id).unwrap();
        assert!(!q.has_any_pending_work().unwrap());
    }
}
