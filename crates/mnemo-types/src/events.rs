//! Typed event bus.
//!
//! A fixed enum instead of string event names, so listeners pattern-match
//! instead of string-comparing. One bus instance exists per session
//! (`mnemo-session::SessionManager` owns them); the orchestrator subscribes
//! to all of them for UI/telemetry forwarding.

use serde::{Deserialize, Serialize};

use crate::entities::{Observation, Summary, UserPrompt};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SessionEvent {
    /// A new record was committed for this session.
    Message(RecordKind),
    /// The processor loop has no work and is waiting.
    Idle { session_id: i64 },
    /// The processor loop is working through `units` in-flight items.
    Busy { session_id: i64, units: u32 },
    /// A restart was requested (settings change, crash recovery) and is
    /// waiting for the loop to reach a safe point.
    PendingRestart { session_id: i64, reason: String },
    /// The session was removed from the active set.
    SessionCompleted { session_id: i64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RecordKind {
    Observation(Observation),
    Summary(Summary),
    UserPrompt(UserPrompt),
}
