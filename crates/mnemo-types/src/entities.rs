//! Core persisted entities.
//!
//! These are plain data — no behavior beyond simple accessors. The record
//! store (`mnemo-store`) is the only thing that creates, mutates, or deletes
//! them; every other crate treats them as read-only values.

use serde::{Deserialize, Serialize};

/// One host "conversation". Created on first host event for a given
/// `content_session_id`; mutated by the processor; never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub session_id: i64,
    /// Opaque, host-assigned identifier used only to look up the session.
    /// Never written into provider transcripts.
    pub content_session_id: String,
    /// Stable foreign-key identity for observations/summaries. Assigned
    /// lazily on first provider response; never changed afterward.
    pub memory_session_id: Option<String>,
    /// Provider-side handle used to continue a multi-turn conversation.
    /// May be cleared by rollover without touching `memory_session_id`.
    pub provider_resume_token: Option<String>,
    pub project: String,
    pub last_input_tokens: Option<u32>,
    pub last_prompt_number: i64,
}

impl Session {
    /// True once a `memory_session_id` has been assigned.
    pub fn has_memory_session(&self) -> bool {
        self.memory_session_id.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserPrompt {
    pub id: i64,
    pub content_session_id: String,
    pub prompt_number: i64,
    /// Scrubbed of privacy markers before this struct is ever constructed.
    pub text: String,
    pub created_at_epoch: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ObservationType {
    Discovery,
    Decision,
    Bugfix,
    Refactor,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Observation {
    pub id: i64,
    pub memory_session_id: String,
    pub project: String,
    #[serde(rename = "type")]
    pub kind: ObservationType,
    pub title: String,
    pub subtitle: Option<String>,
    pub narrative: Option<String>,
    pub facts: Vec<String>,
    pub concepts: Vec<String>,
    pub files_read: Vec<String>,
    pub files_modified: Vec<String>,
    pub prompt_number: i64,
    pub discovery_tokens: i64,
    pub created_at_epoch: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Summary {
    pub id: i64,
    pub memory_session_id: String,
    pub project: String,
    pub request: String,
    pub investigated: String,
    pub learned: String,
    pub completed: String,
    pub next_steps: String,
    pub notes: Option<String>,
    pub prompt_number: i64,
    pub discovery_tokens: i64,
    pub created_at_epoch: i64,
}

impl Summary {
    /// The up-to-six non-empty fields, paired with the field name used in the
    /// vector document id (`summary_<id>_<field>`).
    pub fn non_empty_fields(&self) -> Vec<(&'static str, &str)> {
        let mut out = Vec::with_capacity(6);
        let mut push = |name: &'static str, v: &str| {
            if !v.trim().is_empty() {
                out.push((name, v));
            }
        };
        push("request", &self.request);
        push("investigated", &self.investigated);
        push("learned", &self.learned);
        push("completed", &self.completed);
        push("next_steps", &self.next_steps);
        if let Some(notes) = &self.notes {
            push("notes", notes);
        }
        out
    }
}

/// Queue row status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PendingStatus {
    Pending,
    Processing,
    Processed,
    Failed,
    Abandoned,
}

/// What a queued message asks the session processor to do.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessagePayload {
    /// A single tool-use event to be distilled into observations.
    ToolObservation {
        tool_name: String,
        tool_input: serde_json::Value,
        tool_response: serde_json::Value,
    },
    /// A request to summarize the turn that just completed.
    Summarize { last_assistant_message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingMessage {
    pub id: i64,
    pub session_id: i64,
    pub content_session_id: String,
    pub payload: MessagePayload,
    pub status: PendingStatus,
    pub attempt_count: i32,
    pub created_at_epoch: i64,
    pub claimed_at_epoch: Option<i64>,
    pub cwd: String,
}

/// Maximum retries before a failed row is abandoned rather than re-claimed.
pub const MAX_ATTEMPT_COUNT: i32 = 5;
