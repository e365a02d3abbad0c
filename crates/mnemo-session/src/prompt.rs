// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Builds the instruction message that opens a session's conversation
//! history and the per-item user message for each queued payload.

use mnemo_providers::Message;
use mnemo_types::MessagePayload;

const RESPONSE_SCHEMA: &str = r#"Respond only with XML. For each noteworthy thing you learn, emit:
<observation>
  <type>discovery|decision|bugfix|refactor|other</type>
  <title>short title</title>
  <subtitle>optional subtitle</subtitle>
  <narrative>optional prose</narrative>
  <fact>repeatable, zero or more</fact>
  <concept>repeatable, zero or more</concept>
  <file_read>repeatable, zero or more</file_read>
  <file_modified>repeatable, zero or more</file_modified>
</observation>
Emit zero observations if nothing is worth recording."#;

const SUMMARY_SCHEMA: &str = r#"Respond only with XML:
<summary>
  <request>what the user asked for</request>
  <investigated>what you looked at</investigated>
  <learned>what you learned</learned>
  <completed>what got done</completed>
  <next_steps>what remains</next_steps>
  <notes>optional free-form notes</notes>
</summary>"#;

/// The pinned system message that opens a session's conversation history.
/// `is_continuation` distinguishes a brand-new session (first provider call
/// ever made for it) from a processor loop restarting against a session
/// that already has a `memory_session_id`.
pub fn build_instruction_message(project: &str, first_prompt: &str, is_continuation: bool) -> Message {
    let body = format!(
        "You are distilling tool-use events from a coding assistant session in project \"{project}\" \
         into structured, searchable memory. The user's request for this session was:\n\n{first_prompt}\n\n\
         You will receive one tool event or summarize request at a time. {RESPONSE_SCHEMA}\n\n{SUMMARY_SCHEMA}"
    );
    if is_continuation {
        Message::pinned_continuation(body)
    } else {
        Message::pinned_init(body)
    }
}

/// The per-item user message delivered to the provider for one queued
/// payload.
pub fn build_item_message(payload: &MessagePayload) -> Message {
    match payload {
        MessagePayload::ToolObservation { tool_name, tool_input, tool_response } => Message::user(format!(
            "Tool: {tool_name}\nInput: {}\nResponse: {}\n\nEmit zero or more <observation> elements for anything worth recording.",
            tool_input, tool_response
        )),
        MessagePayload::Summarize { last_assistant_message } => Message::user(format!(
            "The turn just completed. Last assistant message:\n{last_assistant_message}\n\n\
             Emit one <summary> element."
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instruction_message_is_pinned_init_for_new_session() {
        let msg = build_instruction_message("proj", "hello", false);
        assert!(mnemo_util::TruncatableMessage::is_pinned(&msg));
    }

    #[test]
    fn instruction_message_is_pinned_continuation_for_restart() {
        let msg = build_instruction_message("proj", "hello", true);
        assert!(msg.text.starts_with(mnemo_providers::PINNED_CONTINUATION_MARKER));
    }

    #[test]
    fn item_message_for_tool_observation_includes_tool_name() {
        let payload = MessagePayload::ToolObservation {
            tool_name: "Write".into(),
            tool_input: serde_json::json!({"file_path": "a.md"}),
            tool_response: serde_json::json!({"ok": true}),
        };
        let msg = build_item_message(&payload);
        assert!(msg.text.contains("Write"));
    }
}
