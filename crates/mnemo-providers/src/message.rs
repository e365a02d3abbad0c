// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Wire-agnostic conversation message, shared across all three clients.

use serde::{Deserialize, Serialize};

use mnemo_util::{estimate_tokens, TruncatableMessage};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Template markers identifying the init/continuation instruction prompt. A
/// message whose text starts with either marker is "pinned" and never
/// dropped by truncation.
pub const PINNED_INIT_MARKER: &str = "[[mnemod:init]]";
pub const PINNED_CONTINUATION_MARKER: &str = "[[mnemod:continuation]]";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub text: String,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self { role: Role::System, text: text.into() }
    }
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Role::User, text: text.into() }
    }
    pub fn assistant(text: impl Into<String>) -> Self {
        Self { role: Role::Assistant, text: text.into() }
    }

    pub fn pinned_init(text: impl Into<String>) -> Self {
        Self { role: Role::System, text: format!("{PINNED_INIT_MARKER}\n{}", text.into()) }
    }

    pub fn pinned_continuation(text: impl Into<String>) -> Self {
        Self { role: Role::System, text: format!("{PINNED_CONTINUATION_MARKER}\n{}", text.into()) }
    }
}

impl TruncatableMessage for Message {
    fn approx_tokens(&self) -> usize {
        estimate_tokens(&self.text)
    }

    fn is_pinned(&self) -> bool {
        self.text.starts_with(PINNED_INIT_MARKER) || self.text.starts_with(PINNED_CONTINUATION_MARKER)
    }
}
