// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod backoff;
pub mod privacy;
pub mod truncation;
pub mod url;

pub use backoff::{Backoff, SleepOutcome};
pub use privacy::{is_entirely_private, is_json_entirely_private, scrub, scrub_json};
pub use truncation::{aggressive_truncate, estimate_tokens, truncate_keep_recent, TruncatableMessage, TruncationLimits};
