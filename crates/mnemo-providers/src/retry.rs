// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Shared retry policy wrapping any [`ModelClient`]: exponential backoff on
//! transient errors, a single aggressive-truncation retry on context
//! overflow, and a one-shot resume-clear-and-retry on a terminal resume
//! error before escalating to the provider fallback chain.

use tokio::sync::watch;
use tracing::warn;

use mnemo_util::backoff::{Backoff, SleepOutcome};
use mnemo_util::truncation::aggressive_truncate;

use crate::client::{ModelClient, QueryOptions, QueryOutcome};
use crate::error::{ProviderError, Result};
use crate::message::Message;

/// Drive `client.query` to completion, applying the shared retry policy.
/// Returns `Ok(outcome)` with `outcome.skipped = true` when a context
/// overflow survives the aggressive-truncation retry, and `Err(Fatal(..))`
/// only once every retry avenue for this client has been exhausted — the
/// caller (the session processor) is then expected to advance to the next
/// provider in the fallback chain.
pub async fn query_with_retry(
    client: &dyn ModelClient,
    history: &[Message],
    new_user_message: &Message,
    mut options: QueryOptions,
    cancel: &mut watch::Receiver<bool>,
) -> Result<QueryOutcome> {
    let backoff = Backoff::provider_retry();
    let mut attempt = 0u32;
    let mut truncation_retried = false;
    let mut resume_cleared = false;
    let mut working_history = history.to_vec();

    loop {
        attempt += 1;
        match client.query(&working_history, new_user_message, options.clone(), cancel).await {
            Ok(outcome) => return Ok(outcome),
            Err(ProviderError::Transient(msg)) => {
                if attempt >= backoff.max_attempts() {
                    return Err(ProviderError::Fatal(format!("exhausted retries: {msg}")));
                }
                warn!(provider = client.name(), attempt, error = %msg, "transient provider error, retrying");
                if backoff.sleep(attempt, cancel).await == SleepOutcome::Cancelled {
                    return Err(ProviderError::Transient("cancelled during backoff".into()));
                }
            }
            Err(ProviderError::ContextOverflow(msg)) => {
                if truncation_retried {
                    warn!(provider = client.name(), "context overflow survived aggressive truncation, skipping item");
                    return Ok(QueryOutcome {
                        content: String::new(),
                        input_tokens: 0,
                        output_tokens: 0,
                        resume_token: options.resume_token.clone(),
                        memory_session_id: None,
                        skipped: true,
                    });
                }
                warn!(provider = client.name(), error = %msg, "context overflow, applying aggressive truncation");
                working_history = aggressive_truncate(&working_history, new_user_message);
                truncation_retried = true;
            }
            Err(ProviderError::TerminalResume(msg)) => {
                if resume_cleared {
                    return Err(ProviderError::Fatal(format!("resume handle still invalid after clearing: {msg}")));
                }
                warn!(provider = client.name(), error = %msg, "resume handle invalid, clearing and retrying fresh");
                options.resume_token = None;
                resume_cleared = true;
            }
            Err(err @ ProviderError::Fatal(_)) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    struct ScriptedClient {
        responses: Mutex<Vec<Result<QueryOutcome>>>,
        calls: AtomicU32,
    }

    fn ok_outcome() -> QueryOutcome {
        QueryOutcome {
            content: "done".into(),
            input_tokens: 10,
            output_tokens: 5,
            resume_token: Some("tok".into()),
            memory_session_id: None,
            skipped: false,
        }
    }

    #[async_trait]
    impl ModelClient for ScriptedClient {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn query(
            &self,
            _history: &[Message],
            _new_user_message: &Message,
            _options: QueryOptions,
            _cancel: &mut watch::Receiver<bool>,
        ) -> Result<QueryOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                panic!("scripted client exhausted");
            }
            responses.remove(0)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn transient_error_is_retried_until_success() {
        let client = ScriptedClient {
            responses: Mutex::new(vec![Err(ProviderError::Transient("503".into())), Ok(ok_outcome())]),
            calls: AtomicU32::new(0),
        };
        let (_tx, mut rx) = watch::channel(false);
        let outcome =
            query_with_retry(&client, &[], &Message::user("hi"), QueryOptions::default(), &mut rx).await.unwrap();
        assert_eq!(outcome.content, "done");
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn context_overflow_retried_once_then_skipped() {
        let client = ScriptedClient {
            responses: Mutex::new(vec![
                Err(ProviderError::ContextOverflow("too big".into())),
                Err(ProviderError::ContextOverflow("still too big".into())),
            ]),
            calls: AtomicU32::new(0),
        };
        let (_tx, mut rx) = watch::channel(false);
        let outcome =
            query_with_retry(&client, &[], &Message::user("hi"), QueryOptions::default(), &mut rx).await.unwrap();
        assert!(outcome.skipped);
    }

    #[tokio::test]
    async fn terminal_resume_cleared_once_then_fatal() {
        let client = ScriptedClient {
            responses: Mutex::new(vec![
                Err(ProviderError::TerminalResume("expired".into())),
                Err(ProviderError::TerminalResume("still expired".into())),
            ]),
            calls: AtomicU32::new(0),
        };
        let (_tx, mut rx) = watch::channel(false);
        let options = QueryOptions { resume_token: Some("stale".into()), existing_memory_session_id: None };
        let err = query_with_retry(&client, &[], &Message::user("hi"), options, &mut rx).await.unwrap_err();
        assert!(matches!(err, ProviderError::Fatal(_)));
    }

    #[tokio::test]
    async fn fatal_error_returns_immediately() {
        let client = ScriptedClient {
            responses: Mutex::new(vec![Err(ProviderError::Fatal("bad api key".into()))]),
            calls: AtomicU32::new(0),
        };
        let (_tx, mut rx) = watch::channel(false);
        let err =
            query_with_retry(&client, &[], &Message::user("hi"), QueryOptions::default(), &mut rx).await.unwrap_err();
        assert!(matches!(err, ProviderError::Fatal(_)));
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }
}
