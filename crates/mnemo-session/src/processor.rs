// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The per-session processor loop: claim → build prompt → call
//! provider with retry → parse/write → repeat, with idle-timeout,
//! cooperative-stop, provider fallback, and crash-recovery restart.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch, Notify};
use tracing::{debug, info, warn};

use mnemo_config::{Config, ProviderKind};
use mnemo_providers::{build_client, query_with_retry, ModelClient, ProviderError, QueryOptions};
use mnemo_queue::DurableQueue;
use mnemo_store::RecordStore;
use mnemo_types::SessionEvent;
use mnemo_util::backoff::Backoff;
use mnemo_util::truncation::{truncate_keep_recent, TruncatableMessage, TruncationLimits};
use mnemo_vector::VectorIndex;
use mnemo_writer::WriteRequest;

use crate::error::Result;
use crate::prompt::{build_instruction_message, build_item_message};
use crate::state::{ProcessorStatus, SharedState};

/// Everything a processor loop needs that is shared across the whole
/// worker, independent of any one session.
#[derive(Clone)]
pub struct ProcessorDeps {
    pub store: Arc<RecordStore>,
    pub queue: Arc<DurableQueue>,
    pub vector: Arc<dyn VectorIndex>,
}

/// Why one generation of the inner loop returned.
enum LoopExit {
    /// Cooperative stop: either a true shutdown or a settings-triggered
    /// restart (check `shared.take_pending_restart()` to tell them apart).
    Stopped,
    /// Every provider in the fallback chain was exhausted; the session's
    /// pending work has already been marked abandoned.
    FatalAbandoned,
    /// An unexpected store/queue error. The supervisor resets processing
    /// rows back to pending and retries with backoff.
    Crashed(crate::error::SessionError),
}

fn provider_has_credentials(kind: ProviderKind, config: &Config) -> bool {
    if kind == config.provider {
        return config.api_key_env.as_ref().is_some_and(|v| std::env::var(v).is_ok());
    }
    let serde_name = match kind {
        ProviderKind::Native => "native",
        ProviderKind::Gemini => "gemini",
        ProviderKind::OpenAiCompat => "openai_compat",
    };
    config.provider_credentials.get(serde_name).is_some_and(|v| std::env::var(v).is_ok())
}

/// Spawns the supervisor task for one session and returns its join handle.
/// `cancel_rx` is this session's single cancellation token for its entire
/// lifetime — it is only ever fired by `SessionManager::delete_session` or
/// worker shutdown, never reused across "generations" since settings-change
/// restarts are driven by `shared.pending_restart` instead (see DESIGN.md).
pub fn spawn(
    deps: ProcessorDeps,
    session_id: i64,
    content_session_id: String,
    project: String,
    initial_config: Config,
    mut cancel_rx: watch::Receiver<bool>,
    events_tx: broadcast::Sender<SessionEvent>,
    shared: Arc<SharedState>,
    wake: Arc<Notify>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut config = initial_config;
        let mut crash_attempt: u32 = 0;

        loop {
            shared.set_status(ProcessorStatus::Starting);
            let exit = run_generation(
                &deps,
                session_id,
                &content_session_id,
                &project,
                &config,
                &mut cancel_rx,
                &events_tx,
                &shared,
                &wake,
            )
            .await;

            match exit {
                LoopExit::Stopped => {
                    if let Some(pending) = shared.take_pending_restart() {
                        info!(session_id, reason = %pending.reason, "restarting session processor for settings change");
                        let _ = deps.queue.reset_processing_to_pending(session_id);
                        crash_attempt = 0;
                        continue;
                    }
                    shared.set_status(ProcessorStatus::Terminated);
                    break;
                }
                LoopExit::FatalAbandoned => {
                    let _ = events_tx.send(SessionEvent::SessionCompleted { session_id });
                    shared.set_status(ProcessorStatus::Terminated);
                    break;
                }
                LoopExit::Crashed(err) => {
                    crash_attempt += 1;
                    warn!(session_id, attempt = crash_attempt, error = %err, "session processor crashed, scheduling recovery");
                    shared.recovery_in_progress.store(true, std::sync::atomic::Ordering::SeqCst);
                    let _ = deps.queue.reset_processing_to_pending(session_id);
                    let backoff = Backoff::provider_retry();
                    backoff.sleep(crash_attempt.min(backoff.max_attempts()), &mut cancel_rx).await;
                    shared.recovery_in_progress.store(false, std::sync::atomic::Ordering::SeqCst);
                    if *cancel_rx.borrow() {
                        shared.set_status(ProcessorStatus::Terminated);
                        break;
                    }
                    continue;
                }
            }
        }

        shared.set_status(ProcessorStatus::Terminated);
    })
}

#[allow(clippy::too_many_arguments)]
async fn run_generation(
    deps: &ProcessorDeps,
    session_id: i64,
    content_session_id: &str,
    project: &str,
    config: &Config,
    cancel_rx: &mut watch::Receiver<bool>,
    events_tx: &broadcast::Sender<SessionEvent>,
    shared: &Arc<SharedState>,
    wake: &Arc<Notify>,
) -> LoopExit {
    match run_generation_inner(deps, session_id, content_session_id, project, config, cancel_rx, events_tx, shared, wake).await {
        Ok(exit) => exit,
        Err(err) => LoopExit::Crashed(err),
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_generation_inner(
    deps: &ProcessorDeps,
    session_id: i64,
    content_session_id: &str,
    project: &str,
    config: &Config,
    cancel_rx: &mut watch::Receiver<bool>,
    events_tx: &broadcast::Sender<SessionEvent>,
    shared: &Arc<SharedState>,
    wake: &Arc<Notify>,
) -> Result<LoopExit> {
    let session = deps.store.get_session_by_id(session_id)?.ok_or(crate::error::SessionError::MissingSession(session_id))?;
    let first_prompt = deps.store.get_latest_user_prompt(content_session_id)?.map(|p| p.text).unwrap_or_default();
    let is_continuation = session.has_memory_session();

    let mut provider_kind = config.provider;
    shared.set_current_provider(provider_kind);
    let mut client: Arc<dyn ModelClient> = build_client(provider_kind, config);
    let mut history = vec![build_instruction_message(project, &first_prompt, is_continuation)];
    let limits = TruncationLimits::default();
    let idle_timeout = Duration::from_secs(config.server.idle_timeout_secs);

    loop {
        if *cancel_rx.borrow() {
            shared.set_status(ProcessorStatus::Stopping);
            return Ok(LoopExit::Stopped);
        }
        if shared.pending_restart.lock().expect("poisoned").is_some() && shared.is_idle() {
            shared.set_status(ProcessorStatus::Stopping);
            return Ok(LoopExit::Stopped);
        }

        let claimed = deps.queue.claim(session_id)?;
        let Some(message) = claimed else {
            shared.mark_idle();
            let _ = events_tx.send(SessionEvent::Idle { session_id });
            tokio::select! {
                _ = wake.notified() => continue,
                _ = cancel_rx.changed() => continue,
                _ = tokio::time::sleep(idle_timeout) => {
                    debug!(session_id, "idle timeout elapsed, nothing to cancel, waiting for more work");
                    continue;
                }
            }
        };

        shared.mark_busy();
        let _ = events_tx.send(SessionEvent::Busy { session_id, units: 1 });

        let session_row = deps.store.get_session_by_id(session_id)?.ok_or(crate::error::SessionError::MissingSession(session_id))?;

        if client.supports_resume() {
            if let Some(last) = session_row.last_input_tokens {
                if (last as f32) >= limits.max_tokens as f32 * limits.trigger_fraction {
                    info!(session_id, "rollover: clearing resume token and history after high token usage");
                    deps.store.update_provider_resume_token(session_id, None)?;
                    deps.store.update_last_input_tokens(session_id, None)?;
                    history = vec![build_instruction_message(project, &first_prompt, true)];
                }
            }
        }

        let user_message = build_item_message(&message.payload);
        let estimated: usize = history.iter().map(|m| m.approx_tokens()).sum();
        if limits.should_truncate(session_row.last_input_tokens, history.len(), estimated) {
            history = truncate_keep_recent(&history, &limits);
        }

        let options = QueryOptions {
            resume_token: session_row.provider_resume_token.clone(),
            existing_memory_session_id: session_row.memory_session_id.clone(),
        };

        let outcome = match call_with_fallback(deps, config, &mut provider_kind, &mut client, &history, &user_message, options, cancel_rx, shared).await {
            FallbackOutcome::Ok(outcome) => outcome,
            FallbackOutcome::Abandon => {
                deps.queue.mark_all_session_abandoned(session_id)?;
                return Ok(LoopExit::FatalAbandoned);
            }
            FallbackOutcome::Reset => {
                // The claimed message is still `processing`; put it back to
                // `pending` so it is the first thing the new provider claims
                // next, preserving per-session FIFO order across the switch.
                deps.queue.reset_processing_to_pending(session_id)?;
                history = vec![build_instruction_message(project, &first_prompt, true)];
                continue;
            }
        };

        deps.store.update_last_input_tokens(session_id, Some(outcome.input_tokens))?;
        if let Some(token) = outcome.resume_token.as_deref() {
            deps.store.update_provider_resume_token(session_id, Some(token))?;
        }
        let memory_session_id = match (&session_row.memory_session_id, &outcome.memory_session_id) {
            (Some(existing), _) => existing.clone(),
            (None, Some(fresh)) => {
                deps.store.update_memory_session_id(session_id, fresh)?;
                fresh.clone()
            }
            (None, None) => {
                warn!(session_id, "provider reply carried no memory_session_id and none was assigned yet, skipping write");
                deps.queue.mark_failed(message.id)?;
                shared.mark_idle();
                continue;
            }
        };

        let raw_xml = if outcome.skipped { "" } else { outcome.content.as_str() };
        let write_req = WriteRequest {
            memory_session_id,
            project: project.to_string(),
            message_id: Some(message.id),
            prompt_number: session_row.last_prompt_number.max(1),
            discovery_tokens: outcome.output_tokens as i64,
        };
        mnemo_writer::write_response(&deps.store, &deps.queue, deps.vector.clone(), events_tx, session_id, write_req, raw_xml)
            .await?;

        history.push(user_message);
        if !outcome.skipped {
            history.push(mnemo_providers::Message::assistant(outcome.content));
        }
    }
}

enum FallbackOutcome {
    Ok(mnemo_providers::QueryOutcome),
    /// Switched providers; caller should reset its history to a fresh
    /// continuation prompt before retrying the same item.
    Reset,
    Abandon,
}

/// Drives one item through `query_with_retry`; on a `Fatal` error, walks the
/// provider fallback chain looking for a candidate with credentials. The
/// item itself is not retried here — a `Reset` tells the caller to rebuild
/// its loop-local history, reset the claimed message back to `pending` (see
/// the `Reset` arm above), and `continue`, so the same item is the first
/// thing the new provider claims and per-session FIFO order holds across
/// the switch.
#[allow(clippy::too_many_arguments)]
async fn call_with_fallback(
    deps: &ProcessorDeps,
    config: &Config,
    provider_kind: &mut ProviderKind,
    client: &mut Arc<dyn ModelClient>,
    history: &[mnemo_providers::Message],
    user_message: &mnemo_providers::Message,
    options: QueryOptions,
    cancel_rx: &mut watch::Receiver<bool>,
    shared: &Arc<SharedState>,
) -> FallbackOutcome {
    let _ = deps;
    match query_with_retry(client.as_ref(), history, user_message, options, cancel_rx).await {
        Ok(outcome) => FallbackOutcome::Ok(outcome),
        Err(ProviderError::Fatal(msg)) => {
            warn!(provider = client.name(), error = %msg, "fatal provider error, searching fallback chain");
            let mut candidate = provider_kind.next_fallback();
            while let Some(next) = candidate {
                if provider_has_credentials(next, config) {
                    info!(from = ?provider_kind, to = ?next, "falling back to next provider");
                    *provider_kind = next;
                    *client = build_client(next, config);
                    shared.set_current_provider(next);
                    return FallbackOutcome::Reset;
                }
                candidate = next.next_fallback();
            }
            warn!("no fallback provider has credentials, abandoning session");
            FallbackOutcome::Abandon
        }
        Err(other) => {
            warn!(provider = client.name(), error = %other, "provider call failed after retry policy exhausted");
            FallbackOutcome::Abandon
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemo_config::ProviderKind;

    #[test]
    fn provider_has_credentials_checks_active_provider_env_var() {
        let mut config = Config::default();
        config.provider = ProviderKind::Native;
        config.api_key_env = Some("MNEMOD_SESSION_TEST_KEY".into());
        assert!(!provider_has_credentials(ProviderKind::Native, &config));
        std::env::set_var("MNEMOD_SESSION_TEST_KEY", "x");
        assert!(provider_has_credentials(ProviderKind::Native, &config));
        std::env::remove_var("MNEMOD_SESSION_TEST_KEY");
    }

    #[test]
    fn provider_has_credentials_checks_credentials_map_for_other_providers() {
        let mut config = Config::default();
        config.provider = ProviderKind::Native;
        config.provider_credentials.insert("gemini".into(), "MNEMOD_SESSION_TEST_GEMINI".into());
        assert!(!provider_has_credentials(ProviderKind::Gemini, &config));
        std::env::set_var("MNEMOD_SESSION_TEST_GEMINI", "x");
        assert!(provider_has_credentials(ProviderKind::Gemini, &config));
        std::env::remove_var("MNEMOD_SESSION_TEST_GEMINI");
    }
}
