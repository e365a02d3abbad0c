//! Shared truncation policy.
//!
//! Generic over the caller's message representation so `mnemo-providers`
//! (which owns the actual wire `Message` type) can reuse this without
//! `mnemo-util` depending back on it.

/// Minimal view a message must expose to participate in truncation.
pub trait TruncatableMessage {
    /// Rough token estimate for this message (4 chars/token is the default
    /// estimator callers use when a provider doesn't report exact counts).
    fn approx_tokens(&self) -> usize;

    /// True for the pinned init/continuation instruction message — identified
    /// by template markers in the prompt body, never dropped by truncation.
    fn is_pinned(&self) -> bool;
}

/// Chars-per-token used to estimate token counts when a provider hasn't
/// reported an exact count.
pub const CHARS_PER_TOKEN: usize = 4;

pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

#[derive(Debug, Clone, Copy)]
pub struct TruncationLimits {
    /// Hard cap on context tokens for the active model.
    pub max_tokens: u32,
    /// Maximum number of history messages kept before truncation triggers.
    pub message_cap: usize,
    /// Fraction of `max_tokens` at which truncation triggers (trigger i).
    pub trigger_fraction: f32,
}

impl Default for TruncationLimits {
    fn default() -> Self {
        Self { max_tokens: 150_000, message_cap: 200, trigger_fraction: 0.9 }
    }
}

impl TruncationLimits {
    pub fn effective_limit(&self) -> usize {
        (self.max_tokens as f32 * self.trigger_fraction) as usize
    }

    /// Decide whether truncation should run, per three triggers:
    /// (i) last reported input tokens ≥ 90% of max, (ii) history length
    /// exceeds the message cap, (iii) estimated token count exceeds the
    /// effective limit.
    pub fn should_truncate(&self, last_input_tokens: Option<u32>, history_len: usize, estimated_tokens: usize) -> bool {
        if let Some(last) = last_input_tokens {
            if (last as f32) >= (self.max_tokens as f32 * self.trigger_fraction) {
                return true;
            }
        }
        if history_len > self.message_cap {
            return true;
        }
        estimated_tokens > self.effective_limit()
    }
}

/// Keep the pinned message plus the most recent non-pinned messages that fit
/// under `limits.effective_limit()`, scanning from the newest backward.
///
/// The pinned message is never dropped, as long as it alone fits under the
/// effective limit — callers are expected to keep the pinned message small
/// enough that this always holds in practice.
pub fn truncate_keep_recent<M: Clone + TruncatableMessage>(messages: &[M], limits: &TruncationLimits) -> Vec<M> {
    let pinned: Vec<M> = messages.iter().filter(|m| m.is_pinned()).cloned().collect();
    let pinned_tokens: usize = pinned.iter().map(|m| m.approx_tokens()).sum();
    let budget = limits.effective_limit().saturating_sub(pinned_tokens);

    let mut kept_recent: Vec<M> = Vec::new();
    let mut used = 0usize;
    for m in messages.iter().rev().filter(|m| !m.is_pinned()) {
        let cost = m.approx_tokens();
        if used + cost > budget && !kept_recent.is_empty() {
            break;
        }
        used += cost;
        kept_recent.push(m.clone());
    }
    kept_recent.reverse();

    let mut out = pinned;
    out.extend(kept_recent);
    out
}

/// Single aggressive-truncation retry on context overflow: keep only the
/// pinned instruction plus the current user message.
pub fn aggressive_truncate<M: Clone + TruncatableMessage>(messages: &[M], current_user_message: &M) -> Vec<M> {
    let mut out: Vec<M> = messages.iter().filter(|m| m.is_pinned()).cloned().collect();
    out.push(current_user_message.clone());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone)]
    struct Msg {
        tokens: usize,
        pinned: bool,
    }

    impl TruncatableMessage for Msg {
        fn approx_tokens(&self) -> usize {
            self.tokens
        }
        fn is_pinned(&self) -> bool {
            self.pinned
        }
    }

    fn msg(tokens: usize) -> Msg {
        Msg { tokens, pinned: false }
    }

    fn pinned(tokens: usize) -> Msg {
        Msg { tokens, pinned: true }
    }

    #[test]
    fn estimate_tokens_rounds_up() {
        assert_eq!(estimate_tokens("12345678"), 2);
        assert_eq!(estimate_tokens("123456789"), 3);
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn should_truncate_on_last_input_tokens_trigger() {
        let limits = TruncationLimits { max_tokens: 100, message_cap: 1000, trigger_fraction: 0.9 };
        assert!(limits.should_truncate(Some(90), 0, 0));
        assert!(!limits.should_truncate(Some(89), 0, 0));
    }

    #[test]
    fn should_truncate_on_message_cap_trigger() {
        let limits = TruncationLimits { max_tokens: 1_000_000, message_cap: 5, trigger_fraction: 0.9 };
        assert!(limits.should_truncate(None, 6, 0));
        assert!(!limits.should_truncate(None, 5, 0));
    }

    #[test]
    fn should_truncate_on_estimated_tokens_trigger() {
        let limits = TruncationLimits { max_tokens: 100, message_cap: 1000, trigger_fraction: 0.9 };
        assert!(limits.should_truncate(None, 0, 91));
        assert!(!limits.should_truncate(None, 0, 90));
    }

    #[test]
    fn truncate_keep_recent_never_drops_pinned() {
        let limits = TruncationLimits { max_tokens: 20, message_cap: 1000, trigger_fraction: 1.0 };
        let messages = vec![pinned(5), msg(100), msg(100)];
        let kept = truncate_keep_recent(&messages, &limits);
        assert!(kept.iter().any(|m| m.pinned));
    }

    #[test]
    fn truncate_keep_recent_keeps_newest_first() {
        let limits = TruncationLimits { max_tokens: 20, message_cap: 1000, trigger_fraction: 1.0 };
        let messages = vec![pinned(2), msg(3), msg(4), msg(5)];
        let kept = truncate_keep_recent(&messages, &limits);
        // budget = 20 - 2 = 18; newest-first greedily fits all three (3+4+5=12)
        assert_eq!(kept.len(), 4);
    }

    #[test]
    fn truncate_keep_recent_always_keeps_at_least_one_recent_message() {
        let limits = TruncationLimits { max_tokens: 1, message_cap: 1000, trigger_fraction: 1.0 };
        let messages = vec![msg(1000)];
        let kept = truncate_keep_recent(&messages, &limits);
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn aggressive_truncate_keeps_only_pinned_and_current_user() {
        let history = vec![pinned(1), msg(2), msg(3), msg(4)];
        let current = msg(5);
        let out = aggressive_truncate(&history, &current);
        assert_eq!(out.len(), 2);
        assert!(out[0].pinned);
        assert_eq!(out[1].tokens, 5);
    }
}
