//! Settings schema for `settings.json`.
//!
//! `settings.json` is documented as "a flat key/value map of configuration,
//! migrated in place from any legacy nested schema" — `Config` is the
//! flattened shape; [`crate::loader::migrate_legacy`] handles the nested
//! form some older installs may still carry.

use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

/// Which of the three provider clients is currently active.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Native SDK-style client (supports rollover + terminal-resume recovery).
    Native,
    Gemini,
    /// Any OpenAI-compatible REST endpoint (local proxy, LiteLLM, etc).
    OpenAiCompat,
}

impl ProviderKind {
    /// Fallback order on `FatalProviderError`.
    pub fn fallback_chain() -> [ProviderKind; 3] {
        [ProviderKind::Native, ProviderKind::Gemini, ProviderKind::OpenAiCompat]
    }

    pub fn next_fallback(self) -> Option<ProviderKind> {
        let chain = Self::fallback_chain();
        let idx = chain.iter().position(|p| *p == self)?;
        chain.get(idx + 1).copied()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderKind,
    #[serde(default = "default_model")]
    pub model: String,
    /// Environment variable name holding the active provider's API key.
    pub api_key_env: Option<String>,
    /// Custom base URL override (required for most `openai_compat` setups).
    pub base_url: Option<String>,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub vector: VectorConfig,
    #[serde(default)]
    pub recovery: RecoveryConfig,
    /// Per-provider credential env-var overrides, keyed by [`ProviderKind`]'s
    /// serde name, used by the fallback chain to check credential presence
    /// for providers other than the currently active one.
    #[serde(default)]
    pub provider_credentials: std::collections::HashMap<String, String>,
    /// Optional batch-iterator mode for the session processor, shipped
    /// disabled by default.
    #[serde(default)]
    pub batching_enabled: bool,
}

impl Default for ProviderKind {
    fn default() -> Self {
        ProviderKind::Native
    }
}

fn default_model() -> String {
    "default".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            model: default_model(),
            api_key_env: None,
            base_url: None,
            server: ServerConfig::default(),
            vector: VectorConfig::default(),
            recovery: RecoveryConfig::default(),
            provider_credentials: Default::default(),
            batching_enabled: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// Localhost-bound HTTP port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// User-scoped data directory holding the database, vector index, logs,
    /// and `worker.pid`. `None` resolves to the platform data dir at runtime.
    pub data_dir: Option<String>,
    /// Queue-wait idle timeout before an explicit cancel is triggered.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Threshold after which a `processing` queue row is considered stuck
    /// by `reset_stuck`.
    #[serde(default = "default_stuck_threshold_secs")]
    pub stuck_threshold_secs: u64,
    /// Per-pass cap on sessions started by the periodic recovery timer.
    #[serde(default = "default_recovery_cap")]
    pub recovery_cap: usize,
    /// Fixed stagger delay between restarts during a settings hot-reload,
    /// applied by `schedule_restarts_for_settings_change`.
    #[serde(default = "default_restart_stagger_ms")]
    pub restart_stagger_ms: u64,
}

fn default_port() -> u16 {
    0
}
fn default_idle_timeout_secs() -> u64 {
    180
}
fn default_stuck_threshold_secs() -> u64 {
    300
}
fn default_recovery_cap() -> usize {
    10
}
fn default_restart_stagger_ms() -> u64 {
    2_000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            data_dir: None,
            idle_timeout_secs: default_idle_timeout_secs(),
            stuck_threshold_secs: default_stuck_threshold_secs(),
            recovery_cap: default_recovery_cap(),
            restart_stagger_ms: default_restart_stagger_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorConfig {
    /// Base URL of the child embedding server, once started.
    pub embedding_base_url: Option<String>,
    /// Shell command used to spawn the embedding server when a heartbeat
    /// against `embedding_base_url` fails. `None` means the server is assumed
    /// to be externally managed: the worker only ever discovers it, never
    /// spawns or kills it.
    pub embedding_command: Option<String>,
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,
    #[serde(default = "default_health_interval_secs")]
    pub health_interval_secs: u64,
    #[serde(default = "default_restart_backoff_min_secs")]
    pub restart_backoff_min_secs: u64,
    #[serde(default = "default_restart_backoff_max_secs")]
    pub restart_backoff_max_secs: u64,
    #[serde(default = "default_circuit_breaker_threshold")]
    pub circuit_breaker_threshold: u32,
    /// Maximum source items retained per collection.
    #[serde(default = "default_retention_max_items")]
    pub retention_max_items: usize,
    #[serde(default = "default_true")]
    pub maintenance_enabled: bool,
}

fn default_startup_timeout_secs() -> u64 {
    30
}
fn default_health_interval_secs() -> u64 {
    10
}
fn default_restart_backoff_min_secs() -> u64 {
    1
}
fn default_restart_backoff_max_secs() -> u64 {
    30
}
fn default_circuit_breaker_threshold() -> u32 {
    3
}
fn default_retention_max_items() -> usize {
    5_000
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            embedding_base_url: None,
            embedding_command: None,
            startup_timeout_secs: default_startup_timeout_secs(),
            health_interval_secs: default_health_interval_secs(),
            restart_backoff_min_secs: default_restart_backoff_min_secs(),
            restart_backoff_max_secs: default_restart_backoff_max_secs(),
            circuit_breaker_threshold: default_circuit_breaker_threshold(),
            retention_max_items: default_retention_max_items(),
            maintenance_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecoveryConfig {
    /// Periodic recovery timer interval (default 5 min, minimum 1 min).
    #[serde(default = "default_recovery_interval_secs")]
    pub interval_secs: u64,
    /// Orphan-subprocess reaper interval (default 5 min).
    #[serde(default = "default_reaper_interval_secs")]
    pub reaper_interval_secs: u64,
}

fn default_recovery_interval_secs() -> u64 {
    300
}
fn default_reaper_interval_secs() -> u64 {
    300
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_recovery_interval_secs(),
            reaper_interval_secs: default_reaper_interval_secs(),
        }
    }
}

impl RecoveryConfig {
    /// Clamp a configured interval to the documented 1-minute floor.
    pub fn effective_interval_secs(&self) -> u64 {
        self.interval_secs.max(60)
    }
}

/// Restart-trigger keys: changing any of these causes
/// `schedule_restarts_for_settings_change` to fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartTrigger {
    Provider,
    Model,
    Credentials,
    BaseUrl,
}

impl Config {
    /// Diff against a previous snapshot, returning which restart-trigger
    /// keys changed. Order is stable for deterministic logging.
    pub fn diff_restart_triggers(&self, previous: &Config) -> Vec<RestartTrigger> {
        let mut out = Vec::new();
        if self.provider != previous.provider {
            out.push(RestartTrigger::Provider);
        }
        if self.model != previous.model {
            out.push(RestartTrigger::Model);
        }
        if self.api_key_env != previous.api_key_env {
            out.push(RestartTrigger::Credentials);
        }
        if self.base_url != previous.base_url {
            out.push(RestartTrigger::BaseUrl);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_native_provider() {
        assert_eq!(Config::default().provider, ProviderKind::Native);
    }

    #[test]
    fn fallback_chain_order_is_native_gemini_openai() {
        assert_eq!(
            ProviderKind::fallback_chain(),
            [ProviderKind::Native, ProviderKind::Gemini, ProviderKind::OpenAiCompat]
        );
    }

    #[test]
    fn next_fallback_follows_chain_then_ends() {
        assert_eq!(ProviderKind::Native.next_fallback(), Some(ProviderKind::Gemini));
        assert_eq!(ProviderKind::Gemini.next_fallback(), Some(ProviderKind::OpenAiCompat));
        assert_eq!(ProviderKind::OpenAiCompat.next_fallback(), None);
    }

    #[test]
    fn diff_restart_triggers_detects_provider_change() {
        let a = Config::default();
        let mut b = Config::default();
        b.provider = ProviderKind::Gemini;
        assert_eq!(a.diff_restart_triggers(&b), vec![RestartTrigger::Provider]);
    }

    #[test]
    fn diff_restart_triggers_empty_when_unchanged() {
        let a = Config::default();
        let b = Config::default();
        assert!(a.diff_restart_triggers(&b).is_empty());
    }

    #[test]
    fn diff_restart_triggers_detects_multiple_changes() {
        let a = Config::default();
        let mut b = Config::default();
        b.model = "other".into();
        b.base_url = Some("http://x".into());
        let triggers = a.diff_restart_triggers(&b);
        assert_eq!(triggers.len(), 2);
        assert!(triggers.contains(&RestartTrigger::Model));
        assert!(triggers.contains(&RestartTrigger::BaseUrl));
    }

    #[test]
    fn recovery_interval_is_clamped_to_one_minute_floor() {
        let cfg = RecoveryConfig { interval_secs: 10, reaper_interval_secs: 300 };
        assert_eq!(cfg.effective_interval_secs(), 60);
    }

    #[test]
    fn serde_roundtrip_preserves_all_fields() {
        let cfg = Config {
            provider: ProviderKind::OpenAiCompat,
            base_url: Some("http://localhost:11434/v1".into()),
            ..Config::default()
        };
        let json = serde_json::to_string(&cfg).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg, back);
    }
}
