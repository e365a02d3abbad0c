//! Settings hot-reload watcher.
//!
//! Polls `settings.json`'s modification time; on change, reloads and diffs
//! against the cached snapshot. The orchestrator decides what to do with the
//! returned triggers (usually `schedule_restarts_for_settings_change`).

use std::path::PathBuf;
use std::time::SystemTime;

use tracing::{debug, warn};

use crate::loader;
use crate::schema::{Config, RestartTrigger};

pub struct SettingsWatcher {
    path: PathBuf,
    last_mtime: Option<SystemTime>,
    last_config: Config,
}

impl SettingsWatcher {
    pub fn new(path: PathBuf, initial: Config) -> Self {
        let last_mtime = std::fs::metadata(&path).and_then(|m| m.modified()).ok();
        Self { path, last_mtime, last_config: initial }
    }

    pub fn current(&self) -> &Config {
        &self.last_config
    }

    /// Check the file's mtime; if changed, reload and diff. Returns `None`
    /// when nothing changed, `Some((new_config, triggers))` otherwise — even
    /// when `triggers` is empty (a file touch with no semantic change).
    pub fn poll(&mut self) -> Option<(Config, Vec<RestartTrigger>)> {
        let mtime = std::fs::metadata(&self.path).and_then(|m| m.modified()).ok();
        if mtime == self.last_mtime {
            return None;
        }
        self.last_mtime = mtime;

        let new_config = match loader::load(&self.path) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!(error = %e, path = %self.path.display(), "settings file changed but failed to parse; keeping previous config");
                return None;
            }
        };

        let triggers = new_config.diff_restart_triggers(&self.last_config);
        debug!(?triggers, "settings file changed");
        self.last_config = new_config.clone();
        Some((new_config, triggers))
    }
}
