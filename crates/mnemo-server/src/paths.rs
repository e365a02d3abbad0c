// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Persisted state layout under a user-scoped data directory: the record
//! store database file, the vector index data directory, log files,
//! `settings.json`, and `worker.pid`.

use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct DataPaths {
    root: PathBuf,
}

impl DataPaths {
    /// `config_data_dir` takes precedence; otherwise resolves to the
    /// platform data directory (`~/.local/share/mnemod` on Linux).
    pub fn resolve(config_data_dir: Option<&str>) -> Self {
        let root = config_data_dir.map(PathBuf::from).unwrap_or_else(|| {
            dirs::data_dir().unwrap_or_else(|| PathBuf::from(".")).join("mnemod")
        });
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn settings_file(&self) -> PathBuf {
        self.root.join("settings.json")
    }

    pub fn pid_file(&self) -> PathBuf {
        self.root.join("worker.pid")
    }

    pub fn db_file(&self) -> PathBuf {
        self.root.join("mnemod.sqlite3")
    }

    pub fn vector_dir(&self) -> PathBuf {
        self.root.join("vector")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn ensure_root(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)
    }
}

/// `worker.pid` contents, written after `axum::serve` binds successfully so
/// the recorded port is race-free across platforms.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PidFile {
    pub pid: u32,
    pub port: u16,
    #[serde(rename = "startedAt")]
    pub started_at: i64,
}

impl PidFile {
    pub fn write(path: &Path, port: u16, started_at: i64) -> std::io::Result<()> {
        let body = Self { pid: std::process::id(), port, started_at };
        let json = serde_json::to_string_pretty(&body).expect("PidFile always serializes");
        std::fs::write(path, json)
    }
}
