// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "mnemod",
    about = "Local background worker that distills coding-assistant tool events into durable, searchable memory",
    version,
    long_about = None,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to settings.json (overrides the platform data dir default).
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v = debug, -vv = trace). Only takes effect when
    /// MNEMOD_LOG_FILE is also set or stderr is not the supervisor's pipe.
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the worker in the foreground: HTTP surface, session processors,
    /// and the background recovery/reaper/settings-watcher timers.
    ///
    /// This is the command the host launcher daemonizes. It runs until it
    /// receives Ctrl+C, SIGTERM, or a `/api/admin/shutdown` call.
    Serve {
        /// Override the port from settings.json.
        #[arg(long)]
        port: Option<u16>,
        /// Override the data directory from settings.json.
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },

    /// Query a running worker's `/api/status` and print the result.
    Status {
        /// Worker port to query (defaults to the port in settings.json).
        #[arg(long)]
        port: Option<u16>,
    },

    /// Print the effective configuration and exit.
    ShowConfig,
}
