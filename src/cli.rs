// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use clap::Parser;

/// Single-host coding-assistant backend.
#[derive(Parser, Debug)]
#[command(name = "forge-server", version, about)]
pub struct Cli {
    /// Path to the config file. Defaults to `~/.config/forge/config.yaml`.
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Address to bind the HTTP/WebSocket gateway to.
    #[arg(long, default_value = "127.0.0.1:7420")]
    pub listen: String,

    /// Root directory for session snapshots and journals. Defaults to
    /// `~/.local/share/forge/sessions`.
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Enable verbose (debug-level) logging on stderr.
    #[arg(long, short = 'v')]
    pub verbose: bool,

    /// Print the resolved configuration and exit.
    #[arg(long)]
    pub show_config: bool,
}
