// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Inbound client wire protocol (§6). Outbound messages are
//! `forge_core::Envelope` directly; this module only covers what a client
//! sends in.

use forge_store::SessionMode;
use serde::{Deserialize, Serialize};

fn default_mode() -> SessionMode {
    SessionMode::Interactive
}

/// One message from the paired client over the bi-directional channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    #[serde(rename = "agent:message")]
    Message {
        session_id: Option<String>,
        content: String,
        working_dir: Option<String>,
        #[serde(default = "default_mode")]
        max_mode: SessionMode,
        /// Named provider key (forge-config's `providers` map); not yet
        /// wired to override the gateway's configured adapter per-turn.
        provider: Option<String>,
        api_key: Option<String>,
        /// Identifies the paired device originating this message, so the
        /// session can route push notifications back to it (§4.1 `setInitiator`).
        device_id: Option<String>,
    },
    #[serde(rename = "agent:tool_response")]
    ToolResponse {
        session_id: String,
        tool_response: ToolResponseBody,
    },
    #[serde(rename = "agent:stop")]
    Stop { session_id: String },
    #[serde(rename = "agent:generate_title")]
    GenerateTitle { content: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResponseBody {
    pub id: String,
    pub approved: bool,
}
