// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Outbound wire envelope (§6): every event the gateway forwards to a client
//! is one of these payloads wrapped in an [`Envelope`].

use chrono::{DateTime, Utc};
use forge_model::{ContentBlock, Message};
use forge_store::Phase;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A normalized provider event, reshaped for the wire (serializable; the
/// engine's internal [`forge_model::NormalizedEvent`] is not).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEventWire {
    MessageStart { id: String },
    ReasoningDelta { text: String },
    ReasoningEnd,
    TextDelta { text: String },
    TextEnd,
    Usage { input: u32, output: u32 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolRequestWire {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutputWire {
    pub id: String,
    pub tool_use_id: String,
    pub name: String,
    pub output: String,
    pub is_error: bool,
    pub input: serde_json::Value,
}

/// One outbound payload (§6). The `type` tag is the wire event name exactly
/// as named in the protocol (`agent:status`, `agent:title`, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    #[serde(rename = "agent:status")]
    Status { phase: Phase },
    #[serde(rename = "agent:title")]
    Title { title: String },
    #[serde(rename = "agent:stream_event")]
    StreamEvent { stream_event: StreamEventWire },
    #[serde(rename = "agent:tool_request")]
    ToolRequest { tool_request: ToolRequestWire },
    #[serde(rename = "agent:tool_output")]
    ToolOutput { tool_output: ToolOutputWire, message: Message },
    #[serde(rename = "agent:stream_complete")]
    StreamComplete { final_message: Message },
    #[serde(rename = "agent:error")]
    Error { error: String },
}

/// The envelope every outbound message is wrapped in (§6). `seq` is the
/// per-session monotonic counter from the store (I2); `correlation_id`
/// echoes the inbound request that triggered this event, when there is one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub v: u8,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    pub session_id: String,
    pub ts: DateTime<Utc>,
    pub seq: u64,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl Envelope {
    pub fn new(session_id: impl Into<String>, seq: u64, payload: EventPayload) -> Self {
        Self {
            v: 1,
            id: Uuid::new_v4().to_string(),
            correlation_id: None,
            session_id: session_id.into(),
            ts: Utc::now(),
            seq,
            payload,
        }
    }

    pub fn with_correlation(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }
}

/// Collapse a [`forge_model::NormalizedEvent`] into the subset the wire
/// protocol forwards verbatim. `ToolUse` and `Stop` are handled by the turn
/// engine directly (they drive ledger/phase transitions, not plain forwarding).
pub fn text_delta_wire(text: impl Into<String>) -> StreamEventWire {
    StreamEventWire::TextDelta { text: text.into() }
}

pub fn final_message_text(blocks: &[ContentBlock]) -> String {
    blocks
        .iter()
        .filter_map(|b| match b {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}
