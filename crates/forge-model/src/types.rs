// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Provider-agnostic message, content-block, and event vocabulary.
//!
//! Every provider adapter translates its native wire format into the types
//! defined here. Downstream components (the turn engine, the session store)
//! never see provider-specific shapes.

use serde::{Deserialize, Serialize};

/// Role of a conversation message. Only user and assistant turns are
/// persisted; the system prompt is sent out-of-band on every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// One tool-result entry inside a user message that answers a prior
/// assistant tool-use batch. See invariant I1: a user message either
/// carries exactly one of these lists, or plain text, never both.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResultBlock {
    pub tool_use_id: String,
    pub content: String,
    #[serde(default)]
    pub is_error: bool,
}

/// A typed sub-element of an assistant message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Reasoning {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ServerToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ServerToolResult {
        id: String,
        output: String,
    },
    Citation {
        text: String,
        source: String,
    },
}

/// The content of a message.
///
/// `Text` covers the common case of a plain user message. `Blocks` is the
/// assistant's typed content sequence. `ToolResults` is the batched answer
/// to a prior assistant tool-use turn (I1) and must never be mixed with
/// other content in the same message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
    ToolResults(Vec<ToolResultBlock>),
}

/// A single message in the session conversation.
///
/// `id` is set for assistant messages that carry a provider-issued message
/// id (used for merge-by-id persistence, I3); user messages leave it `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub role: Role,
    pub content: MessageContent,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self { id: None, role: Role::User, content: MessageContent::Text(text.into()) }
    }

    pub fn tool_results(id: Option<String>, results: Vec<ToolResultBlock>) -> Self {
        Self { id, role: Role::User, content: MessageContent::ToolResults(results) }
    }

    pub fn assistant(id: impl Into<String>, blocks: Vec<ContentBlock>) -> Self {
        Self { id: Some(id.into()), role: Role::Assistant, content: MessageContent::Blocks(blocks) }
    }

    /// Concatenated text of every `Text` block, or the plain string body.
    /// Used for title derivation fallback and approximate token counting.
    pub fn as_text(&self) -> String {
        match &self.content {
            MessageContent::Text(t) => t.clone(),
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
            MessageContent::ToolResults(_) => String::new(),
        }
    }

    /// Every tool-use id carried by this message, in content order.
    pub fn tool_use_ids(&self) -> Vec<&str> {
        match &self.content {
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::ToolUse { id, .. } => Some(id.as_str()),
                    _ => None,
                })
                .collect(),
            _ => vec![],
        }
    }

    /// 4-chars-per-token heuristic, minimum 1. Used for context-window
    /// accounting; not a substitute for the provider's own tokenizer.
    pub fn approx_tokens(&self) -> usize {
        let chars = match &self.content {
            MessageContent::Text(t) => t.len(),
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .map(|b| match b {
                    ContentBlock::Text { text } => text.len(),
                    ContentBlock::Reasoning { text, .. } => text.len(),
                    ContentBlock::ToolUse { name, input, .. }
                    | ContentBlock::ServerToolUse { name, input, .. } => {
                        name.len() + input.to_string().len()
                    }
                    ContentBlock::ServerToolResult { output, .. } => output.len(),
                    ContentBlock::Citation { text, source } => text.len() + source.len(),
                })
                .sum(),
            MessageContent::ToolResults(results) => {
                results.iter().map(|r| r.content.len()).sum()
            }
        };
        (chars / 4).max(1)
    }
}

/// A tool descriptor as sent to the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Request sent to a provider adapter to open (or continue) a turn's stream.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub session_id: String,
    pub system_prompt: String,
    /// Dynamic context appended after the stable system prompt so the
    /// "blocks" adapter can cache the stable prefix (§4.9 composition is
    /// otherwise opaque to adapters).
    pub system_dynamic_suffix: Option<String>,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSchema>,
    /// Opaque continuation handle from a prior turn. `None` means "send the
    /// full conversation"; adapters decide based on its presence.
    pub continuation_handle: Option<String>,
    pub stream: bool,
}

/// Terminal reason a provider stream stopped, normalized across adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
    ToolUse,
    PauseTurn,
    Aborted,
    Error,
}

/// The only event vocabulary downstream components (turn engine, gateway)
/// ever see. Every provider adapter translates its native stream into this.
#[derive(Debug, Clone)]
pub enum NormalizedEvent {
    MessageStart { id: String },
    ReasoningDelta { text: String },
    ReasoningEnd { signature: Option<String> },
    TextDelta { text: String },
    TextEnd,
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
        description: Option<String>,
        continuation_handle: Option<String>,
    },
    Usage { input: u32, output: u32, reasoning: Option<u32> },
    Stop {
        reason: StopReason,
        error: Option<String>,
        /// New opaque continuation handle, if the underlying transport
        /// produced one for this turn. `None` on error/aborted stops.
        continuation_handle: Option<String>,
    },
}
