// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The "blocks" provider adapter (§4.3.a): Anthropic Messages API streaming
//! shape — `message_start`, `content_block_start/delta/stop`,
//! `message_delta`, `message_stop`.
//!
//! This adapter never produces a continuation handle: the blocks provider
//! requires the full conversation on every turn (§9 design notes).

use std::collections::HashMap;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use tracing::warn;

use crate::provider::{CancelToken, NormalizedEventStream, ProviderAdapter};
use crate::types::{ContentBlock, Message, MessageContent, Role};
use crate::{CompletionRequest, NormalizedEvent, StopReason};

pub struct BlocksAdapter {
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    client: reqwest::Client,
}

impl BlocksAdapter {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.anthropic.com".into(),
            model: model.into(),
            max_tokens: 8192,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl ProviderAdapter for BlocksAdapter {
    fn name(&self) -> &str {
        "blocks"
    }

    async fn stream(
        &self,
        req: CompletionRequest,
        cancel: CancelToken,
    ) -> anyhow::Result<NormalizedEventStream> {
        let body = build_request_body(&req, &self.model, self.max_tokens);

        let resp = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("blocks adapter error {status}: {text}");
        }

        let state = StreamState { buf: String::new(), tracker: BlockTracker::default(), cancel, aborted: false };
        let event_stream = resp
            .bytes_stream()
            .scan(state, move |st, chunk| {
                let events = if st.aborted {
                    vec![]
                } else if st.cancel.is_cancelled() {
                    st.aborted = true;
                    vec![Ok(NormalizedEvent::Stop { reason: StopReason::Aborted, error: None, continuation_handle: None })]
                } else {
                    match chunk {
                        Ok(b) => {
                            st.buf.push_str(&String::from_utf8_lossy(&b));
                            drain_lines(&mut st.buf, &mut st.tracker)
                        }
                        Err(e) => vec![Err(anyhow::anyhow!(e))],
                    }
                };
                std::future::ready(if st.aborted && events.is_empty() { None } else { Some(events) })
            })
            .flat_map(futures::stream::iter);

        Ok(Box::pin(event_stream))
    }
}

struct StreamState {
    buf: String,
    tracker: BlockTracker,
    cancel: CancelToken,
    aborted: bool,
}

/// Per-content-block accumulation state, keyed by the provider's block index.
#[derive(Default)]
struct BlockTracker {
    blocks: HashMap<u64, PendingBlock>,
    /// `message_delta.delta.stop_reason`, captured ahead of the terminal
    /// `message_stop` event that actually carries no stop reason itself.
    stop_reason: Option<String>,
}

enum PendingBlock {
    Text,
    Thinking { signature: Option<String> },
    ToolUse { id: String, name: String, buf: String },
}

fn drain_lines(buf: &mut String, tracker: &mut BlockTracker) -> Vec<anyhow::Result<NormalizedEvent>> {
    let mut events = Vec::new();
    while let Some(nl) = buf.find('\n') {
        let line = buf[..nl].trim_end_matches('\r').to_string();
        *buf = buf[nl + 1..].to_string();
        let Some(data) = line.strip_prefix("data: ") else { continue };
        let data = data.trim();
        if data.is_empty() {
            continue;
        }
        let Ok(v) = serde_json::from_str::<Value>(data) else { continue };
        events.extend(parse_blocks_event(tracker, &v));
    }
    events
}

/// Translate one decoded SSE payload into zero or more normalized events.
/// Pure function over explicit tracker state so it can be unit tested
/// without a network round trip.
fn parse_blocks_event(tracker: &mut BlockTracker, v: &Value) -> Vec<anyhow::Result<NormalizedEvent>> {
    match v["type"].as_str().unwrap_or("") {
        "message_start" => {
            let id = v["message"]["id"].as_str().unwrap_or("").to_string();
            let usage = &v["message"]["usage"];
            let mut out = vec![Ok(NormalizedEvent::MessageStart { id })];
            if let Some(input) = usage["input_tokens"].as_u64() {
                out.push(Ok(NormalizedEvent::Usage { input: input as u32, output: 0, reasoning: None }));
            }
            out
        }
        "content_block_start" => {
            let index = v["index"].as_u64().unwrap_or(0);
            let block = &v["content_block"];
            match block["type"].as_str().unwrap_or("") {
                "thinking" => {
                    tracker.blocks.insert(index, PendingBlock::Thinking { signature: None });
                }
                "tool_use" => {
                    let id = block["id"].as_str().unwrap_or_default().to_string();
                    let name = block["name"].as_str().unwrap_or_default().to_string();
                    tracker.blocks.insert(index, PendingBlock::ToolUse { id, name, buf: String::new() });
                }
                _ => {
                    tracker.blocks.insert(index, PendingBlock::Text);
                }
            }
            vec![]
        }
        "content_block_delta" => {
            let index = v["index"].as_u64().unwrap_or(0);
            let delta = &v["delta"];
            match delta["type"].as_str().unwrap_or("") {
                "text_delta" => {
                    vec![Ok(NormalizedEvent::TextDelta { text: delta["text"].as_str().unwrap_or("").to_string() })]
                }
                "thinking_delta" => {
                    vec![Ok(NormalizedEvent::ReasoningDelta { text: delta["thinking"].as_str().unwrap_or("").to_string() })]
                }
                "signature_delta" => {
                    if let Some(PendingBlock::Thinking { signature }) = tracker.blocks.get_mut(&index) {
                        let sig = signature.get_or_insert_with(String::new);
                        sig.push_str(delta["signature"].as_str().unwrap_or(""));
                    }
                    vec![]
                }
                "input_json_delta" => {
                    if let Some(PendingBlock::ToolUse { buf, .. }) = tracker.blocks.get_mut(&index) {
                        buf.push_str(delta["partial_json"].as_str().unwrap_or(""));
                    }
                    vec![]
                }
                _ => vec![],
            }
        }
        "content_block_stop" => {
            let index = v["index"].as_u64().unwrap_or(0);
            match tracker.blocks.remove(&index) {
                Some(PendingBlock::Text) => vec![Ok(NormalizedEvent::TextEnd)],
                Some(PendingBlock::Thinking { signature }) => vec![Ok(NormalizedEvent::ReasoningEnd { signature })],
                Some(PendingBlock::ToolUse { id, name, buf }) => {
                    let parsed = if buf.trim().is_empty() { Ok(json!({})) } else { serde_json::from_str::<Value>(&buf) };
                    match parsed {
                        Ok(input) => vec![Ok(NormalizedEvent::ToolUse { id, name, input, description: None, continuation_handle: None })],
                        Err(e) => vec![Ok(NormalizedEvent::Stop {
                            reason: StopReason::Error,
                            error: Some(format!("malformed tool input for {name}: {e}")),
                            continuation_handle: None,
                        })],
                    }
                }
                None => vec![],
            }
        }
        "message_delta" => {
            let mut out = Vec::new();
            if let Some(reason) = v["delta"]["stop_reason"].as_str() {
                tracker.stop_reason = Some(reason.to_string());
            }
            if let Some(output) = v["usage"]["output_tokens"].as_u64() {
                out.push(Ok(NormalizedEvent::Usage { input: 0, output: output as u32, reasoning: None }));
            }
            out
        }
        "message_stop" => {
            let reason = match tracker.stop_reason.as_deref() {
                Some("tool_use") => StopReason::ToolUse,
                Some("max_tokens") => StopReason::MaxTokens,
                Some("stop_sequence") => StopReason::StopSequence,
                Some("pause_turn") => StopReason::PauseTurn,
                _ => StopReason::EndTurn,
            };
            vec![Ok(NormalizedEvent::Stop { reason, error: None, continuation_handle: None })]
        }
        other => {
            warn!(event_type = other, "unhandled blocks event type");
            vec![]
        }
    }
}

fn build_request_body(req: &CompletionRequest, model: &str, max_tokens: u32) -> Value {
    let mut system = vec![json!({"type": "text", "text": req.system_prompt})];
    if let Some(suffix) = &req.system_dynamic_suffix {
        system.push(json!({"type": "text", "text": suffix}));
    }

    let messages: Vec<Value> = req.messages.iter().map(message_to_wire).collect();

    let tools: Vec<Value> = req
        .tools
        .iter()
        .map(|t| json!({"name": t.name, "description": t.description, "input_schema": t.parameters}))
        .collect();

    json!({
        "model": model,
        "max_tokens": max_tokens,
        "system": system,
        "messages": messages,
        "tools": tools,
        "stream": true,
    })
}

fn message_to_wire(m: &Message) -> Value {
    match (&m.role, &m.content) {
        (Role::User, MessageContent::Text(t)) => json!({"role": "user", "content": t}),
        (Role::User, MessageContent::ToolResults(results)) => {
            let content: Vec<Value> = results
                .iter()
                .map(|r| json!({"type": "tool_result", "tool_use_id": r.tool_use_id, "content": r.content, "is_error": r.is_error}))
                .collect();
            json!({"role": "user", "content": content})
        }
        (Role::Assistant, MessageContent::Blocks(blocks)) => {
            let content: Vec<Value> = blocks.iter().map(block_to_wire).collect();
            json!({"role": "assistant", "content": content})
        }
        (role, content) => {
            warn!(?role, "unexpected message shape sent to blocks adapter");
            json!({"role": "user", "content": match content {
                MessageContent::Text(t) => t.clone(),
                _ => String::new(),
            }})
        }
    }
}

fn block_to_wire(b: &ContentBlock) -> Value {
    match b {
        ContentBlock::Text { text } => json!({"type": "text", "text": text}),
        ContentBlock::Reasoning { text, signature } => {
            json!({"type": "thinking", "thinking": text, "signature": signature})
        }
        ContentBlock::ToolUse { id, name, input } => {
            json!({"type": "tool_use", "id": id, "name": name, "input": input})
        }
        ContentBlock::ServerToolUse { id, name, input } => {
            json!({"type": "server_tool_use", "id": id, "name": name, "input": input})
        }
        ContentBlock::ServerToolResult { id, output } => {
            json!({"type": "server_tool_result", "tool_use_id": id, "content": output})
        }
        ContentBlock::Citation { text, .. } => json!({"type": "text", "text": text}),
    }
}
