// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The "response" provider adapter (§4.3.b): OpenAI Responses API streaming
//! shape — `response.output_item.added`, `response.function_call_arguments.*`,
//! `response.output_text.*`, `response.completed`.
//!
//! The response id becomes the continuation handle (§9): when the engine
//! supplies one on the next turn, only the new tool-result input is sent.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};

use crate::provider::{CancelToken, NormalizedEventStream, ProviderAdapter};
use crate::types::{ContentBlock, Message, MessageContent, Role};
use crate::{CompletionRequest, NormalizedEvent, StopReason};

pub struct ResponsesAdapter {
    api_key: String,
    base_url: String,
    model: String,
    max_output_tokens: u32,
    client: reqwest::Client,
}

impl ResponsesAdapter {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.openai.com".into(),
            model: model.into(),
            max_output_tokens: 8192,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl ProviderAdapter for ResponsesAdapter {
    fn name(&self) -> &str {
        "response"
    }

    async fn stream(
        &self,
        req: CompletionRequest,
        cancel: CancelToken,
    ) -> anyhow::Result<NormalizedEventStream> {
        let body = build_request_body(&req, &self.model, self.max_output_tokens);

        let resp = self
            .client
            .post(format!("{}/v1/responses", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("response adapter error {status}: {text}");
        }

        let state = StreamState { buf: String::new(), tracker: ItemTracker::default(), cancel, aborted: false };
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
    tracker: ItemTracker,
    cancel: CancelToken,
    aborted: bool,
}

#[derive(Default)]
struct ItemTracker {
    function_calls: HashMap<u64, PendingCall>,
}

struct PendingCall {
    id: String,
    name: String,
    buf: String,
}

fn drain_lines(buf: &mut String, tracker: &mut ItemTracker) -> Vec<anyhow::Result<NormalizedEvent>> {
    let mut events = Vec::new();
    while let Some(nl) = buf.find('\n') {
        let line = buf[..nl].trim_end_matches('\r').to_string();
        *buf = buf[nl + 1..].to_string();
        let Some(data) = line.strip_prefix("data: ") else { continue };
        let data = data.trim();
        if data.is_empty() || data == "[DONE]" {
            continue;
        }
        let Ok(v) = serde_json::from_str::<Value>(data) else { continue };
        events.extend(parse_responses_event(tracker, &v));
    }
    events
}

fn parse_responses_event(tracker: &mut ItemTracker, v: &Value) -> Vec<anyhow::Result<NormalizedEvent>> {
    match v["type"].as_str().unwrap_or("") {
        "response.output_item.added" => {
            let index = v["output_index"].as_u64().unwrap_or(0);
            let item = &v["item"];
            if item["type"].as_str() == Some("function_call") {
                let id = item["call_id"].as_str().or_else(|| item["id"].as_str()).unwrap_or_default().to_string();
                let name = item["name"].as_str().unwrap_or_default().to_string();
                tracker.function_calls.insert(index, PendingCall { id, name, buf: String::new() });
            }
            vec![]
        }
        "response.function_call_arguments.delta" => {
            let index = v["output_index"].as_u64().unwrap_or(0);
            if let Some(call) = tracker.function_calls.get_mut(&index) {
                call.buf.push_str(v["delta"].as_str().unwrap_or(""));
            }
            vec![]
        }
        "response.function_call_arguments.done" => {
            let index = v["output_index"].as_u64().unwrap_or(0);
            let Some(call) = tracker.function_calls.remove(&index) else { return vec![] };
            let raw = v["arguments"].as_str().map(str::to_string).unwrap_or(call.buf.clone());
            let parsed = if raw.trim().is_empty() { Ok(json!({})) } else { serde_json::from_str::<Value>(&raw) };
            match parsed {
                Ok(input) => vec![Ok(NormalizedEvent::ToolUse { id: call.id, name: call.name, input, description: None, continuation_handle: None })],
                Err(e) => vec![Ok(NormalizedEvent::Stop {
                    reason: StopReason::Error,
                    error: Some(format!("malformed tool arguments for {}: {e}", call.name)),
                    continuation_handle: None,
                })],
            }
        }
        "response.output_text.delta" => {
            vec![Ok(NormalizedEvent::TextDelta { text: v["delta"].as_str().unwrap_or("").to_string() })]
        }
        "response.output_text.done" => vec![Ok(NormalizedEvent::TextEnd)],
        "response.completed" => parse_completed(v),
        _ => vec![],
    }
}

fn parse_completed(v: &Value) -> Vec<anyhow::Result<NormalizedEvent>> {
    let response = &v["response"];
    let id = response["id"].as_str().unwrap_or_default().to_string();
    let mut out = Vec::new();

    let mut pending_tool = false;
    if let Some(outputs) = response["output"].as_array() {
        for item in outputs {
            match item["type"].as_str() {
                Some("reasoning") => {
                    if let Some(text) = extract_reasoning_text(item) {
                        out.push(Ok(NormalizedEvent::ReasoningDelta { text }));
                        out.push(Ok(NormalizedEvent::ReasoningEnd { signature: None }));
                    }
                }
                Some("function_call") => pending_tool = true,
                _ => {}
            }
        }
    }

    if let Some(usage) = response["usage"].as_object() {
        let input = usage.get("input_tokens").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
        let output = usage.get("output_tokens").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
        let reasoning = usage
            .get("output_tokens_details")
            .and_then(|d| d.get("reasoning_tokens"))
            .and_then(|v| v.as_u64())
            .map(|v| v as u32);
        out.push(Ok(NormalizedEvent::Usage { input, output, reasoning }));
    }

    let (reason, error) = match response["status"].as_str() {
        Some("incomplete") => (StopReason::MaxTokens, None),
        Some("failed") => (StopReason::Error, response["error"]["message"].as_str().map(str::to_string)),
        _ if pending_tool => (StopReason::ToolUse, None),
        _ => (StopReason::EndTurn, None),
    };
    out.push(Ok(NormalizedEvent::Stop { reason, error, continuation_handle: Some(id) }));
    out
}

/// Preference order (§4.3.b): `summary` array of text parts, then `content`
/// array, then a plain `text` field.
fn extract_reasoning_text(item: &Value) -> Option<String> {
    if let Some(summary) = item["summary"].as_array() {
        let joined = summary.iter().filter_map(|p| p["text"].as_str()).collect::<Vec<_>>().join("\n");
        if !joined.is_empty() {
            return Some(joined);
        }
    }
    if let Some(content) = item["content"].as_array() {
        let joined = content.iter().filter_map(|p| p["text"].as_str()).collect::<Vec<_>>().join("\n");
        if !joined.is_empty() {
            return Some(joined);
        }
    }
    item["text"].as_str().map(str::to_string)
}

fn build_request_body(req: &CompletionRequest, model: &str, max_output_tokens: u32) -> Value {
    let mut instructions = req.system_prompt.clone();
    if let Some(suffix) = &req.system_dynamic_suffix {
        instructions.push('\n');
        instructions.push_str(suffix);
    }

    let tools: Vec<Value> = req
        .tools
        .iter()
        .map(|t| json!({"type": "function", "name": t.name, "description": t.description, "parameters": t.parameters}))
        .collect();

    let input: Vec<Value> = if req.continuation_handle.is_some() {
        req.messages.last().map(message_to_wire_items).unwrap_or_default()
    } else {
        req.messages.iter().flat_map(message_to_wire_items).collect()
    };

    let mut body = json!({
        "model": model,
        "instructions": instructions,
        "input": input,
        "tools": tools,
        "stream": true,
        "max_output_tokens": max_output_tokens,
    });
    if let Some(handle) = &req.continuation_handle {
        body["previous_response_id"] = json!(handle);
    }
    body
}

fn message_to_wire_items(m: &Message) -> Vec<Value> {
    match (&m.role, &m.content) {
        (Role::User, MessageContent::Text(t)) => {
            vec![json!({"role": "user", "content": [{"type": "input_text", "text": t}]})]
        }
        (Role::User, MessageContent::ToolResults(results)) => results
            .iter()
            .map(|r| {
                let output = if r.is_error { format!("Error: {}", r.content) } else { r.content.clone() };
                json!({"type": "function_call_output", "call_id": r.tool_use_id, "output": output})
            })
            .collect(),
        (Role::Assistant, MessageContent::Blocks(blocks)) => blocks
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => {
                    Some(json!({"role": "assistant", "content": [{"type": "output_text", "text": text}]}))
                }
                ContentBlock::ToolUse { id, name, input } => {
                    Some(json!({"type": "function_call", "call_id": id, "name": name, "arguments": input.to_string()}))
                }
                _ => None,
            })
            .collect(),
        _ => vec![],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_delta_and_done_round_trip() {
        let mut tracker = ItemTracker::default();
        let delta = parse_responses_event(&mut tracker, &json!({"type": "response.output_text.delta", "delta": "hi"}));
        assert!(matches!(delta[0].as_ref().unwrap(), NormalizedEvent::TextDelta{text} if text == "hi"));
        let done = parse_responses_event(&mut tracker, &json!({"type": "response.output_text.done"}));
        assert!(matches!(done[0].as_ref().unwrap(), NormalizedEvent::TextEnd));
    }

    #[test]
    fn function_call_arguments_accumulate_and_parse_on_done() {
        let mut tracker = ItemTracker::default();
        parse_responses_event(&mut tracker, &json!({"type": "response.output_item.added", "output_index": 0, "item": {"type": "function_call", "call_id": "c1", "name": "bash"}}));
        parse_responses_event(&mut tracker, &json!({"type": "response.function_call_arguments.delta", "output_index": 0, "delta": "{\"command\":"}));
        let done = parse_responses_event(&mut tracker, &json!({"type": "response.function_call_arguments.done", "output_index": 0, "arguments": "{\"command\":\"ls\"}"}));
        match done[0].as_ref().unwrap() {
            NormalizedEvent::ToolUse { id, name, input, .. } => {
                assert_eq!(id, "c1");
                assert_eq!(name, "bash");
                assert_eq!(input["command"], "ls");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn malformed_arguments_surface_as_error_stop() {
        let mut tracker = ItemTracker::default();
        parse_responses_event(&mut tracker, &json!({"type": "response.output_item.added", "output_index": 0, "item": {"type": "function_call", "call_id": "c1", "name": "bash"}}));
        let done = parse_responses_event(&mut tracker, &json!({"type": "response.function_call_arguments.done", "output_index": 0, "arguments": "not json"}));
        assert!(matches!(done[0].as_ref().unwrap(), NormalizedEvent::Stop{reason: StopReason::Error, ..}));
    }

    #[test]
    fn completed_captures_response_id_as_continuation_handle() {
        let v = json!({"response": {"id": "resp-123", "status": "completed", "output": [], "usage": {"input_tokens": 5, "output_tokens": 7}}});
        let events = parse_completed(&v);
        let stop = events.last().unwrap().as_ref().unwrap();
        assert!(matches!(stop, NormalizedEvent::Stop{continuation_handle: Some(id), reason: StopReason::EndTurn, ..} if id == "resp-123"));
    }

    #[test]
    fn completed_with_pending_function_call_stops_with_tool_use() {
        let v = json!({"response": {"id": "resp-1", "status": "completed", "output": [{"type": "function_call"}], "usage": {}}});
        let events = parse_completed(&v);
        let stop = events.last().unwrap().as_ref().unwrap();
        assert!(matches!(stop, NormalizedEvent::Stop{reason: StopReason::ToolUse, ..}));
    }

    #[test]
    fn reasoning_text_prefers_summary_over_content() {
        let item = json!({"type": "reasoning", "summary": [{"text": "from summary"}], "content": [{"text": "from content"}]});
        assert_eq!(extract_reasoning_text(&item).as_deref(), Some("from summary"));
    }

    #[test]
    fn reasoning_text_falls_back_to_content_then_plain_text() {
        let content_only = json!({"content": [{"text": "c"}]});
        assert_eq!(extract_reasoning_text(&content_only).as_deref(), Some("c"));
        let plain = json!({"text": "p"});
        assert_eq!(extract_reasoning_text(&plain).as_deref(), Some("p"));
    }

    #[test]
    fn build_request_body_sends_only_new_message_when_continuation_handle_present() {
        let req = CompletionRequest {
            system_prompt: "sys".into(),
            messages: vec![Message::user("first"), Message::user("second")],
            continuation_handle: Some("resp-prev".into()),
            ..Default::default()
        };
        let body = build_request_body(&req, "gpt-5", 4096);
        assert_eq!(body["previous_response_id"], "resp-prev");
        let input = body["input"].as_array().unwrap();
        assert_eq!(input.len(), 1);
    }

    #[test]
    fn build_request_body_sends_full_history_without_continuation_handle() {
        let req = CompletionRequest {
            system_prompt: "sys".into(),
            messages: vec![Message::user("first"), Message::user("second")],
            continuation_handle: None,
            ..Default::default()
        };
        let body = build_request_body(&req, "gpt-5", 4096);
        assert!(body.get("previous_response_id").is_none());
        let input = body["input"].as_array().unwrap();
        assert_eq!(input.len(), 2);
    }
}
