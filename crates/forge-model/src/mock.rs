// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! A pre-scripted adapter used to drive the turn engine's scripted test
//! scenarios (§8 S1-S6) without a network round trip.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream;

use crate::provider::{CancelToken, NormalizedEventStream, ProviderAdapter};
use crate::{CompletionRequest, NormalizedEvent, StopReason};

/// Each call to `stream` pops the next script from the front of the queue.
pub struct ScriptedAdapter {
    scripts: Arc<Mutex<VecDeque<Vec<NormalizedEvent>>>>,
    /// The last request seen, so tests can assert what the engine sent
    /// (continuation handle, tool schemas, conversation shape).
    pub last_request: Arc<Mutex<Option<CompletionRequest>>>,
}

impl ScriptedAdapter {
    pub fn new(scripts: Vec<Vec<NormalizedEvent>>) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(scripts.into())),
            last_request: Arc::new(Mutex::new(None)),
        }
    }

    /// A single round that emits the given text then stops with `end_turn`.
    pub fn always_text(reply: impl Into<String>) -> Self {
        Self::new(vec![vec![
            NormalizedEvent::MessageStart { id: "msg-mock-1".into() },
            NormalizedEvent::TextDelta { text: reply.into() },
            NormalizedEvent::TextEnd,
            NormalizedEvent::Usage { input: 10, output: 10, reasoning: None },
            NormalizedEvent::Stop { reason: StopReason::EndTurn, error: None, continuation_handle: None },
        ]])
    }

    /// Round 1 emits a tool-use request and stops with `tool_use`; round 2
    /// (after the tool result is fed back) replies with `final_text`.
    pub fn tool_then_text(
        tool_id: impl Into<String>,
        tool_name: impl Into<String>,
        input: serde_json::Value,
        final_text: impl Into<String>,
    ) -> Self {
        Self::new(vec![
            vec![
                NormalizedEvent::MessageStart { id: "msg-mock-1".into() },
                NormalizedEvent::ToolUse {
                    id: tool_id.into(),
                    name: tool_name.into(),
                    input,
                    description: None,
                    continuation_handle: None,
                },
                NormalizedEvent::Stop { reason: StopReason::ToolUse, error: None, continuation_handle: None },
            ],
            vec![
                NormalizedEvent::MessageStart { id: "msg-mock-2".into() },
                NormalizedEvent::TextDelta { text: final_text.into() },
                NormalizedEvent::TextEnd,
                NormalizedEvent::Stop { reason: StopReason::EndTurn, error: None, continuation_handle: None },
            ],
        ])
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedAdapter {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream(&self, req: CompletionRequest, cancel: CancelToken) -> anyhow::Result<NormalizedEventStream> {
        *self.last_request.lock().unwrap() = Some(req);
        let events = {
            let mut scripts = self.scripts.lock().unwrap();
            scripts.pop_front().unwrap_or_else(|| {
                vec![
                    NormalizedEvent::TextDelta { text: "[no more scripts]".into() },
                    NormalizedEvent::TextEnd,
                    NormalizedEvent::Stop { reason: StopReason::EndTurn, error: None, continuation_handle: None },
                ]
            })
        };
        let wrapped: Vec<anyhow::Result<NormalizedEvent>> = if cancel.is_cancelled() {
            vec![Ok(NormalizedEvent::Stop { reason: StopReason::Aborted, error: None, continuation_handle: None })]
        } else {
            events.into_iter().map(Ok).collect()
        };
        Ok(Box::pin(stream::iter(wrapped)))
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;
    use crate::Message;

    fn req() -> CompletionRequest {
        CompletionRequest {
            session_id: "s1".into(),
            system_prompt: "you are helpful".into(),
            messages: vec![Message::user("hi")],
            stream: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn always_text_emits_final_text_then_end_turn_stop() {
        let a = ScriptedAdapter::always_text("hello world");
        let mut s = a.stream(req(), CancelToken::new()).await.unwrap();
        let mut events = Vec::new();
        while let Some(e) = s.next().await {
            events.push(e.unwrap());
        }
        assert!(events.iter().any(|e| matches!(e, NormalizedEvent::TextDelta{text} if text == "hello world")));
        assert!(matches!(events.last(), Some(NormalizedEvent::Stop { reason: StopReason::EndTurn, .. })));
    }

    #[tokio::test]
    async fn tool_then_text_two_rounds() {
        let a = ScriptedAdapter::tool_then_text("t1", "bash", serde_json::json!({"command": "ls"}), "done");

        let mut s1 = a.stream(req(), CancelToken::new()).await.unwrap();
        let mut round1 = Vec::new();
        while let Some(e) = s1.next().await {
            round1.push(e.unwrap());
        }
        assert!(round1.iter().any(|e| matches!(e, NormalizedEvent::ToolUse{name,..} if name == "bash")));
        assert!(matches!(round1.last(), Some(NormalizedEvent::Stop { reason: StopReason::ToolUse, .. })));

        let mut s2 = a.stream(req(), CancelToken::new()).await.unwrap();
        let mut round2 = Vec::new();
        while let Some(e) = s2.next().await {
            round2.push(e.unwrap());
        }
        assert!(round2.iter().any(|e| matches!(e, NormalizedEvent::TextDelta{text} if text == "done")));
    }

    #[tokio::test]
    async fn exhausted_scripts_fall_back_to_default() {
        let a = ScriptedAdapter::new(vec![]);
        let mut s = a.stream(req(), CancelToken::new()).await.unwrap();
        let first = s.next().await.unwrap().unwrap();
        assert!(matches!(first, NormalizedEvent::TextDelta{text} if text.contains("no more scripts")));
    }

    #[tokio::test]
    async fn cancelled_before_stream_emits_aborted_stop_only() {
        let a = ScriptedAdapter::always_text("should not see this");
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut s = a.stream(req(), cancel).await.unwrap();
        let only = s.next().await.unwrap().unwrap();
        assert!(matches!(only, NormalizedEvent::Stop { reason: StopReason::Aborted, .. }));
        assert!(s.next().await.is_none());
    }

    #[tokio::test]
    async fn last_request_is_captured() {
        let a = ScriptedAdapter::always_text("hi");
        let _ = a.stream(req(), CancelToken::new()).await.unwrap();
        let captured = a.last_request.lock().unwrap().clone();
        assert_eq!(captured.unwrap().session_id, "s1");
    }
}
