// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Turn Engine (C6, §4.6): the state machine that drives one assistant turn
//! from admission through streaming, tool approval, and completion.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use forge_model::{
    CancelToken, CompletionRequest, ContentBlock, Message, NormalizedEvent, ProviderAdapter,
    StopReason, ToolResultBlock,
};
use forge_store::{Phase, SessionMode, SessionStore, ToolDecision};
use forge_tools::{PushKind, SafetyClass, ToolCall, ToolEvent, ToolRegistry};
use futures::StreamExt;
use tokio::sync::{mpsc, Mutex};
use tracing::warn;

use crate::events::{Envelope, EventPayload, StreamEventWire, ToolOutputWire, ToolRequestWire};
use crate::executor::ToolExecutor;
use crate::ledger::{ApprovalLedger, PendingEntry};
use crate::project_context::load_project_context;
use crate::prompts::{system_prompt, PromptContext};
use crate::push::{PushDispatcher, PushMessage};
use crate::title::{fallback_title, sanitize_provider_title};

pub type EventSink = mpsc::Sender<Envelope>;

pub struct TurnEngine {
    store: Arc<SessionStore>,
    tools: Arc<ToolRegistry>,
    executor: ToolExecutor,
    adapter: Arc<dyn ProviderAdapter>,
    push: Arc<dyn PushDispatcher>,
    tool_events: Mutex<mpsc::Receiver<ToolEvent>>,
    platform: String,
    os_version: String,
    cancel_tokens: Mutex<HashMap<String, CancelToken>>,
    ledgers: Mutex<HashMap<String, ApprovalLedger>>,
}

impl TurnEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<SessionStore>,
        tools: Arc<ToolRegistry>,
        adapter: Arc<dyn ProviderAdapter>,
        push: Arc<dyn PushDispatcher>,
        tool_events: mpsc::Receiver<ToolEvent>,
        platform: impl Into<String>,
        os_version: impl Into<String>,
    ) -> Self {
        Self {
            executor: ToolExecutor::new(tools.clone()),
            store,
            tools,
            adapter,
            push,
            tool_events: Mutex::new(tool_events),
            platform: platform.into(),
            os_version: os_version.into(),
            cancel_tokens: Mutex::new(HashMap::new()),
            ledgers: Mutex::new(HashMap::new()),
        }
    }

    /// Drain whatever work-plan push events tools have queued since the last
    /// drain and forward the ones whose session has a recorded initiator
    /// device (§4.10). `WorkPlanUpdate` events carry no routing information
    /// beyond the session id and are visible in the snapshot already, so they
    /// aren't forwarded here.
    async fn drain_tool_push_events(&self) {
        let mut rx = self.tool_events.lock().await;
        while let Ok(event) = rx.try_recv() {
            if let ToolEvent::Push { session_id, notification } = event {
                self.dispatch_push(
                    &session_id,
                    notification.kind,
                    notification.step_index,
                    notification.total,
                    &notification.task_title,
                )
                .await;
            }
        }
    }

    async fn dispatch_push(&self, session_id: &str, kind: PushKind, step_index: usize, total: usize, task_title: &str) {
        let Ok(snapshot) = self.store.get_snapshot(session_id).await else {
            return;
        };
        let Some(device_id) = snapshot.initiator_device_id.clone() else {
            return;
        };
        self.push
            .send(vec![PushMessage {
                device_id,
                session_id: session_id.to_string(),
                session_title: snapshot.title.clone().unwrap_or_default(),
                kind,
                step_index,
                total,
                task_title: task_title.to_string(),
            }])
            .await;
    }

    /// A turn ending is itself a push-worthy event (§4.10), separate from
    /// any work-plan "completed" push the last tool call may have already
    /// sent. Step/total reflect the work plan if one exists so a client that
    /// missed the mid-turn pushes still sees final progress.
    async fn push_terminal_completion(&self, session_id: &str) {
        let Ok(snapshot) = self.store.get_snapshot(session_id).await else {
            return;
        };
        if snapshot.initiator_device_id.is_none() {
            return;
        }
        let (step_index, total) = match &snapshot.work_plan {
            Some(plan) => (
                plan.items.iter().filter(|i| i.status == forge_store::WorkPlanStatus::Complete).count(),
                plan.items.len(),
            ),
            None => (0, 0),
        };
        let task_title = snapshot.title.clone().unwrap_or_else(|| "Turn complete".to_string());
        self.dispatch_push(session_id, PushKind::Completed, step_index, total, &task_title).await;
    }

    async fn emit(&self, tx: &EventSink, session_id: &str, payload: EventPayload) {
        let seq = self.store.next_seq(session_id).await.unwrap_or(0);
        let _ = tx.send(Envelope::new(session_id, seq, payload)).await;
    }

    async fn set_phase(&self, tx: &EventSink, session_id: &str, phase: Phase) {
        if let Err(e) = self.store.record_status(session_id, phase).await {
            warn!(session = %session_id, error = %e, "failed to persist phase");
        }
        self.emit(tx, session_id, EventPayload::Status { phase }).await;
    }

    async fn cancel_token_for(&self, session_id: &str) -> CancelToken {
        let mut tokens = self.cancel_tokens.lock().await;
        tokens.entry(session_id.to_string()).or_insert_with(CancelToken::new).clone()
    }

    /// Cooperative cancel (§4.6). Idempotent; a fresh token is installed for
    /// the session's *next* turn.
    /// Read-only access to the backing session store, for snapshot
    /// inspection by callers outside the turn loop (HTTP admin surface,
    /// tests).
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub async fn cancel(&self, session_id: &str) {
        let mut tokens = self.cancel_tokens.lock().await;
        if let Some(token) = tokens.get(session_id) {
            token.cancel();
        }
        tokens.insert(session_id.to_string(), CancelToken::new());
    }

    /// Admission + first streaming pass (§4.6 step 1-4). Creates the session
    /// if `session_id` is `None`.
    pub async fn submit_message(
        &self,
        session_id: Option<&str>,
        content: &str,
        working_dir: &str,
        mode: SessionMode,
        tx: &EventSink,
    ) -> anyhow::Result<String> {
        let session_id = match session_id {
            Some(id) => id.to_string(),
            None => self.store.create_session(working_dir, mode).await?,
        };

        self.set_phase(tx, &session_id, Phase::Starting).await;
        self.store
            .record_user_message(&session_id, Message::user(content), working_dir, mode)
            .await?;

        let snapshot = self.store.get_snapshot(&session_id).await?;
        if snapshot.title.is_none() {
            let title = self.derive_title(content).await;
            self.store.update_title(&session_id, &title).await?;
            self.emit(tx, &session_id, EventPayload::Title { title }).await;
        }

        self.set_phase(tx, &session_id, Phase::Ready).await;
        self.run_stream(&session_id, tx).await?;
        Ok(session_id)
    }

    /// One-shot title derivation (`agent:generate_title`, §6), independent of
    /// any session.
    pub async fn generate_title(&self, user_message: &str) -> String {
        self.derive_title(user_message).await
    }

    /// §4.8: a short provider call with a deterministic fallback.
    async fn derive_title(&self, user_message: &str) -> String {
        let req = CompletionRequest {
            session_id: "title".into(),
            system_prompt: "Generate a 3-6 word title for this conversation. Respond with only the title.".into(),
            messages: vec![Message::user(user_message)],
            stream: true,
            ..Default::default()
        };
        let result: anyhow::Result<String> = async {
            let mut stream = self.adapter.stream(req, CancelToken::new()).await?;
            let mut text = String::new();
            while let Some(event) = stream.next().await {
                if let NormalizedEvent::TextDelta { text: delta } = event? {
                    text.push_str(&delta);
                }
            }
            Ok(text)
        }
        .await;

        match result {
            Ok(raw) => sanitize_provider_title(&raw).unwrap_or_else(|| fallback_title(user_message)),
            Err(e) => {
                warn!(error = %e, "title derivation call failed, using fallback");
                fallback_title(user_message)
            }
        }
    }

    /// Tool-response entry point (§4.6 step 7). Records the decision, and if
    /// it resolves the whole continuation-handle group, drains and executes.
    pub async fn submit_tool_response(
        &self,
        session_id: &str,
        tool_use_id: &str,
        approved: bool,
        tx: &EventSink,
    ) -> anyhow::Result<()> {
        let group_key = {
            let mut ledgers = self.ledgers.lock().await;
            let ledger = ledgers.entry(session_id.to_string()).or_default();
            ledger.decide(tool_use_id, approved);
            let group_key = self.store.get_snapshot(session_id).await?.previous_response_id;
            if !ledger.is_group_resolved(group_key.as_deref()) {
                return Ok(());
            }
            group_key
        };
        self.drain_and_continue(session_id, group_key.as_deref(), tx).await
    }

    /// Build the provider request, stream one round, and react to the stop
    /// reason (§4.6 step 4-6).
    async fn run_stream(&self, session_id: &str, tx: &EventSink) -> anyhow::Result<()> {
        let mut snapshot = self.store.get_snapshot(session_id).await?;

        if snapshot.project_context.is_none() {
            if let Some(context) = load_project_context(&snapshot.working_dir).await {
                snapshot = self.store.set_project_context(session_id, context).await?;
            }
        }

        let cancel = self.cancel_token_for(session_id).await;

        let project_context = snapshot.project_context.as_ref().map(|c| (c.path.as_str(), c.content.as_str()));
        let (stable, dynamic) = system_prompt(&PromptContext {
            working_directory: &snapshot.working_dir,
            platform: &self.platform,
            os_version: &self.os_version,
            project_context,
        });

        let req = CompletionRequest {
            session_id: session_id.to_string(),
            system_prompt: stable,
            system_dynamic_suffix: dynamic,
            messages: snapshot.conversation.messages.clone(),
            tools: self
                .tools
                .schemas()
                .into_iter()
                .map(|s| forge_model::ToolSchema { name: s.name, description: s.description, parameters: s.parameters })
                .collect(),
            continuation_handle: snapshot.previous_response_id.clone(),
            stream: true,
        };

        self.set_phase(tx, session_id, Phase::Streaming).await;

        let mut stream = self.adapter.stream(req, cancel).await?;
        let mut message_id: Option<String> = None;
        let mut blocks: Vec<ContentBlock> = Vec::new();
        let mut text_acc = String::new();
        let mut tool_uses: Vec<(String, String, serde_json::Value, Option<String>, Option<String>)> = Vec::new();

        while let Some(event) = stream.next().await {
            let event = match event {
                Ok(e) => e,
                Err(e) => {
                    self.set_phase(tx, session_id, Phase::Error).await;
                    self.emit(tx, session_id, EventPayload::Error { error: e.to_string() }).await;
                    return Ok(());
                }
            };
            match event {
                NormalizedEvent::MessageStart { id } => {
                    message_id = Some(id.clone());
                    self.emit(tx, session_id, EventPayload::StreamEvent { stream_event: StreamEventWire::MessageStart { id } }).await;
                }
                NormalizedEvent::TextDelta { text } => {
                    text_acc.push_str(&text);
                    self.emit(tx, session_id, EventPayload::StreamEvent { stream_event: StreamEventWire::TextDelta { text } }).await;
                }
                NormalizedEvent::TextEnd => {
                    if !text_acc.is_empty() {
                        blocks.push(ContentBlock::Text { text: std::mem::take(&mut text_acc) });
                    }
                    self.emit(tx, session_id, EventPayload::StreamEvent { stream_event: StreamEventWire::TextEnd }).await;
                }
                NormalizedEvent::ReasoningDelta { text } => {
                    self.emit(tx, session_id, EventPayload::StreamEvent { stream_event: StreamEventWire::ReasoningDelta { text } }).await;
                }
                NormalizedEvent::ReasoningEnd { .. } => {
                    self.emit(tx, session_id, EventPayload::StreamEvent { stream_event: StreamEventWire::ReasoningEnd }).await;
                }
                NormalizedEvent::ToolUse { id, name, input, description, continuation_handle } => {
                    blocks.push(ContentBlock::ToolUse { id: id.clone(), name: name.clone(), input: input.clone() });
                    tool_uses.push((id, name, input, description, continuation_handle));
                }
                NormalizedEvent::Usage { input, output, .. } => {
                    self.emit(tx, session_id, EventPayload::StreamEvent { stream_event: StreamEventWire::Usage { input, output } }).await;
                }
                NormalizedEvent::Stop { reason, error, continuation_handle } => {
                    if !text_acc.is_empty() {
                        blocks.push(ContentBlock::Text { text: std::mem::take(&mut text_acc) });
                    }
                    return self
                        .handle_stop(session_id, tx, reason, error, continuation_handle, message_id, blocks, tool_uses)
                        .await;
                }
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn handle_stop(
        &self,
        session_id: &str,
        tx: &EventSink,
        reason: StopReason,
        error: Option<String>,
        continuation_handle: Option<String>,
        message_id: Option<String>,
        blocks: Vec<ContentBlock>,
        tool_uses: Vec<(String, String, serde_json::Value, Option<String>, Option<String>)>,
    ) -> anyhow::Result<()> {
        let assistant_message = Message::assistant(message_id.unwrap_or_default(), blocks.clone());

        match reason {
            StopReason::EndTurn | StopReason::MaxTokens | StopReason::StopSequence => {
                self.store.record_assistant_final_message(session_id, assistant_message.clone()).await?;
                self.store.set_previous_response_id(session_id, continuation_handle).await?;
                self.set_phase(tx, session_id, Phase::Completed).await;
                self.emit(tx, session_id, EventPayload::StreamComplete { final_message: assistant_message }).await;
                self.push_terminal_completion(session_id).await;
            }
            StopReason::PauseTurn => {
                self.store.record_assistant_final_message(session_id, assistant_message).await?;
                self.store.set_previous_response_id(session_id, continuation_handle).await?;
                self.set_phase(tx, session_id, Phase::Paused).await;
            }
            StopReason::ToolUse => {
                self.store.record_assistant_final_message(session_id, assistant_message).await?;
                self.store.set_previous_response_id(session_id, continuation_handle.clone()).await?;
                self.open_tool_round(session_id, tx, continuation_handle, tool_uses).await?;
            }
            StopReason::Aborted => {
                self.store.set_previous_response_id(session_id, None).await?;
                self.set_phase(tx, session_id, Phase::Stopped).await;
                self.emit(tx, session_id, EventPayload::StreamComplete { final_message: assistant_message }).await;
            }
            StopReason::Error => {
                self.set_phase(tx, session_id, Phase::Error).await;
                self.emit(tx, session_id, EventPayload::Error { error: error.unwrap_or_else(|| "unknown provider error".into()) }).await;
            }
        }
        Ok(())
    }

    /// Populate the ledger for a tool_use stop, auto-approving where the
    /// session mode and safety class allow it, then either continue
    /// immediately (fully auto-approved batch) or surface the rest for
    /// approval (§4.6 "Event forwarding" + "Stop handling").
    async fn open_tool_round(
        &self,
        session_id: &str,
        tx: &EventSink,
        group_key: Option<String>,
        tool_uses: Vec<(String, String, serde_json::Value, Option<String>, Option<String>)>,
    ) -> anyhow::Result<()> {
        let snapshot = self.store.get_snapshot(session_id).await?;
        let mut pending_for_store = Vec::new();

        {
            let mut ledgers = self.ledgers.lock().await;
            let ledger = ledgers.entry(session_id.to_string()).or_default();

            for (id, name, input, description, handle) in &tool_uses {
                let call = ToolCall { id: id.clone(), name: name.clone(), args: input.clone() };
                let safety = self.tools.get(name).map(|t| t.safety_class(&call)).unwrap_or(SafetyClass::Dangerous);
                let auto_approved = snapshot.mode == SessionMode::AutoApproveSafe
                    && matches!(safety, SafetyClass::Safe | SafetyClass::Network);

                let decision = if auto_approved { ToolDecision::Approved } else { ToolDecision::Undecided };
                ledger.enqueue(PendingEntry {
                    tool_use_id: id.clone(),
                    name: name.clone(),
                    input: input.clone(),
                    description: description.clone(),
                    continuation_handle: handle.clone().or_else(|| group_key.clone()),
                    decision,
                });
                pending_for_store.push(forge_store::PendingTool {
                    id: id.clone(),
                    name: name.clone(),
                    input: input.clone(),
                    description: description.clone(),
                    continuation_handle: handle.clone().or_else(|| group_key.clone()),
                    decision,
                });
            }
        }

        self.store.set_pending_tools(session_id, pending_for_store).await?;
        self.set_phase(tx, session_id, Phase::AwaitingTool).await;

        for (id, name, input, description, _) in &tool_uses {
            self.emit(
                tx,
                session_id,
                EventPayload::ToolRequest {
                    tool_request: ToolRequestWire { id: id.clone(), name: name.clone(), input: input.clone(), description: description.clone() },
                },
            )
            .await;
        }

        let resolved = {
            let ledgers = self.ledgers.lock().await;
            ledgers.get(session_id).map(|l| l.is_group_resolved(group_key.as_deref())).unwrap_or(false)
        };
        if resolved {
            Box::pin(self.drain_and_continue(session_id, group_key.as_deref(), tx)).await?;
        }
        Ok(())
    }

    /// Execute every resolved tool in the group, batch the results into one
    /// user message (I1), and continue streaming.
    async fn drain_and_continue(&self, session_id: &str, group_key: Option<&str>, tx: &EventSink) -> anyhow::Result<()> {
        let drained = {
            let mut ledgers = self.ledgers.lock().await;
            let ledger = ledgers.entry(session_id.to_string()).or_default();
            ledger.drain_group(group_key)
        };
        if drained.is_empty() {
            return Ok(());
        }

        let snapshot = self.store.get_snapshot(session_id).await?;
        let working_dir = PathBuf::from(&snapshot.working_dir);

        let mut results = Vec::with_capacity(drained.len());
        for entry in drained {
            let (content, is_error) = if entry.decision == ToolDecision::Rejected {
                ("Tool use rejected by user".to_string(), true)
            } else {
                let call = ToolCall { id: entry.tool_use_id.clone(), name: entry.name.clone(), args: entry.input.clone() };
                let output = self.executor.execute(&call, session_id, &working_dir).await;
                (output.content.clone(), output.is_error)
            };

            self.emit(
                tx,
                session_id,
                EventPayload::ToolOutput {
                    tool_output: ToolOutputWire {
                        id: entry.tool_use_id.clone(),
                        tool_use_id: entry.tool_use_id.clone(),
                        name: entry.name.clone(),
                        output: content.clone(),
                        is_error,
                        input: entry.input.clone(),
                    },
                    message: Message::tool_results(None, vec![ToolResultBlock { tool_use_id: entry.tool_use_id.clone(), content: content.clone(), is_error }]),
                },
            )
            .await;

            results.push(ToolResultBlock { tool_use_id: entry.tool_use_id, content, is_error });
        }

        let message = Message::tool_results(None, results);
        self.store.record_tool_output_message(session_id, message).await?;
        self.store.set_pending_tools(session_id, Vec::new()).await?;
        self.drain_tool_push_events().await;

        self.set_phase(tx, session_id, Phase::Continuing).await;
        Box::pin(self.run_stream(session_id, tx)).await
    }
}
