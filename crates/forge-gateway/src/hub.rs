// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! `SessionHub` — the bridge between transport handlers (WebSocket today)
//! and the Turn Engine (C6). A handler forwards a decoded `ClientMessage`;
//! the hub runs the corresponding engine call and fans resulting envelopes
//! out to every subscribed connection over a broadcast channel (C7).

use std::sync::Arc;

use forge_core::{Envelope, EventPayload, TurnEngine};
use tokio::sync::{broadcast, mpsc};
use tracing::warn;

use crate::protocol::ClientMessage;

const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Clone)]
pub struct SessionHub {
    engine: Arc<TurnEngine>,
    event_tx: broadcast::Sender<Envelope>,
}

impl SessionHub {
    pub fn new(engine: Arc<TurnEngine>) -> Self {
        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { engine, event_tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.event_tx.subscribe()
    }

    /// Dispatch one inbound client message. Turn execution runs on a spawned
    /// task so a slow provider stream never blocks the connection's receive
    /// loop from handling `agent:stop` or further messages.
    pub async fn dispatch(&self, msg: ClientMessage) {
        match msg {
            ClientMessage::Message { session_id, content, working_dir, max_mode, device_id, .. } => {
                let engine = self.engine.clone();
                let broadcast_tx = self.event_tx.clone();
                tokio::spawn(async move {
                    let (fwd_tx, fwd_rx) = mpsc::channel(256);
                    tokio::spawn(forward(fwd_rx, broadcast_tx));
                    let working_dir = working_dir.unwrap_or_else(|| ".".to_string());
                    match engine
                        .submit_message(session_id.as_deref(), &content, &working_dir, max_mode, &fwd_tx)
                        .await
                    {
                        Ok(session_id) => {
                            if let Some(device_id) = device_id {
                                if let Err(e) = engine.store().set_initiator(&session_id, &device_id).await {
                                    warn!(error = %e, "set_initiator failed");
                                }
                            }
                        }
                        Err(e) => warn!(error = %e, "submit_message failed"),
                    }
                });
            }
            ClientMessage::ToolResponse { session_id, tool_response } => {
                let engine = self.engine.clone();
                let broadcast_tx = self.event_tx.clone();
                tokio::spawn(async move {
                    let (fwd_tx, fwd_rx) = mpsc::channel(256);
                    tokio::spawn(forward(fwd_rx, broadcast_tx));
                    if let Err(e) = engine
                        .submit_tool_response(&session_id, &tool_response.id, tool_response.approved, &fwd_tx)
                        .await
                    {
                        warn!(error = %e, "submit_tool_response failed");
                    }
                });
            }
            ClientMessage::Stop { session_id } => {
                self.engine.cancel(&session_id).await;
            }
            ClientMessage::GenerateTitle { content } => {
                let engine = self.engine.clone();
                let broadcast_tx = self.event_tx.clone();
                tokio::spawn(async move {
                    let title = engine.generate_title(&content).await;
                    let env = Envelope::new("", 0, EventPayload::Title { title });
                    let _ = broadcast_tx.send(env);
                });
            }
        }
    }
}

async fn forward(mut rx: mpsc::Receiver<Envelope>, broadcast_tx: broadcast::Sender<Envelope>) {
    while let Some(env) = rx.recv().await {
        // No subscribers is not an error; the session still runs and
        // persists, the client just missed the live stream.
        let _ = broadcast_tx.send(env);
    }
}
