// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Push Dispatcher collaborator (§4.10, §6): fire-and-forget delivery of
//! lifecycle notifications to a session's initiator device. The actual
//! push-delivery HTTP client is an external collaborator (§1 non-goals);
//! this module only defines the seam and a logging stand-in for it.

use async_trait::async_trait;
use forge_tools::PushKind;
use tracing::debug;

/// One outbound notification, addressed to a device (§4.10).
#[derive(Debug, Clone)]
pub struct PushMessage {
    pub device_id: String,
    pub session_id: String,
    pub session_title: String,
    pub kind: PushKind,
    pub step_index: usize,
    pub total: usize,
    pub task_title: String,
}

/// `send(messages[])`, fire-and-forget (§6). Implementations must not let a
/// delivery failure propagate back into the turn engine (§4.10).
#[async_trait]
pub trait PushDispatcher: Send + Sync {
    async fn send(&self, messages: Vec<PushMessage>);
}

/// Default dispatcher: logs what would have been sent. The real HTTP
/// delivery client is out of scope here; a production deployment swaps this
/// for one that calls it.
#[derive(Default)]
pub struct LoggingPushDispatcher;

#[async_trait]
impl PushDispatcher for LoggingPushDispatcher {
    async fn send(&self, messages: Vec<PushMessage>) {
        for m in messages {
            debug!(
                device = %m.device_id,
                session = %m.session_id,
                kind = ?m.kind,
                step = m.step_index,
                total = m.total,
                task = %m.task_title,
                "push notification"
            );
        }
    }
}
