// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT

/// A single item in the session's work plan (§4.7).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct WorkPlanItem {
    pub id: String,
    pub title: String,
    pub order: i64,
    /// One of: "pending", "complete"
    pub status: String,
    pub completed_at: Option<String>,
}

/// Push-notification kind for a work-plan mutation (§4.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushKind {
    Created,
    Next,
    Completed,
}

/// A push notification emitted alongside a work-plan mutation, forwarded to
/// the Push Dispatcher collaborator (§6) by whatever owns this tool.
#[derive(Debug, Clone)]
pub struct PushNotification {
    pub kind: PushKind,
    pub step_index: usize,
    pub total: usize,
    /// Truncated to 120 chars with ellipsis per §4.10.
    pub task_title: String,
}

/// Events emitted by tools to communicate state changes back to the turn
/// engine, which forwards plan updates and push notifications. The registry
/// (and its `event_tx`) is shared by every session, so each event is tagged
/// with the session it originated from.
#[derive(Debug, Clone)]
pub enum ToolEvent {
    WorkPlanUpdate { session_id: String, items: Vec<WorkPlanItem> },
    Push { session_id: String, notification: PushNotification },
}

/// Truncate `title` to 120 chars with an ellipsis, per §4.10.
pub fn truncate_task_title(title: &str) -> String {
    const LIMIT: usize = 120;
    if title.chars().count() <= LIMIT {
        return title.to_string();
    }
    let truncated: String = title.chars().take(LIMIT.saturating_sub(1)).collect();
    format!("{truncated}…")
}
