// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Durable shapes written to `snapshot.json` / `index.json` (§4.1, §6).

use chrono::{DateTime, Utc};
use forge_model::Message;
use serde::{Deserialize, Serialize};

/// Session-level approval mode (§3 "Mode"): interactive confirmation for
/// every non-safe tool, or auto-approval of `safe`/`network` tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    Interactive,
    AutoApproveSafe,
}

impl Default for SessionMode {
    fn default() -> Self {
        SessionMode::Interactive
    }
}

/// Turn Engine phase (§4.6). Lives on the snapshot so a crash-restarted
/// session can report where it was left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Created,
    Starting,
    Ready,
    Streaming,
    Reasoning,
    AwaitingTool,
    ToolRunning,
    Continuing,
    Paused,
    Completed,
    Error,
    Stopped,
}

/// A pending tool request awaiting (or holding) an approval decision (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingTool {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
    pub description: Option<String>,
    pub continuation_handle: Option<String>,
    pub decision: ToolDecision,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolDecision {
    Undecided,
    Approved,
    Rejected,
}

/// Work plan item (§3, §4.7).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkPlanItem {
    pub id: String,
    pub title: String,
    pub order: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_seconds: Option<u64>,
    pub status: WorkPlanStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkPlanStatus {
    Pending,
    Complete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkPlan {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<WorkPlanItem>,
}

/// Cached result of the project-context loader collaborator (§4.6 step 2,
/// §6). Loaded at most once per session and reused for every subsequent turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectContext {
    pub source: String,
    pub path: String,
    pub content: String,
}

/// The authoritative, serialized projection of one session (§4.1, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub message_count: usize,
    pub working_dir: String,
    pub mode: SessionMode,
    pub phase: Phase,
    #[serde(default)]
    pub pending_tools: Vec<PendingTool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initiator_device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_response_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_plan: Option<WorkPlan>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_context: Option<ProjectContext>,
    pub conversation: Conversation,
    pub last_seq: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Conversation {
    pub messages: Vec<Message>,
}

impl Snapshot {
    pub fn new(id: String, working_dir: String, mode: SessionMode) -> Self {
        let now = Utc::now();
        Self {
            id,
            title: None,
            created_at: now,
            last_activity: now,
            message_count: 0,
            working_dir,
            mode,
            phase: Phase::Created,
            pending_tools: Vec::new(),
            initiator_device_id: None,
            previous_response_id: None,
            work_plan: None,
            project_context: None,
            conversation: Conversation::default(),
            last_seq: 0,
        }
    }
}

/// Lightweight per-session metadata for `listSessions` (§4.1), kept in
/// `index.json` so enumeration never requires reading every snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionIndexItem {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub working_dir: String,
    pub phase: Phase,
}

impl From<&Snapshot> for SessionIndexItem {
    fn from(s: &Snapshot) -> Self {
        Self {
            id: s.id.clone(),
            title: s.title.clone(),
            created_at: s.created_at,
            last_activity: s.last_activity,
            working_dir: s.working_dir.clone(),
            phase: s.phase,
        }
    }
}
