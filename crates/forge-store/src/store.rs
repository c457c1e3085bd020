// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Durable, crash-safe session store (C1, §4.1).
//!
//! Layout: `<root>/<sessionId>/snapshot.json` (authoritative) + `events.jsonl`
//! (best-effort journal), plus a shared `<root>/index.json` for enumeration.
//! Writes are atomic via temp-file + rename. Per-session writes are
//! serialized through an in-process lock (I6); reads never block on it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use forge_model::Message;
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

use crate::schema::{
    Conversation, PendingTool, Phase, ProjectContext, SessionIndexItem, SessionMode, Snapshot,
    ToolDecision, WorkPlan, WorkPlanItem, WorkPlanStatus,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("session not found: {0}")]
    NotFound(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

pub struct SessionStore {
    root: PathBuf,
    /// Per-session FIFO write lock (I6: single writer per session).
    write_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    /// Serializes `index.json` rewrites, independent of any one session lock.
    index_lock: Mutex<()>,
}

impl SessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_locks: Mutex::new(HashMap::new()),
            index_lock: Mutex::new(()),
        }
    }

    fn session_dir(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    fn snapshot_path(&self, id: &str) -> PathBuf {
        self.session_dir(id).join("snapshot.json")
    }

    fn events_path(&self, id: &str) -> PathBuf {
        self.session_dir(id).join("events.jsonl")
    }

    fn index_path(&self) -> PathBuf {
        self.root.join("index.json")
    }

    async fn lock_for(&self, id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.write_locks.lock().await;
        locks.entry(id.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Durable atomic write: `path.tmp` then rename.
    async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// Consistent read of the latest committed snapshot. Never blocks on the
    /// write lock (§4.1: "need not block writers").
    pub async fn get_snapshot(&self, id: &str) -> Result<Snapshot> {
        let bytes = tokio::fs::read(self.snapshot_path(id))
            .await
            .map_err(|_| StoreError::NotFound(id.to_string()))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub async fn list_sessions(&self, working_dir_filter: Option<&str>) -> Vec<SessionIndexItem> {
        let bytes = match tokio::fs::read(self.index_path()).await {
            Ok(b) => b,
            Err(_) => return Vec::new(),
        };
        let items: Vec<SessionIndexItem> = serde_json::from_slice(&bytes).unwrap_or_default();
        match working_dir_filter {
            Some(wd) => items.into_iter().filter(|i| i.working_dir == wd).collect(),
            None => items,
        }
    }

    async fn append_event(&self, id: &str, line: &serde_json::Value) {
        let path = self.events_path(id);
        let mut text = line.to_string();
        text.push('\n');
        if let Some(parent) = path.parent() {
            let _ = tokio::fs::create_dir_all(parent).await;
        }
        use tokio::io::AsyncWriteExt;
        match tokio::fs::OpenOptions::new().create(true).append(true).open(&path).await {
            Ok(mut f) => {
                if let Err(e) = f.write_all(text.as_bytes()).await {
                    warn!(session = %id, error = %e, "event journal append failed");
                }
            }
            Err(e) => warn!(session = %id, error = %e, "could not open event journal"),
        }
    }

    async fn update_index(&self, snapshot: &Snapshot) -> Result<()> {
        let _guard = self.index_lock.lock().await;
        let mut items = self.list_sessions(None).await;
        items.retain(|i| i.id != snapshot.id);
        items.push(SessionIndexItem::from(snapshot));
        let bytes = serde_json::to_vec_pretty(&items)?;
        Self::write_atomic(&self.index_path(), &bytes).await
    }

    async fn remove_from_index(&self, id: &str) -> Result<()> {
        let _guard = self.index_lock.lock().await;
        let mut items = self.list_sessions(None).await;
        items.retain(|i| i.id != id);
        let bytes = serde_json::to_vec_pretty(&items)?;
        Self::write_atomic(&self.index_path(), &bytes).await
    }

    /// Commit a snapshot mutation under the session's write lock, persisting
    /// the result and updating the index.
    async fn commit(&self, id: &str, mutate: impl FnOnce(&mut Snapshot)) -> Result<Snapshot> {
        let lock = self.lock_for(id).await;
        let _guard = lock.lock().await;

        let mut snapshot = match self.get_snapshot(id).await {
            Ok(s) => s,
            Err(StoreError::NotFound(_)) => return Err(StoreError::NotFound(id.to_string())),
            Err(e) => return Err(e),
        };
        mutate(&mut snapshot);
        snapshot.last_activity = Utc::now();

        let bytes = serde_json::to_vec_pretty(&snapshot)?;
        Self::write_atomic(&self.snapshot_path(id), &bytes).await?;
        self.update_index(&snapshot).await?;
        Ok(snapshot)
    }

    // ── Operations (§4.1) ─────────────────────────────────────────────────

    pub async fn create_session(&self, working_dir: &str, mode: SessionMode) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let snapshot = Snapshot::new(id.clone(), working_dir.to_string(), mode);
        let bytes = serde_json::to_vec_pretty(&snapshot)?;
        Self::write_atomic(&self.snapshot_path(&id), &bytes).await?;
        self.update_index(&snapshot).await?;
        Ok(id)
    }

    pub async fn update_title(&self, id: &str, title: &str) -> Result<Snapshot> {
        let title = title.to_string();
        self.commit(id, |s| s.title = Some(title)).await
    }

    pub async fn record_user_message(
        &self,
        id: &str,
        message: Message,
        working_dir: &str,
        mode: SessionMode,
    ) -> Result<Snapshot> {
        let working_dir = working_dir.to_string();
        let snapshot = self
            .commit(id, |s| {
                s.working_dir = working_dir;
                s.mode = mode;
                s.conversation.messages.push(message);
                s.message_count = s.conversation.messages.len();
            })
            .await?;
        self.append_event(id, &serde_json::json!({"type": "user_message", "ts": Utc::now()})).await;
        Ok(snapshot)
    }

    /// Merge-by-id if `message.id` already exists in the conversation (I3),
    /// otherwise append.
    pub async fn record_assistant_final_message(&self, id: &str, message: Message) -> Result<Snapshot> {
        self.commit(id, |s| {
            if let Some(mid) = &message.id {
                if let Some(existing) = s.conversation.messages.iter_mut().find(|m| m.id.as_deref() == Some(mid)) {
                    *existing = message;
                    s.message_count = s.conversation.messages.len();
                    return;
                }
            }
            s.conversation.messages.push(message);
            s.message_count = s.conversation.messages.len();
        })
        .await
    }

    pub async fn record_tool_output_message(&self, id: &str, message: Message) -> Result<Snapshot> {
        self.commit(id, |s| {
            s.conversation.messages.push(message);
            s.message_count = s.conversation.messages.len();
        })
        .await
    }

    pub async fn record_status(&self, id: &str, phase: Phase) -> Result<Snapshot> {
        self.commit(id, |s| s.phase = phase).await
    }

    pub async fn set_previous_response_id(&self, id: &str, handle: Option<String>) -> Result<Snapshot> {
        self.commit(id, |s| s.previous_response_id = handle).await
    }

    pub async fn set_initiator(&self, id: &str, device_id: &str) -> Result<Snapshot> {
        let device_id = device_id.to_string();
        self.commit(id, |s| {
            if s.initiator_device_id.is_none() {
                s.initiator_device_id = Some(device_id);
            }
        })
        .await
    }

    /// Cache the project-context loader's result on the session (§4.6 step
    /// 2). First write only — later turns reuse what was loaded for the
    /// first, even if the working directory's content has since changed.
    pub async fn set_project_context(&self, id: &str, context: ProjectContext) -> Result<Snapshot> {
        self.commit(id, |s| {
            if s.project_context.is_none() {
                s.project_context = Some(context);
            }
        })
        .await
    }

    pub async fn set_pending_tools(&self, id: &str, pending: Vec<PendingTool>) -> Result<Snapshot> {
        self.commit(id, |s| s.pending_tools = pending).await
    }

    pub async fn set_pending_tool_decision(&self, id: &str, tool_id: &str, approved: bool) -> Result<Snapshot> {
        let tool_id = tool_id.to_string();
        self.commit(id, |s| {
            if let Some(pt) = s.pending_tools.iter_mut().find(|p| p.id == tool_id) {
                if pt.decision == ToolDecision::Undecided {
                    pt.decision = if approved { ToolDecision::Approved } else { ToolDecision::Rejected };
                }
            }
        })
        .await
    }

    /// §4.7 `create`: replaces the plan, sorted by `order`, status=pending.
    pub async fn record_work_plan_create(&self, id: &str, items: Vec<(String, String, i64)>) -> Result<Snapshot> {
        self.commit(id, |s| {
            let now = Utc::now();
            let mut items: Vec<WorkPlanItem> = items
                .into_iter()
                .map(|(item_id, title, order)| WorkPlanItem {
                    id: item_id,
                    title,
                    order,
                    estimated_seconds: None,
                    status: WorkPlanStatus::Pending,
                    completed_at: None,
                })
                .collect();
            items.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
            s.work_plan = Some(WorkPlan { created_at: now, updated_at: now, items });
        })
        .await
    }

    /// §4.7 `complete`: first transition only (I5).
    pub async fn record_work_plan_complete(&self, id: &str, item_id: &str) -> Result<Snapshot> {
        let item_id = item_id.to_string();
        self.commit(id, |s| {
            if let Some(plan) = &mut s.work_plan {
                if let Some(item) = plan.items.iter_mut().find(|i| i.id == item_id) {
                    if item.status == WorkPlanStatus::Pending {
                        item.status = WorkPlanStatus::Complete;
                        item.completed_at = Some(Utc::now());
                        plan.updated_at = Utc::now();
                    }
                }
            }
        })
        .await
    }

    /// §4.7 `revise`: upsert by id; `remove` deletes; missing `order` appended.
    pub async fn record_work_plan_revise(
        &self,
        id: &str,
        upserts: Vec<(String, Option<String>, Option<i64>, bool)>,
    ) -> Result<Snapshot> {
        self.commit(id, |s| {
            let plan = s.work_plan.get_or_insert_with(|| WorkPlan {
                created_at: Utc::now(),
                updated_at: Utc::now(),
                items: Vec::new(),
            });
            let mut next_order = plan.items.iter().map(|i| i.order).max().unwrap_or(0) + 1;
            for (item_id, title, order, remove) in upserts {
                if remove {
                    plan.items.retain(|i| i.id != item_id);
                    continue;
                }
                if let Some(existing) = plan.items.iter_mut().find(|i| i.id == item_id) {
                    if let Some(t) = title {
                        existing.title = t;
                    }
                    if let Some(o) = order {
                        existing.order = o;
                    }
                } else {
                    let order = order.unwrap_or_else(|| {
                        let o = next_order;
                        next_order += 1;
                        o
                    });
                    plan.items.push(WorkPlanItem {
                        id: item_id,
                        title: title.unwrap_or_default(),
                        order,
                        estimated_seconds: None,
                        status: WorkPlanStatus::Pending,
                        completed_at: None,
                    });
                }
            }
            plan.items.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
            plan.updated_at = Utc::now();
        })
        .await
    }

    pub async fn clear_session(&self, id: &str) -> Result<()> {
        let _guard = self.lock_for(id).await;
        let _ = tokio::fs::remove_dir_all(self.session_dir(id)).await;
        self.remove_from_index(id).await
    }

    /// Returns and persists the next outbound sequence number (I2).
    pub async fn next_seq(&self, id: &str) -> Result<u64> {
        let snapshot = self.commit(id, |s| s.last_seq += 1).await?;
        Ok(snapshot.last_seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_model::Message;
    use tempfile::tempdir;

    fn store() -> (SessionStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        (SessionStore::new(dir.path()), dir)
    }

    #[tokio::test]
    async fn create_session_is_retrievable() {
        let (store, _dir) = store();
        let id = store.create_session("/ws", SessionMode::Interactive).await.unwrap();
        let snap = store.get_snapshot(&id).await.unwrap();
        assert_eq!(snap.working_dir, "/ws");
        assert_eq!(snap.phase, Phase::Created);
    }

    #[tokio::test]
    async fn get_snapshot_missing_is_not_found() {
        let (store, _dir) = store();
        let err = store.get_snapshot("nope").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn record_user_message_increments_count() {
        let (store, _dir) = store();
        let id = store.create_session("/ws", SessionMode::Interactive).await.unwrap();
        store
            .record_user_message(&id, Message::user("hi"), "/ws", SessionMode::Interactive)
            .await
            .unwrap();
        let snap = store.get_snapshot(&id).await.unwrap();
        assert_eq!(snap.message_count, 1);
    }

    // P6: concurrent writes commute to a total order.
    #[tokio::test]
    async fn concurrent_user_messages_all_commit() {
        let (store, _dir) = store();
        let id = store.create_session("/ws", SessionMode::Interactive).await.unwrap();
        let store = Arc::new(store);
        let mut handles = Vec::new();
        for i in 0..20 {
            let store = store.clone();
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                store
                    .record_user_message(&id, Message::user(format!("msg{i}")), "/ws", SessionMode::Interactive)
                    .await
                    .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        let snap = store.get_snapshot(&id).await.unwrap();
        assert_eq!(snap.message_count, 20);
    }

    #[tokio::test]
    async fn assistant_message_merges_by_id() {
        let (store, _dir) = store();
        let id = store.create_session("/ws", SessionMode::Interactive).await.unwrap();
        store
            .record_assistant_final_message(&id, Message::assistant("m1", vec![]))
            .await
            .unwrap();
        store
            .record_assistant_final_message(
                &id,
                Message::assistant("m1", vec![forge_model::ContentBlock::Text { text: "final".into() }]),
            )
            .await
            .unwrap();
        let snap = store.get_snapshot(&id).await.unwrap();
        assert_eq!(snap.conversation.messages.len(), 1);
        assert_eq!(snap.conversation.messages[0].as_text(), "final");
    }

    #[tokio::test]
    async fn work_plan_create_sorts_by_order() {
        let (store, _dir) = store();
        let id = store.create_session("/ws", SessionMode::Interactive).await.unwrap();
        store
            .record_work_plan_create(&id, vec![("b".into(), "B".into(), 2), ("a".into(), "A".into(), 1)])
            .await
            .unwrap();
        let snap = store.get_snapshot(&id).await.unwrap();
        let plan = snap.work_plan.unwrap();
        assert_eq!(plan.items[0].id, "a");
        assert_eq!(plan.items[1].id, "b");
    }

    #[tokio::test]
    async fn work_plan_complete_is_first_transition_only() {
        let (store, _dir) = store();
        let id = store.create_session("/ws", SessionMode::Interactive).await.unwrap();
        store.record_work_plan_create(&id, vec![("a".into(), "A".into(), 1)]).await.unwrap();
        store.record_work_plan_complete(&id, "a").await.unwrap();
        let first_completed_at = store.get_snapshot(&id).await.unwrap().work_plan.unwrap().items[0].completed_at;
        store.record_work_plan_complete(&id, "a").await.unwrap();
        let second_completed_at = store.get_snapshot(&id).await.unwrap().work_plan.unwrap().items[0].completed_at;
        assert_eq!(first_completed_at, second_completed_at);
    }

    #[tokio::test]
    async fn work_plan_revise_removes_item() {
        let (store, _dir) = store();
        let id = store.create_session("/ws", SessionMode::Interactive).await.unwrap();
        store.record_work_plan_create(&id, vec![("a".into(), "A".into(), 1)]).await.unwrap();
        store
            .record_work_plan_revise(&id, vec![("a".into(), None, None, true)])
            .await
            .unwrap();
        let snap = store.get_snapshot(&id).await.unwrap();
        assert!(snap.work_plan.unwrap().items.is_empty());
    }

    #[tokio::test]
    async fn set_initiator_first_write_only() {
        let (store, _dir) = store();
        let id = store.create_session("/ws", SessionMode::Interactive).await.unwrap();
        store.set_initiator(&id, "device-a").await.unwrap();
        store.set_initiator(&id, "device-b").await.unwrap();
        let snap = store.get_snapshot(&id).await.unwrap();
        assert_eq!(snap.initiator_device_id.as_deref(), Some("device-a"));
    }

    #[tokio::test]
    async fn set_project_context_first_write_only() {
        let (store, _dir) = store();
        let id = store.create_session("/ws", SessionMode::Interactive).await.unwrap();
        store
            .set_project_context(&id, ProjectContext { source: "AGENTS.md".into(), path: "/ws/AGENTS.md".into(), content: "first".into() })
            .await
            .unwrap();
        store
            .set_project_context(&id, ProjectContext { source: "AGENTS.md".into(), path: "/ws/AGENTS.md".into(), content: "second".into() })
            .await
            .unwrap();
        let snap = store.get_snapshot(&id).await.unwrap();
        assert_eq!(snap.project_context.unwrap().content, "first");
    }

    #[tokio::test]
    async fn next_seq_strictly_increases() {
        let (store, _dir) = store();
        let id = store.create_session("/ws", SessionMode::Interactive).await.unwrap();
        let a = store.next_seq(&id).await.unwrap();
        let b = store.next_seq(&id).await.unwrap();
        assert_eq!(a, 1);
        assert_eq!(b, 2);
    }

    #[tokio::test]
    async fn clear_session_removes_from_index() {
        let (store, _dir) = store();
        let id = store.create_session("/ws", SessionMode::Interactive).await.unwrap();
        store.clear_session(&id).await.unwrap();
        assert!(store.get_snapshot(&id).await.is_err());
        assert!(store.list_sessions(None).await.is_empty());
    }

    #[tokio::test]
    async fn list_sessions_filters_by_working_dir() {
        let (store, _dir) = store();
        store.create_session("/ws/a", SessionMode::Interactive).await.unwrap();
        store.create_session("/ws/b", SessionMode::Interactive).await.unwrap();
        let filtered = store.list_sessions(Some("/ws/a")).await;
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].working_dir, "/ws/a");
    }

    #[tokio::test]
    async fn snapshot_round_trip_preserves_fields() {
        let (store, _dir) = store();
        let id = store.create_session("/ws", SessionMode::AutoApproveSafe).await.unwrap();
        store.update_title(&id, "My Title").await.unwrap();
        let snap = store.get_snapshot(&id).await.unwrap();
        assert_eq!(snap.title.as_deref(), Some("My Title"));
        assert_eq!(snap.mode, SessionMode::AutoApproveSafe);
    }
}
