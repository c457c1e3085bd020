// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Store-backed `WorkPlanStore` (§4.7, §4.1): keys the plan off the session
//! store instead of an in-process map, so it survives a restart and is
//! naturally scoped per session.

use std::sync::Arc;

use async_trait::async_trait;
use forge_store::{SessionStore, WorkPlanStatus};
use forge_tools::{WorkPlanItem as ToolWorkPlanItem, WorkPlanStore};

pub struct StoreBackedWorkPlan {
    store: Arc<SessionStore>,
}

impl StoreBackedWorkPlan {
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self { store }
    }
}

fn to_tool_items(items: &[forge_store::WorkPlanItem]) -> Vec<ToolWorkPlanItem> {
    items
        .iter()
        .map(|i| ToolWorkPlanItem {
            id: i.id.clone(),
            title: i.title.clone(),
            order: i.order,
            status: match i.status {
                WorkPlanStatus::Pending => "pending".to_string(),
                WorkPlanStatus::Complete => "complete".to_string(),
            },
            completed_at: i.completed_at.map(|t| t.to_rfc3339()),
        })
        .collect()
}

#[async_trait]
impl WorkPlanStore for StoreBackedWorkPlan {
    async fn create(
        &self,
        session_id: &str,
        items: Vec<(String, String, i64)>,
    ) -> Result<Vec<ToolWorkPlanItem>, String> {
        let snapshot = self.store.record_work_plan_create(session_id, items).await.map_err(|e| e.to_string())?;
        Ok(to_tool_items(&snapshot.work_plan.map(|p| p.items).unwrap_or_default()))
    }

    async fn complete(&self, session_id: &str, item_id: &str) -> Result<Vec<ToolWorkPlanItem>, String> {
        let before = self.store.get_snapshot(session_id).await.map_err(|e| e.to_string())?;
        let plan = before.work_plan.as_ref().ok_or_else(|| format!("no such work plan item: {item_id}"))?;
        let item = plan.items.iter().find(|i| i.id == item_id).ok_or_else(|| format!("no such work plan item: {item_id}"))?;
        if item.status == WorkPlanStatus::Complete {
            return Err(format!("item '{item_id}' is already complete"));
        }
        let snapshot = self.store.record_work_plan_complete(session_id, item_id).await.map_err(|e| e.to_string())?;
        Ok(to_tool_items(&snapshot.work_plan.map(|p| p.items).unwrap_or_default()))
    }

    async fn revise(
        &self,
        session_id: &str,
        upserts: Vec<(String, Option<String>, Option<i64>, bool)>,
    ) -> Result<Vec<ToolWorkPlanItem>, String> {
        let snapshot = self.store.record_work_plan_revise(session_id, upserts).await.map_err(|e| e.to_string())?;
        Ok(to_tool_items(&snapshot.work_plan.map(|p| p.items).unwrap_or_default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_store::SessionMode;
    use tempfile::tempdir;

    async fn plan() -> (StoreBackedWorkPlan, Arc<SessionStore>, String, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = Arc::new(SessionStore::new(dir.path()));
        let id = store.create_session("/ws", SessionMode::Interactive).await.unwrap();
        let plan = StoreBackedWorkPlan::new(store.clone());
        (plan, store, id, dir)
    }

    #[tokio::test]
    async fn create_then_complete_round_trips_through_the_store() {
        let (plan, store, id, _dir) = plan().await;
        let items = plan.create(&id, vec![("a".into(), "A".into(), 1)]).await.unwrap();
        assert_eq!(items[0].status, "pending");

        let items = plan.complete(&id, "a").await.unwrap();
        assert_eq!(items[0].status, "complete");
        assert!(items[0].completed_at.is_some());

        let snapshot = store.get_snapshot(&id).await.unwrap();
        assert_eq!(snapshot.work_plan.unwrap().items[0].status, WorkPlanStatus::Complete);
    }

    #[tokio::test]
    async fn completing_twice_is_an_error() {
        let (plan, _store, id, _dir) = plan().await;
        plan.create(&id, vec![("a".into(), "A".into(), 1)]).await.unwrap();
        plan.complete(&id, "a").await.unwrap();
        assert!(plan.complete(&id, "a").await.is_err());
    }

    #[tokio::test]
    async fn completing_unknown_item_is_an_error() {
        let (plan, _store, id, _dir) = plan().await;
        plan.create(&id, vec![("a".into(), "A".into(), 1)]).await.unwrap();
        assert!(plan.complete(&id, "missing").await.is_err());
    }

    #[tokio::test]
    async fn revise_upserts_and_removes() {
        let (plan, _store, id, _dir) = plan().await;
        plan.create(&id, vec![("a".into(), "A".into(), 1)]).await.unwrap();
        let items = plan.revise(&id, vec![("a".into(), None, None, true), ("b".into(), Some("B".into()), Some(1), false)]).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "b");
    }
}
