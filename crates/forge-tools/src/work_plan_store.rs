// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Persistence collaborator for the `work_plan` tool (§4.7). Defined here so
//! `forge-tools` stays independent of `forge-store`; the turn engine supplies
//! a real implementation backed by the session store, keyed per session.

use async_trait::async_trait;

use crate::events::WorkPlanItem;

/// Per-session work plan storage. `complete` must error (rather than
/// silently no-op) when the item is unknown or already complete, so the
/// tool can surface that to the model.
#[async_trait]
pub trait WorkPlanStore: Send + Sync {
    async fn create(
        &self,
        session_id: &str,
        items: Vec<(String, String, i64)>,
    ) -> Result<Vec<WorkPlanItem>, String>;

    async fn complete(&self, session_id: &str, item_id: &str) -> Result<Vec<WorkPlanItem>, String>;

    async fn revise(
        &self,
        session_id: &str,
        upserts: Vec<(String, Option<String>, Option<i64>, bool)>,
    ) -> Result<Vec<WorkPlanItem>, String>;
}

/// Simple in-process implementation, one plan per session id. Used as the
/// default when nothing more durable is wired in (tests, the registry's own
/// unit tests); the server binary wires a store-backed implementation
/// instead so plans survive a restart.
#[derive(Default)]
pub struct InMemoryWorkPlanStore {
    sessions: tokio::sync::Mutex<std::collections::HashMap<String, Vec<WorkPlanItem>>>,
}

#[async_trait]
impl WorkPlanStore for InMemoryWorkPlanStore {
    async fn create(
        &self,
        session_id: &str,
        items: Vec<(String, String, i64)>,
    ) -> Result<Vec<WorkPlanItem>, String> {
        let mut built: Vec<WorkPlanItem> = items
            .into_iter()
            .map(|(id, title, order)| WorkPlanItem { id, title, order, status: "pending".into(), completed_at: None })
            .collect();
        built.sort_by_key(|i| i.order);
        self.sessions.lock().await.insert(session_id.to_string(), built.clone());
        Ok(built)
    }

    async fn complete(&self, session_id: &str, item_id: &str) -> Result<Vec<WorkPlanItem>, String> {
        let mut sessions = self.sessions.lock().await;
        let items = sessions.entry(session_id.to_string()).or_default();
        let idx = items
            .iter()
            .position(|i| i.id == item_id)
            .ok_or_else(|| format!("no such work plan item: {item_id}"))?;
        if items[idx].status == "complete" {
            return Err(format!("item '{item_id}' is already complete"));
        }
        items[idx].status = "complete".into();
        items[idx].completed_at = Some(chrono::Utc::now().to_rfc3339());
        Ok(items.clone())
    }

    async fn revise(
        &self,
        session_id: &str,
        upserts: Vec<(String, Option<String>, Option<i64>, bool)>,
    ) -> Result<Vec<WorkPlanItem>, String> {
        let mut sessions = self.sessions.lock().await;
        let items = sessions.entry(session_id.to_string()).or_default();
        let mut next_order = items.iter().map(|i| i.order).max().unwrap_or(0) + 1;
        for (id, title, order, remove) in upserts {
            if remove {
                items.retain(|i| i.id != id);
                continue;
            }
            match items.iter_mut().find(|i| i.id == id) {
                Some(existing) => {
                    if let Some(t) = title {
                        existing.title = t;
                    }
                    if let Some(o) = order {
                        existing.order = o;
                    }
                }
                None => {
                    let order = order.unwrap_or_else(|| {
                        let o = next_order;
                        next_order += 1;
                        o
                    });
                    items.push(WorkPlanItem { id, title: title.unwrap_or_default(), order, status: "pending".into(), completed_at: None });
                }
            }
        }
        items.sort_by_key(|i| i.order);
        Ok(items.clone())
    }
}
