// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::debug;

use crate::events::{truncate_task_title, PushKind, PushNotification, ToolEvent, WorkPlanItem};
use crate::policy::SafetyClass;
use crate::tool::{Tool, ToolCall, ToolContext, ToolOutput};
use crate::work_plan_store::WorkPlanStore;

/// Mutates the session's work plan (§4.7) and raises push notifications
/// (§4.10) on creation and completion. The plan itself is persisted by
/// `store`, keyed per session (§3) rather than held in this tool.
pub struct WorkPlanTool {
    store: Arc<dyn WorkPlanStore>,
    event_tx: mpsc::Sender<ToolEvent>,
}

impl WorkPlanTool {
    pub fn new(store: Arc<dyn WorkPlanStore>, event_tx: mpsc::Sender<ToolEvent>) -> Self {
        Self { store, event_tx }
    }

    async fn push(&self, session_id: &str, kind: PushKind, step_index: usize, total: usize, task_title: &str) {
        let _ = self
            .event_tx
            .send(ToolEvent::Push {
                session_id: session_id.to_string(),
                notification: PushNotification {
                    kind,
                    step_index,
                    total,
                    task_title: truncate_task_title(task_title),
                },
            })
            .await;
    }
}

fn parse_item(v: &Value) -> Result<(String, String, i64), String> {
    let id = v.get("id").and_then(|x| x.as_str()).ok_or("item missing 'id'")?.to_string();
    let title = v.get("title").and_then(|x| x.as_str()).ok_or_else(|| format!("item '{id}' missing 'title'"))?.to_string();
    let order = v.get("order").and_then(|x| x.as_i64()).ok_or_else(|| format!("item '{id}' missing 'order'"))?;
    Ok((id, title, order))
}

#[async_trait]
impl Tool for WorkPlanTool {
    fn name(&self) -> &str {
        "work_plan"
    }

    fn description(&self) -> &str {
        "Maintain the session's work plan, a user-visible checklist that also drives push \
         notifications to the initiating device.\n\
         Commands:\n\
         - create{items:[{id,title,order}]} — replaces the plan entirely, sorted by order.\n\
         - complete{id} — marks one item done; first transition only.\n\
         - revise{items:[{id,title?,order?,remove?}]} — upsert by id; remove=true deletes \
           the item; missing orders are appended after the existing ones."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "enum": ["create", "complete", "revise"]
                },
                "items": {
                    "type": "array",
                    "description": "Required for create/revise",
                    "items": {
                        "type": "object",
                        "properties": {
                            "id": {"type": "string"},
                            "title": {"type": "string"},
                            "order": {"type": "integer"},
                            "remove": {"type": "boolean"}
                        },
                        "required": ["id"]
                    }
                },
                "id": {
                    "type": "string",
                    "description": "Required for complete"
                }
            },
            "required": ["command"],
            "additionalProperties": false
        })
    }

    fn safety_class(&self, _call: &ToolCall) -> SafetyClass {
        SafetyClass::Safe
    }

    async fn execute(&self, call: &ToolCall, ctx: &ToolContext<'_>) -> ToolOutput {
        let command = match call.args.get("command").and_then(|v| v.as_str()) {
            Some(c) => c.to_string(),
            None => return ToolOutput::err(&call.id, "missing 'command'"),
        };

        debug!(command = %command, "work_plan tool");

        match command.as_str() {
            "create" => self.create(call, &call.args, ctx).await,
            "complete" => self.complete(call, &call.args, ctx).await,
            "revise" => self.revise(call, &call.args, ctx).await,
            other => ToolOutput::err(&call.id, format!("unknown command: {other}")),
        }
    }
}

impl WorkPlanTool {
    async fn create(&self, call: &ToolCall, args: &Value, ctx: &ToolContext<'_>) -> ToolOutput {
        let raw = match args.get("items").and_then(|v| v.as_array()) {
            Some(a) => a,
            None => return ToolOutput::err(&call.id, "create requires 'items'"),
        };

        let mut parsed = Vec::with_capacity(raw.len());
        for v in raw {
            match parse_item(v) {
                Ok(t) => parsed.push(t),
                Err(e) => return ToolOutput::err(&call.id, e),
            }
        }

        let items = match self.store.create(ctx.session_id, parsed).await {
            Ok(items) => items,
            Err(e) => return ToolOutput::err(&call.id, e),
        };

        let total = items.len();
        let first_title = items.first().map(|i| i.title.clone());
        let _ = self
            .event_tx
            .send(ToolEvent::WorkPlanUpdate { session_id: ctx.session_id.to_string(), items })
            .await;

        if let Some(title) = first_title {
            self.push(ctx.session_id, PushKind::Created, 1, total, &title).await;
        }

        ToolOutput::ok(&call.id, format!("Plan created with {total} step(s)."))
    }

    async fn complete(&self, call: &ToolCall, args: &Value, ctx: &ToolContext<'_>) -> ToolOutput {
        let id = match args.get("id").and_then(|v| v.as_str()) {
            Some(id) => id.to_string(),
            None => return ToolOutput::err(&call.id, "complete requires 'id'"),
        };

        let items = match self.store.complete(ctx.session_id, &id).await {
            Ok(items) => items,
            Err(e) => return ToolOutput::err(&call.id, e),
        };

        let total = items.len();
        let completed = items.iter().filter(|i| i.status == "complete").count();
        let next = items.iter().find(|i| i.status != "complete").cloned();
        let completed_title = items.iter().find(|i| i.id == id).map(|i| i.title.clone()).unwrap_or_default();

        let _ = self
            .event_tx
            .send(ToolEvent::WorkPlanUpdate { session_id: ctx.session_id.to_string(), items })
            .await;

        match &next {
            Some(n) => self.push(ctx.session_id, PushKind::Next, completed + 1, total, &n.title).await,
            None => self.push(ctx.session_id, PushKind::Completed, total, total, &completed_title).await,
        }

        let body = json!({
            "total": total,
            "completed": completed,
            "completedItem": id,
            "next": next.map(|n| n.id),
        });
        ToolOutput::ok(&call.id, body.to_string())
    }

    async fn revise(&self, call: &ToolCall, args: &Value, ctx: &ToolContext<'_>) -> ToolOutput {
        let raw = match args.get("items").and_then(|v| v.as_array()) {
            Some(a) => a,
            None => return ToolOutput::err(&call.id, "revise requires 'items'"),
        };

        let mut upserts = Vec::with_capacity(raw.len());
        for v in raw {
            let id = match v.get("id").and_then(|x| x.as_str()) {
                Some(id) => id.to_string(),
                None => return ToolOutput::err(&call.id, "revise item missing 'id'"),
            };
            let remove = v.get("remove").and_then(|x| x.as_bool()).unwrap_or(false);
            let title = v.get("title").and_then(|x| x.as_str()).map(str::to_string);
            let order = v.get("order").and_then(|x| x.as_i64());
            upserts.push((id, title, order, remove));
        }

        let items = match self.store.revise(ctx.session_id, upserts).await {
            Ok(items) => items,
            Err(e) => return ToolOutput::err(&call.id, e),
        };

        let total = items.len();
        let _ = self
            .event_tx
            .send(ToolEvent::WorkPlanUpdate { session_id: ctx.session_id.to_string(), items })
            .await;

        ToolOutput::ok(&call.id, format!("Plan revised; {total} item(s)."))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
