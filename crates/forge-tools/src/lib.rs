// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod builtin;
pub mod events;
pub mod policy;
pub mod registry;
pub mod tool;
pub mod work_plan_store;

pub use events::{truncate_task_title, PushKind, PushNotification, ToolEvent, WorkPlanItem};
pub use policy::{ApprovalDecision, SafetyClass, SessionMode, ToolPolicy};
pub use registry::{default_registry, ToolRegistry, ToolSchema};
pub use tool::{OutputCategory, Tool, ToolCall, ToolContext, ToolOutput, ToolOutputPart};
pub use work_plan_store::{InMemoryWorkPlanStore, WorkPlanStore};

pub use builtin::shell::ShellTool;
pub use builtin::str_replace_based_edit_tool::StrReplaceBasedEditTool;
pub use builtin::web_search::WebSearchTool;
pub use builtin::work_plan::WorkPlanTool;
