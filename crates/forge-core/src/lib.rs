// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod engine;
mod events;
mod executor;
mod ledger;
mod project_context;
mod prompts;
mod push;
mod title;
mod work_plan;
#[cfg(test)]
mod tests;

pub use engine::{EventSink, TurnEngine};
pub use events::{Envelope, EventPayload, StreamEventWire, ToolOutputWire, ToolRequestWire};
pub use executor::ToolExecutor;
pub use ledger::{ApprovalLedger, PendingEntry};
pub use project_context::load_project_context;
pub use prompts::{system_prompt, PromptContext};
pub use push::{LoggingPushDispatcher, PushDispatcher, PushMessage};
pub use title::{fallback_title, sanitize_provider_title};
pub use work_plan::StoreBackedWorkPlan;
