// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Durable session storage (C1, §4.1): snapshots, event journals, and the
//! session index that the gateway's HTTP admin surface and the turn engine
//! both read and write.

pub mod schema;
pub mod store;

pub use schema::{
    Conversation, PendingTool, Phase, ProjectContext, SessionIndexItem, SessionMode, Snapshot,
    ToolDecision, WorkPlan, WorkPlanItem, WorkPlanStatus,
};
pub use store::{SessionStore, StoreError};
