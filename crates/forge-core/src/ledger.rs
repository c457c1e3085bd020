// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Approval Ledger (C4, §4.4): tracks pending tool-use decisions for the
//! in-flight assistant turn. Entries are grouped by continuation handle so a
//! batch of parallel tool calls resolves together (I1).

use forge_store::ToolDecision;

#[derive(Debug, Clone)]
pub struct PendingEntry {
    pub tool_use_id: String,
    pub name: String,
    pub input: serde_json::Value,
    pub description: Option<String>,
    pub continuation_handle: Option<String>,
    pub decision: ToolDecision,
}

/// Ordered, append-only within a turn; entries are removed only by
/// [`ApprovalLedger::drain_group`].
#[derive(Debug, Default)]
pub struct ApprovalLedger {
    entries: Vec<PendingEntry>,
}

impl ApprovalLedger {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn enqueue(&mut self, entry: PendingEntry) {
        self.entries.push(entry);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record a decision. First decision wins (idempotent); returns `true`
    /// if this call was the one that recorded it.
    pub fn decide(&mut self, tool_use_id: &str, approved: bool) -> bool {
        match self.entries.iter_mut().find(|e| e.tool_use_id == tool_use_id) {
            Some(entry) if entry.decision == ToolDecision::Undecided => {
                entry.decision = if approved { ToolDecision::Approved } else { ToolDecision::Rejected };
                true
            }
            _ => false,
        }
    }

    /// A "group" is every pending entry sharing a continuation handle. When
    /// no entry carries one (a provider that doesn't issue them), the whole
    /// ledger is treated as a single group.
    fn group_members(&self, group_key: Option<&str>) -> impl Iterator<Item = &PendingEntry> {
        let group_key = group_key.map(str::to_string);
        self.entries.iter().filter(move |e| e.continuation_handle.as_deref() == group_key.as_deref())
    }

    pub fn is_group_resolved(&self, group_key: Option<&str>) -> bool {
        let mut any = false;
        for e in self.group_members(group_key) {
            any = true;
            if e.decision == ToolDecision::Undecided {
                return false;
            }
        }
        any
    }

    /// Remove and return every entry in the group, in enqueue order.
    pub fn drain_group(&mut self, group_key: Option<&str>) -> Vec<PendingEntry> {
        let group_key_owned = group_key.map(str::to_string);
        let mut drained = Vec::new();
        self.entries.retain(|e| {
            if e.continuation_handle.as_deref() == group_key_owned.as_deref() {
                drained.push(e.clone());
                false
            } else {
                true
            }
        });
        drained
    }
}
