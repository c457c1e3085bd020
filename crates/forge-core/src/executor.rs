// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Tool Executor (C5, §4.5): stateless wrapper around the tool registry that
//! enforces the workspace boundary invariant (I4) before dispatching.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use forge_tools::{ToolCall, ToolContext, ToolOutput, ToolRegistry};

pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    pub async fn execute(&self, call: &ToolCall, session_id: &str, working_dir: &Path) -> ToolOutput {
        if let Err(msg) = check_workspace_boundary(call, working_dir) {
            return ToolOutput::err(&call.id, format!("access_denied: {msg}"));
        }
        let ctx = ToolContext { session_id, working_dir };
        self.registry.execute(call, &ctx).await
    }
}

/// Resolve `.`/`..` components lexically, without touching the filesystem —
/// the target may not exist yet (`str_replace_based_edit_tool create`).
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// The argument name carrying a filesystem path for each tool that accepts
/// one, and whether it names a working directory or a target path. Both are
/// subject to I4.
fn path_argument<'a>(call: &'a ToolCall) -> Option<&'a str> {
    match call.name.as_str() {
        "str_replace_based_edit_tool" => call.args.get("path").and_then(|v| v.as_str()),
        "bash" => call.args.get("workdir").and_then(|v| v.as_str()),
        _ => None,
    }
}

fn check_workspace_boundary(call: &ToolCall, working_dir: &Path) -> Result<(), String> {
    let Some(raw) = path_argument(call) else { return Ok(()) };

    let candidate = Path::new(raw);
    let absolute = if candidate.is_absolute() { candidate.to_path_buf() } else { working_dir.join(candidate) };

    let root = working_dir.canonicalize().unwrap_or_else(|_| working_dir.to_path_buf());
    let resolved = normalize(&absolute);
    // Canonicalize as much of the resolved path as actually exists (covers
    // symlinks inside the workspace); fall back to the lexical form for the
    // as-yet-nonexistent tail (e.g. a file about to be created).
    let resolved = canonicalize_existing_prefix(&resolved);

    if resolved.starts_with(&root) {
        Ok(())
    } else {
        Err(format!("path '{raw}' resolves outside the session working directory"))
    }
}

fn canonicalize_existing_prefix(path: &Path) -> PathBuf {
    let mut probe = path.to_path_buf();
    let mut tail = Vec::new();
    loop {
        if let Ok(canon) = probe.canonicalize() {
            let mut result = canon;
            for part in tail.into_iter().rev() {
                result.push(part);
            }
            return result;
        }
        match probe.file_name() {
            Some(name) => {
                tail.push(name.to_os_string());
                probe.pop();
            }
            None => return path.to_path_buf(),
        }
    }
}
