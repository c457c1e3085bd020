// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::policy::SafetyClass;
use crate::tool::{OutputCategory, Tool, ToolCall, ToolContext, ToolOutput};

/// Resolve a tool-supplied path against the session working directory (I4):
/// absolute paths pass through unchanged, relative paths are joined onto `base`.
fn resolve(base: &Path, path: &str) -> PathBuf {
    let p = Path::new(path);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base.join(p)
    }
}

/// `view`/`create`/`str_replace`/`insert` on a file (§4.2, §4.5). Unlike the
/// diff-hunk editors some providers use, matching here is exact: `str_replace`
/// requires `old_str` to occur exactly once in the file.
pub struct StrReplaceBasedEditTool;

#[async_trait]
impl Tool for StrReplaceBasedEditTool {
    fn name(&self) -> &str {
        "str_replace_based_edit_tool"
    }

    fn description(&self) -> &str {
        "View, create, and edit files.\n\
         Commands:\n\
         - view{path, view_range?:[start,end]} — show a file with line numbers, or list a \
           directory. Without view_range the whole file is shown.\n\
         - create{path, file_text} — write a new file; fails if the path already exists.\n\
         - str_replace{path, old_str, new_str} — replace the single occurrence of old_str. \
           Fails if old_str is absent or appears more than once.\n\
         - insert{path, insert_line, new_str} — insert new_str as a new line after \
           insert_line (0 inserts at the top of the file)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "enum": ["view", "create", "str_replace", "insert"]
                },
                "path": {"type": "string"},
                "view_range": {
                    "type": "array",
                    "items": {"type": "integer"},
                    "description": "Optional [start, end] 1-indexed, inclusive"
                },
                "file_text": {"type": "string", "description": "Required for create"},
                "old_str": {"type": "string", "description": "Required for str_replace"},
                "new_str": {"type": "string", "description": "Required for str_replace/insert"},
                "insert_line": {"type": "integer", "description": "Required for insert"}
            },
            "required": ["command", "path"],
            "additionalProperties": false
        })
    }

    fn safety_class(&self, call: &ToolCall) -> SafetyClass {
        match call.args.get("command").and_then(|v| v.as_str()) {
            Some("view") => SafetyClass::Safe,
            _ => SafetyClass::Mutating,
        }
    }

    fn output_category(&self) -> OutputCategory {
        OutputCategory::FileContent
    }

    async fn execute(&self, call: &ToolCall, ctx: &ToolContext<'_>) -> ToolOutput {
        let command = match call.args.get("command").and_then(|v| v.as_str()) {
            Some(c) => c.to_string(),
            None => return ToolOutput::err(&call.id, "missing 'command'"),
        };
        let path = match call.args.get("path").and_then(|v| v.as_str()) {
            Some(p) => p.to_string(),
            None => return ToolOutput::err(&call.id, "missing 'path'"),
        };
        let path = resolve(ctx.working_dir, &path);

        debug!(command = %command, path = %path.display(), "str_replace_based_edit_tool");

        match command.as_str() {
            "view" => view(&call.id, &path, call.args.get("view_range")).await,
            "create" => create(&call.id, &path, call.args.get("file_text")).await,
            "str_replace" => {
                str_replace(&call.id, &path, call.args.get("old_str"), call.args.get("new_str")).await
            }
            "insert" => {
                insert(&call.id, &path, call.args.get("insert_line"), call.args.get("new_str")).await
            }
            other => ToolOutput::err(&call.id, format!("unknown command: {other}")),
        }
    }
}

async fn view(call_id: &str, path: &Path, range: Option<&Value>) -> ToolOutput {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => match tokio::fs::read_dir(path).await {
            Ok(mut rd) => {
                let mut entries = Vec::new();
                while let Ok(Some(entry)) = rd.next_entry().await {
                    let name = entry.file_name().to_string_lossy().to_string();
                    let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
                    entries.push(if is_dir { format!("{name}/") } else { name });
                }
                entries.sort();
                ToolOutput::ok(call_id, entries.join("\n"))
            }
            Err(e) => ToolOutput::err(call_id, format!("list error: {e}")),
        },
        Ok(_) => {
            let content = match tokio::fs::read_to_string(path).await {
                Ok(c) => c,
                Err(e) => return ToolOutput::err(call_id, format!("read error: {e}")),
            };
            let lines: Vec<&str> = content.lines().collect();
            let (start, end) = match range.and_then(|v| v.as_array()) {
                Some(arr) if arr.len() == 2 => {
                    let s = arr[0].as_i64().unwrap_or(1).max(1) as usize;
                    let e = arr[1].as_i64().unwrap_or(lines.len() as i64);
                    let e = if e < 0 { lines.len() } else { (e as usize).min(lines.len()) };
                    (s, e)
                }
                _ => (1, lines.len()),
            };
            let shown: Vec<String> = lines
                .iter()
                .enumerate()
                .skip(start.saturating_sub(1))
                .take(end.saturating_sub(start.saturating_sub(1)))
                .map(|(i, l)| format!("{:>6}\t{}", i + 1, l))
                .collect();
            ToolOutput::ok(call_id, shown.join("\n"))
        }
        Err(e) => ToolOutput::err(call_id, format!("read error: {e}")),
    }
}

async fn create(call_id: &str, path: &Path, file_text: Option<&Value>) -> ToolOutput {
    let text = match file_text.and_then(|v| v.as_str()) {
        Some(t) => t,
        None => return ToolOutput::err(call_id, "create requires 'file_text'"),
    };
    if tokio::fs::metadata(path).await.is_ok() {
        return ToolOutput::err(call_id, format!("{} already exists", path.display()));
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            let _ = tokio::fs::create_dir_all(parent).await;
        }
    }
    match tokio::fs::write(path, text).await {
        Ok(_) => ToolOutput::ok(call_id, format!("Created {}", path.display())),
        Err(e) => ToolOutput::err(call_id, format!("write error: {e}")),
    }
}

async fn str_replace(call_id: &str, path: &Path, old_str: Option<&Value>, new_str: Option<&Value>) -> ToolOutput {
    let old = match old_str.and_then(|v| v.as_str()) {
        Some(s) => s,
        None => return ToolOutput::err(call_id, "str_replace requires 'old_str'"),
    };
    let new = new_str.and_then(|v| v.as_str()).unwrap_or("");

    let content = match tokio::fs::read_to_string(path).await {
        Ok(c) => c,
        Err(e) => return ToolOutput::err(call_id, format!("read error: {e}")),
    };

    let count = content.matches(old).count();
    if count == 0 {
        return ToolOutput::err(call_id, "old_str not found in file");
    }
    if count > 1 {
        return ToolOutput::err(call_id, format!("old_str matches {count} times; must match exactly once"));
    }

    let updated = content.replacen(old, new, 1);
    match tokio::fs::write(path, &updated).await {
        Ok(_) => ToolOutput::ok(call_id, "Edit applied"),
        Err(e) => ToolOutput::err(call_id, format!("write error: {e}")),
    }
}

async fn insert(call_id: &str, path: &Path, insert_line: Option<&Value>, new_str: Option<&Value>) -> ToolOutput {
    let line = match insert_line.and_then(|v| v.as_u64()) {
        Some(n) => n as usize,
        None => return ToolOutput::err(call_id, "insert requires 'insert_line'"),
    };
    let new = match new_str.and_then(|v| v.as_str()) {
        Some(s) => s,
        None => return ToolOutput::err(call_id, "insert requires 'new_str'"),
    };

    let content = match tokio::fs::read_to_string(path).await {
        Ok(c) => c,
        Err(e) => return ToolOutput::err(call_id, format!("read error: {e}")),
    };
    let mut lines: Vec<&str> = content.lines().collect();
    if line > lines.len() {
        return ToolOutput::err(call_id, format!("insert_line {line} is beyond end of file ({} lines)", lines.len()));
    }
    lines.insert(line, new);

    let had_trailing_newline = content.ends_with('\n') || content.is_empty();
    let mut updated = lines.join("\n");
    if had_trailing_newline {
        updated.push('\n');
    }

    match tokio::fs::write(path, &updated).await {
        Ok(_) => ToolOutput::ok(call_id, "Edit applied"),
        Err(e) => ToolOutput::err(call_id, format!("write error: {e}")),
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
