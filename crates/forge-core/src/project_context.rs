// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Project-context loader collaborator (§4.6 step 2, §6): reads a project
//! memory file from a session's working directory, if one exists, so the
//! model gets standing instructions without the user repeating them.

use std::path::Path;

use forge_store::ProjectContext;

/// Files checked in order; the first one present wins. `AGENTS.md` is the
/// convention these sessions use for project-scoped agent instructions.
const CANDIDATES: &[&str] = &["AGENTS.md", ".agents.md", "CLAUDE.md"];

/// Load the project-context file for `working_dir`, if any. Returns `None`
/// rather than an error when nothing is found — absence is the normal case.
pub async fn load_project_context(working_dir: &str) -> Option<ProjectContext> {
    let base = Path::new(working_dir);
    for name in CANDIDATES {
        let path = base.join(name);
        if let Ok(content) = tokio::fs::read_to_string(&path).await {
            return Some(ProjectContext {
                source: name.to_string(),
                path: path.to_string_lossy().into_owned(),
                content,
            });
        }
    }
    None
}
