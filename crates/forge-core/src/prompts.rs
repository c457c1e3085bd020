// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use chrono::Local;

/// Optional contextual blocks injected into the system prompt (§4.9).
#[derive(Debug, Default)]
pub struct PromptContext<'a> {
    pub working_directory: &'a str,
    pub platform: &'a str,
    pub os_version: &'a str,
    /// Contents of a project-context file (e.g. `AGENTS.md`), labelled with
    /// its source path so the model can cite where an instruction came from.
    pub project_context: Option<(&'a str, &'a str)>,
}

fn tool_usage_contract() -> &'static str {
    "## Tools\n\n\
     You have exactly four tools:\n\
     - `bash` — run a shell command in the session's working directory. Mutating by \
       default; destructive patterns (`rm -rf /`, `sudo`, `mkfs`, `dd of=/dev/*`, fork \
       bombs) are classified as dangerous and always require approval.\n\
     - `str_replace_based_edit_tool` — view, create, and edit files. `view` is read-only; \
       `create`/`str_replace`/`insert` mutate. `str_replace` requires `old_str` to match \
       exactly once; if it matches zero or more than once, fix your match and retry.\n\
     - `web_search` — search the web for current information outside your training data.\n\
     - `work_plan` — maintain a visible step-by-step plan for multi-step tasks. Use \
       `create` to publish the plan, `complete` to check off a step as you finish it, and \
       `revise` to add, reorder, or drop steps as the task's shape changes.\n\n\
     Prefer `str_replace_based_edit_tool` over `bash` for reading and editing files — it \
     gives you precise line ranges and exact-match safety that shell redirection does not."
}

fn workflow_section() -> &'static str {
    "## Workflow\n\n\
     - For anything beyond a one-step fix, publish a `work_plan` before you start and \
       complete each item as you finish it — don't batch completions at the end.\n\
     - Read before you write: use `view` to see the current file content and exact \
       surrounding text before calling `str_replace`.\n\
     - Verify your changes when you can — re-view an edited file or run the relevant \
       command — rather than assuming a tool call succeeded.\n\
     - When a tool call fails, read the error and change your approach; don't repeat the \
       same call unmodified."
}

/// Compose the system prompt (§4.9). The stable prefix (identity, tool
/// contract, workflow) is cacheable across turns; `dynamic_suffix` carries
/// whatever changes turn to turn and is sent as a separate, uncached block.
pub fn system_prompt(ctx: &PromptContext<'_>) -> (String, Option<String>) {
    let identity = format!(
        "You are a coding agent embedded in a development environment.\n\n\
         Platform: `{platform}` (`{os_version}`)\n\
         Working directory: `{working_dir}`\n\n\
         Work systematically: understand the task, make the change, verify it. Prefer \
         precise, minimal edits over broad rewrites. Never invent file contents you \
         haven't viewed.",
        platform = ctx.platform,
        os_version = ctx.os_version,
        working_dir = ctx.working_directory,
    );

    let stable = format!(
        "{identity}\n\n{tools}\n\n{workflow}",
        tools = tool_usage_contract(),
        workflow = workflow_section(),
    );

    let mut dynamic = format!("Current date and time: `{}`", Local::now().format("%Y-%m-%d %H:%M:%S"));
    if let Some((path, content)) = ctx.project_context {
        dynamic.push_str(&format!("\n\n## Project Memory (source: {path})\n\n{content}"));
    }

    (stable, Some(dynamic))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx<'a>() -> PromptContext<'a> {
        PromptContext {
            working_directory: "/home/user/project",
            platform: "linux",
            os_version: "6.8.0",
            project_context: None,
        }
    }

    #[test]
    fn stable_prompt_mentions_working_directory() {
        let (stable, _) = system_prompt(&ctx());
        assert!(stable.contains("/home/user/project"));
    }

    #[test]
    fn stable_prompt_enumerates_all_four_tools() {
        let (stable, _) = system_prompt(&ctx());
        for name in ["bash", "str_replace_based_edit_tool", "web_search", "work_plan"] {
            assert!(stable.contains(name), "missing tool {name}");
        }
    }

    #[test]
    fn stable_prompt_has_workflow_section() {
        let (stable, _) = system_prompt(&ctx());
        assert!(stable.contains("## Workflow"));
    }

    #[test]
    fn dynamic_suffix_always_present_for_timestamp() {
        let (_, dynamic) = system_prompt(&ctx());
        assert!(dynamic.is_some());
        assert!(dynamic.unwrap().contains("Current date and time"));
    }

    #[test]
    fn project_context_appears_in_dynamic_suffix_not_stable() {
        let mut c = ctx();
        c.project_context = Some(("AGENTS.md", "Always write tests."));
        let (stable, dynamic) = system_prompt(&c);
        assert!(!stable.contains("Always write tests"));
        let dynamic = dynamic.unwrap();
        assert!(dynamic.contains("## Project Memory (source: AGENTS.md)"));
        assert!(dynamic.contains("Always write tests."));
    }

    #[test]
    fn no_project_context_omits_memory_section() {
        let (_, dynamic) = system_prompt(&ctx());
        assert!(!dynamic.unwrap().contains("Project Memory"));
    }

    #[test]
    fn platform_and_os_version_both_present() {
        let (stable, _) = system_prompt(&ctx());
        assert!(stable.contains("linux"));
        assert!(stable.contains("6.8.0"));
    }

    #[test]
    fn str_replace_contract_mentions_exact_match_rule() {
        let (stable, _) = system_prompt(&ctx());
        assert!(stable.contains("match exactly once"));
    }
}
