// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::Arc;

use forge_config::ToolsConfig;

use crate::builtin::shell::ShellTool;
use crate::builtin::str_replace_based_edit_tool::StrReplaceBasedEditTool;
use crate::builtin::web_search::WebSearchTool;
use crate::builtin::work_plan::WorkPlanTool;
use crate::events::ToolEvent;
use crate::policy::ToolPolicy;
use crate::work_plan_store::WorkPlanStore;
use crate::{Tool, ToolCall, ToolContext, ToolOutput};
use tokio::sync::mpsc;

/// A tool schema – mirrors forge_model::ToolSchema but keeps tools crate
/// independent from the model crate.
#[derive(Debug, Clone)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Central registry holding all available tools.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

// SAFETY: ToolRegistry is Sync because:
// - HashMap<String, Arc<dyn Tool>> is Sync (String is Sync, Arc<T: Send + Sync> is Sync)
// - Tools implement Send + Sync (required by the Tool trait)
// - No interior mutability exists after construction (all methods take &self)
// - Parallel tool execution is safe because tools are immutable after registration
unsafe impl Sync for ToolRegistry {}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: HashMap::new() }
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Produce schemas for ALL registered tools (mode-unfiltered).
    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self.tools.values().map(|t| ToolSchema {
            name: t.name().to_string(),
            description: t.description().to_string(),
            parameters: t.parameters_schema(),
        }).collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    pub async fn execute(&self, call: &ToolCall, ctx: &ToolContext<'_>) -> ToolOutput {
        match self.tools.get(&call.name) {
            Some(tool) => tool.execute(call, ctx).await,
            None => ToolOutput::err(
                &call.id,
                format!("unknown tool: {}", call.name),
            ),
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self { Self::new() }
}

/// Build the fixed four-tool catalog (§4.2): `bash`, `str_replace_based_edit_tool`,
/// `web_search`, `work_plan`. `work_plan` persists through `work_plan_store` (the
/// session owner, typically backed by the session store) and raises push
/// notifications on `event_tx` for whatever owns the session to forward.
pub fn default_registry(
    cfg: &ToolsConfig,
    work_plan_store: Arc<dyn WorkPlanStore>,
    event_tx: mpsc::Sender<ToolEvent>,
) -> ToolRegistry {
    let policy = Arc::new(ToolPolicy::from_config(cfg));
    let mut registry = ToolRegistry::new();
    registry.register(ShellTool::new(policy, cfg.timeout_secs));
    registry.register(StrReplaceBasedEditTool);
    registry.register(WebSearchTool::new(cfg.web.search.api_key.clone()));
    registry.register(WorkPlanTool::new(work_plan_store, event_tx));
    registry
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::path::Path;

    use super::*;
    use crate::policy::SafetyClass;
    use crate::tool::{Tool, ToolCall, ToolContext, ToolOutput};
    use crate::work_plan_store::InMemoryWorkPlanStore;

    fn ctx() -> ToolContext<'static> {
        ToolContext { session_id: "s1", working_dir: Path::new(".") }
    }

    /// Minimal no-op tool for registry tests.
    struct EchoTool { name: &'static str }

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str { self.name }
        fn description(&self) -> &str { "echoes its input" }
        fn parameters_schema(&self) -> Value { json!({ "type": "object" }) }
        fn safety_class(&self, _call: &ToolCall) -> SafetyClass { SafetyClass::Safe }
        async fn execute(&self, call: &ToolCall, _ctx: &ToolContext<'_>) -> ToolOutput {
            ToolOutput::ok(&call.id, format!("echo:{}", call.args))
        }
    }

    #[test]
    fn register_and_get() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "echo" });
        assert!(reg.get("echo").is_some());
    }

    #[test]
    fn get_unknown_returns_none() {
        let reg = ToolRegistry::new();
        assert!(reg.get("nope").is_none());
    }

    #[test]
    fn names_returns_all_registered() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "a" });
        reg.register(EchoTool { name: "b" });
        let mut names = reg.names();
        names.sort();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn schemas_contains_registered_tool() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "my_tool" });
        let schemas = reg.schemas();
        assert!(schemas.iter().any(|s| s.name == "my_tool"));
    }

    #[test]
    fn schemas_include_description() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "t" });
        let schemas = reg.schemas();
        assert_eq!(schemas[0].description, "echoes its input");
    }

    #[tokio::test]
    async fn execute_known_tool_succeeds() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "echo" });
        let call = ToolCall { id: "1".into(), name: "echo".into(), args: json!({"x":1}) };
        let out = reg.execute(&call, &ctx()).await;
        assert!(!out.is_error);
        assert!(out.content.starts_with("echo:"));
    }

    #[tokio::test]
    async fn execute_unknown_tool_returns_error() {
        let reg = ToolRegistry::new();
        let call = ToolCall { id: "x".into(), name: "missing".into(), args: json!({}) };
        let out = reg.execute(&call, &ctx()).await;
        assert!(out.is_error);
        assert!(out.content.contains("unknown tool"));
    }

    #[test]
    fn registering_same_name_twice_overwrites() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "t" });
        reg.register(EchoTool { name: "t" });
        assert_eq!(reg.names().len(), 1);
    }

    #[test]
    fn default_registry_contains_the_canonical_four_tools() {
        let (tx, _rx) = mpsc::channel(8);
        let reg = default_registry(&ToolsConfig::default(), Arc::new(InMemoryWorkPlanStore::default()), tx);
        let mut names = reg.names();
        names.sort();
        assert_eq!(
            names,
            vec!["bash", "str_replace_based_edit_tool", "web_search", "work_plan"]
        );
    }
}
