// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    /// Named provider configurations, selectable per-turn by the
    /// `agent:message{provider}` field or `--model <key>` at the CLI.
    #[serde(default)]
    pub providers: std::collections::HashMap<String, ModelConfig>,
}

/// Which wire shape a provider speaks. Exactly two are supported (§4.3):
/// "blocks" (Anthropic Messages API streaming) and "response" (OpenAI
/// Responses API streaming). Everything else about a provider — base URL,
/// auth, model name — is orthogonal to this choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum, Default)]
#[serde(rename_all = "snake_case")]
pub enum AdapterFlavor {
    #[default]
    Blocks,
    Response,
}

impl std::fmt::Display for AdapterFlavor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdapterFlavor::Blocks => write!(f, "blocks"),
            AdapterFlavor::Response => write!(f, "response"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Which adapter flavor speaks to this provider.
    #[serde(default)]
    pub flavor: AdapterFlavor,
    /// Model name forwarded to the provider API.
    pub name: String,
    /// Environment variable that holds the API key (read at runtime).
    pub api_key_env: Option<String>,
    /// Explicit API key; prefer api_key_env in config files to avoid secrets
    /// in version-controlled files. A turn-level `apiKey` override (§6) takes
    /// precedence over both.
    pub api_key: Option<String>,
    /// Base URL override. Defaults to the canonical endpoint for the flavor.
    pub base_url: Option<String>,
    /// Maximum tokens to request in a single completion.
    pub max_tokens: Option<u32>,
    /// Sampling temperature (0.0-2.0).
    pub temperature: Option<f32>,

    // ── Prompt caching (blocks adapter only) ──────────────────────────────
    /// Attach a `cache_control` marker to the stable system block.
    #[serde(default = "default_true")]
    pub cache_system_prompt: bool,
    /// Attach a `cache_control` marker to the tool schema list.
    #[serde(default = "default_true")]
    pub cache_tools: bool,

    /// Free-form provider-specific options forwarded as-is to the adapter.
    #[serde(default)]
    pub driver_options: serde_json::Value,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            flavor: AdapterFlavor::Blocks,
            name: "claude-sonnet-4-5".into(),
            api_key_env: Some("ANTHROPIC_API_KEY".into()),
            api_key: None,
            base_url: None,
            max_tokens: Some(8192),
            temperature: Some(0.2),
            cache_system_prompt: true,
            cache_tools: true,
            driver_options: serde_json::Value::Null,
        }
    }
}

fn default_max_tool_rounds() -> u32 {
    200
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum number of tool-call rounds within a single turn before the
    /// engine forces a stop (§4.6 guards against runaway loops).
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: u32,
    /// System prompt override; leave `None` to use the built-in composition
    /// (§4.9).
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Per-turn wall-clock timeout in seconds (0 = no limit).
    #[serde(default)]
    pub turn_timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: default_max_tool_rounds(),
            system_prompt: None,
            turn_timeout_secs: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Shell command patterns auto-approved even in interactive mode
    /// (glob-style), in addition to the built-in safety classification.
    pub auto_approve_patterns: Vec<String>,
    /// Shell command patterns escalated to `dangerous` regardless of the
    /// built-in deny-list.
    pub deny_patterns: Vec<String>,
    /// Timeout in seconds for a single tool call.
    pub timeout_secs: u64,
    /// Web search configuration.
    #[serde(default)]
    pub web: WebConfig,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            auto_approve_patterns: vec!["cat *".into(), "ls *".into(), "grep *".into()],
            deny_patterns: vec!["rm -rf /*".into(), "dd if=*".into()],
            timeout_secs: 30,
            web: WebConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebSearchConfig {
    /// Brave Search API key (also checked via BRAVE_API_KEY env var).
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    #[serde(default)]
    pub search: WebSearchConfig,
    /// Default maximum characters returned by web_search result bodies.
    pub fetch_max_chars: usize,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self { search: WebSearchConfig::default(), fetch_max_chars: 50_000 }
    }
}
