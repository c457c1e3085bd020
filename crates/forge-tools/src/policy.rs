// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use regex::Regex;

use forge_config::ToolsConfig;

/// Safety classification of a tool invocation (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetyClass {
    Safe,
    Network,
    Mutating,
    Dangerous,
}

/// Session-level approval mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// Every non-safe, non-network tool call requires user confirmation.
    Interactive,
    /// `safe` and `network` tools run without confirmation.
    AutoApproveSafe,
}

/// Outcome of combining a tool's safety class with the session mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalDecision {
    AutoApproved,
    RequiresApproval,
}

/// Commands that always escalate `bash` from `mutating` to `dangerous`,
/// regardless of configuration.
const BASH_DANGEROUS_SUBSTRINGS: &[&str] = &[
    "rm -rf /",
    "sudo ",
    "mkfs",
    "shutdown",
    ":(){ :|:& };:",
    "kill -9",
    "dd of=/dev/",
];

/// Policy engine that classifies `bash` commands and turns a safety class +
/// session mode into an approval decision (§4.2).
#[derive(Debug)]
pub struct ToolPolicy {
    /// Additional user-configured patterns that escalate a bash command to
    /// `dangerous`, on top of the built-in deny-list.
    deny_patterns: Vec<Regex>,
    /// User-configured patterns that downgrade an otherwise-mutating bash
    /// command to auto-approvable territory (treated as `safe`).
    auto_patterns: Vec<Regex>,
}

impl ToolPolicy {
    pub fn from_config(cfg: &ToolsConfig) -> Self {
        let compile = |patterns: &[String]| -> Vec<Regex> {
            patterns.iter().filter_map(|p| glob_to_regex(p)).collect()
        };
        Self {
            deny_patterns: compile(&cfg.deny_patterns),
            auto_patterns: compile(&cfg.auto_approve_patterns),
        }
    }

    /// Classify a `bash` command per §4.2's table.
    pub fn classify_bash(&self, command: &str) -> SafetyClass {
        if BASH_DANGEROUS_SUBSTRINGS.iter().any(|p| command.contains(p)) {
            return SafetyClass::Dangerous;
        }
        if self.deny_patterns.iter().any(|re| re.is_match(command)) {
            return SafetyClass::Dangerous;
        }
        if self.auto_patterns.iter().any(|re| re.is_match(command)) {
            return SafetyClass::Safe;
        }
        SafetyClass::Mutating
    }

    /// Combine a safety class with the session mode (§4.2's auto-approval rule).
    pub fn decide(&self, class: SafetyClass, mode: SessionMode) -> ApprovalDecision {
        match (mode, class) {
            (SessionMode::AutoApproveSafe, SafetyClass::Safe | SafetyClass::Network) => {
                ApprovalDecision::AutoApproved
            }
            _ => ApprovalDecision::RequiresApproval,
        }
    }
}

/// Convert a simple shell glob pattern to a [`Regex`].
/// Only `*` (match anything) and `?` (match one char) are supported.
fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let mut re = String::from("^");
    for ch in pattern.chars() {
        match ch {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            c => {
                for esc in regex::escape(&c.to_string()).chars() {
                    re.push(esc);
                }
            }
        }
    }
    re.push('$');
    Regex::new(&re).ok()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn policy_with(auto: &[&str], deny: &[&str]) -> ToolPolicy {
        ToolPolicy::from_config(&ToolsConfig {
            auto_approve_patterns: auto.iter().map(|s| s.to_string()).collect(),
            deny_patterns: deny.iter().map(|s| s.to_string()).collect(),
            ..ToolsConfig::default()
        })
    }

    // ── Built-in deny-list always wins ────────────────────────────────────────

    #[test]
    fn rm_rf_root_is_always_dangerous() {
        let p = policy_with(&["rm *"], &[]);
        assert_eq!(p.classify_bash("rm -rf /"), SafetyClass::Dangerous);
    }

    #[test]
    fn sudo_is_dangerous() {
        let p = policy_with(&[], &[]);
        assert_eq!(p.classify_bash("sudo apt install foo"), SafetyClass::Dangerous);
    }

    #[test]
    fn fork_bomb_is_dangerous() {
        let p = policy_with(&[], &[]);
        assert_eq!(p.classify_bash(":(){ :|:& };:"), SafetyClass::Dangerous);
    }

    #[test]
    fn kill_nine_is_dangerous() {
        let p = policy_with(&[], &[]);
        assert_eq!(p.classify_bash("kill -9 1234"), SafetyClass::Dangerous);
    }

    #[test]
    fn dd_to_dev_is_dangerous() {
        let p = policy_with(&[], &[]);
        assert_eq!(p.classify_bash("dd of=/dev/sda"), SafetyClass::Dangerous);
    }

    // ── Configured deny patterns escalate too ─────────────────────────────────

    #[test]
    fn configured_deny_pattern_escalates_to_dangerous() {
        let p = policy_with(&[], &["git push --force*"]);
        assert_eq!(p.classify_bash("git push --force origin main"), SafetyClass::Dangerous);
    }

    // ── Configured auto patterns classify as safe ─────────────────────────────

    #[test]
    fn configured_auto_pattern_is_safe() {
        let p = policy_with(&["cat *"], &[]);
        assert_eq!(p.classify_bash("cat README.md"), SafetyClass::Safe);
    }

    #[test]
    fn default_config_classifies_ls_as_safe() {
        let p = ToolPolicy::from_config(&ToolsConfig::default());
        assert_eq!(p.classify_bash("ls /tmp"), SafetyClass::Safe);
    }

    // ── Fallback is mutating ──────────────────────────────────────────────────

    #[test]
    fn unmatched_command_is_mutating() {
        let p = ToolPolicy::from_config(&ToolsConfig::default());
        assert_eq!(p.classify_bash("cargo build"), SafetyClass::Mutating);
    }

    // ── decide() ──────────────────────────────────────────────────────────────

    #[test]
    fn auto_approve_safe_mode_approves_safe_and_network() {
        let p = ToolPolicy::from_config(&ToolsConfig::default());
        assert_eq!(p.decide(SafetyClass::Safe, SessionMode::AutoApproveSafe), ApprovalDecision::AutoApproved);
        assert_eq!(p.decide(SafetyClass::Network, SessionMode::AutoApproveSafe), ApprovalDecision::AutoApproved);
    }

    #[test]
    fn auto_approve_safe_mode_still_confirms_mutating_and_dangerous() {
        let p = ToolPolicy::from_config(&ToolsConfig::default());
        assert_eq!(p.decide(SafetyClass::Mutating, SessionMode::AutoApproveSafe), ApprovalDecision::RequiresApproval);
        assert_eq!(p.decide(SafetyClass::Dangerous, SessionMode::AutoApproveSafe), ApprovalDecision::RequiresApproval);
    }

    #[test]
    fn interactive_mode_always_requires_approval() {
        let p = ToolPolicy::from_config(&ToolsConfig::default());
        for class in [SafetyClass::Safe, SafetyClass::Network, SafetyClass::Mutating, SafetyClass::Dangerous] {
            assert_eq!(p.decide(class, SessionMode::Interactive), ApprovalDecision::RequiresApproval);
        }
    }
}
