// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Title derivation (§4.8). A short provider call produces the primary
//! title; a deterministic fallback covers provider failure so every session
//! still gets a usable title (property P7: non-empty, at most 3 tokens when
//! falling back to the first-words heuristic).

const MAX_FALLBACK_TOKENS: usize = 3;

/// Deterministic fallback used when the provider call for a title fails.
pub fn fallback_title(user_message: &str) -> String {
    let lower = user_message.to_lowercase();
    if lower.contains("fix") || lower.contains("debug") {
        return "Debug Issue".to_string();
    }

    let words: Vec<&str> = user_message.split_whitespace().take(MAX_FALLBACK_TOKENS).collect();
    if words.is_empty() {
        "New Chat".to_string()
    } else {
        words.join(" ")
    }
}

/// Trim a provider-generated title to a sane display length; providers are
/// asked for a short title but are not trusted to honour it exactly.
pub fn sanitize_provider_title(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    const MAX_CHARS: usize = 80;
    if trimmed.chars().count() <= MAX_CHARS {
        Some(trimmed.to_string())
    } else {
        Some(trimmed.chars().take(MAX_CHARS).collect::<String>() + "…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_detects_fix_cue_word() {
        assert_eq!(fallback_title("can you fix this null pointer crash"), "Debug Issue");
    }

    #[test]
    fn fallback_detects_debug_cue_word() {
        assert_eq!(fallback_title("help me debug the race condition"), "Debug Issue");
    }

    #[test]
    fn fallback_takes_first_three_words() {
        assert_eq!(fallback_title("add dark mode support everywhere"), "add dark mode");
    }

    #[test]
    fn fallback_empty_input_is_new_chat() {
        assert_eq!(fallback_title(""), "New Chat");
    }

    #[test]
    fn fallback_whitespace_only_is_new_chat() {
        assert_eq!(fallback_title("   "), "New Chat");
    }

    #[test]
    fn fallback_is_never_empty() {
        for input in ["", "   ", "fix", "a"] {
            assert!(!fallback_title(input).is_empty());
        }
    }

    #[test]
    fn sanitize_trims_whitespace() {
        assert_eq!(sanitize_provider_title("  Add login flow  ").as_deref(), Some("Add login flow"));
    }

    #[test]
    fn sanitize_empty_is_none() {
        assert_eq!(sanitize_provider_title("   "), None);
    }

    #[test]
    fn sanitize_truncates_long_titles() {
        let long = "x".repeat(200);
        let sanitized = sanitize_provider_title(&long).unwrap();
        assert!(sanitized.ends_with('…'));
        assert!(sanitized.chars().count() <= 81);
    }
}
