//! Context window sizes per model.
//!
//! Keys are exact model identifiers (case-sensitive, no aliasing). The table
//! is maintained by hand as providers release new models.

use std::collections::HashMap;
use std::sync::LazyLock;

/// Capacity used for any model missing from the table.
pub const DEFAULT_CONTEXT_WINDOW: usize = 4096;

static CONTEXT_WINDOWS: LazyLock<HashMap<&'static str, usize>> = LazyLock::new(|| {
    HashMap::from([
        // OpenAI
        ("gpt-4o", 128_000),
        ("gpt-4o-2024-08-06", 128_000),
        ("gpt-4o-mini", 128_000),
        ("gpt-4-turbo", 128_000),
        ("gpt-4", 8_192),
        ("gpt-3.5-turbo", 16_385),
        ("o1", 200_000),
        ("o1-mini", 128_000),
        ("o3-mini", 200_000),
        // Anthropic
        ("claude-3-5-sonnet-20241022", 200_000),
        ("claude-3-5-haiku-20241022", 200_000),
        ("claude-3-opus-20240229", 200_000),
        ("claude-3-haiku-20240307", 200_000),
        // Google
        ("gemini-2.0-flash", 1_048_576),
        ("gemini-1.5-pro", 2_097_152),
        ("gemini-1.5-flash", 1_048_576),
        // DeepSeek
        ("deepseek-chat", 64_000),
        ("deepseek-reasoner", 64_000),
    ])
});

/// Returns the context window of `model_name`, or [`DEFAULT_CONTEXT_WINDOW`]
/// when the model is unknown.
pub fn context_window(model_name: &str) -> usize {
    CONTEXT_WINDOWS
        .get(model_name)
        .copied()
        .unwrap_or(DEFAULT_CONTEXT_WINDOW)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_model_resolves() {
        assert_eq!(context_window("gpt-4o"), 128_000);
        assert_eq!(context_window("claude-3-opus-20240229"), 200_000);
    }

    #[test]
    fn unknown_model_uses_default() {
        assert_eq!(context_window("unknown-model-xyz"), 4096);
        assert_eq!(context_window(""), DEFAULT_CONTEXT_WINDOW);
    }

    #[test]
    fn lookup_is_exact() {
        assert_eq!(context_window("GPT-4o"), DEFAULT_CONTEXT_WINDOW);
        assert_eq!(context_window(" gpt-4o"), DEFAULT_CONTEXT_WINDOW);
    }
}
