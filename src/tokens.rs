//! Length-based token estimation.
//!
//! Uses ~4 characters per token, which is close enough for English text on
//! every provider we talk to. It is an approximation and is never expected
//! to match a real tokenizer.

const CHARS_PER_TOKEN: usize = 4;

/// Estimates the token cost of `text` as `ceil(chars / 4)`.
///
/// Counts Unicode scalar values rather than bytes so the result does not
/// depend on the encoding of non-ASCII text.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_is_free() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn rounds_up_partial_tokens() {
        assert_eq!(estimate_tokens("a"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        assert_eq!(estimate_tokens("abcdefgh"), 2);
    }

    #[test]
    fn counts_characters_not_bytes() {
        // 4 chars, 12 bytes
        assert_eq!(estimate_tokens("日本語字"), 1);
        assert_eq!(estimate_tokens("héllo"), 2);
    }

    #[test]
    fn longer_text_never_costs_less() {
        let mut text = String::new();
        let mut previous = 0;
        for _ in 0..64 {
            text.push('x');
            let current = estimate_tokens(&text);
            assert!(current >= previous);
            previous = current;
        }
    }
}
