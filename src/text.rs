//! Sentence and word helpers shared by the retrieval and validation pipeline.
//!
//! Sentences are delimited by `.` throughout, matching how the knowledge base
//! and the validator tables were written.

use std::collections::HashSet;

/// Split on `.`, trim, and drop empty fragments.
pub fn split_sentences(text: &str) -> Vec<String> {
    text.split('.')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Rejoin sentences produced by [`split_sentences`].
pub fn join_sentences(sentences: &[String]) -> String {
    sentences.join(". ")
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Lowercase, strip punctuation, collapse whitespace. Used for duplicate
/// comparisons so "Stay hydrated!" and "stay hydrated" compare equal.
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let stripped: String = lowered
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn word_set(text: &str) -> HashSet<String> {
    text.split_whitespace().map(str::to_string).collect()
}

/// |a ∩ b| / max(|a|, |b|); 0.0 when either side is empty.
pub fn overlap_ratio(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let shared = a.intersection(b).count();
    shared as f32 / a.len().max(b.len()) as f32
}

pub fn ends_with_terminal_punctuation(text: &str) -> bool {
    text.ends_with('.') || text.ends_with('!') || text.ends_with('?')
}

pub fn ensure_terminal_punctuation(mut text: String) -> String {
    if !text.is_empty() && !ends_with_terminal_punctuation(&text) {
        text.push('.');
    }
    text
}

/// Rough token estimate for prompt budgeting. The model tokenizer lives
/// behind the inference endpoint, so four characters per token stands in.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_drops_empty_fragments() {
        let sentences = split_sentences("One. Two..  Three. ");
        assert_eq!(sentences, vec!["One", "Two", "Three"]);
    }

    #[test]
    fn normalize_strips_punctuation_and_case() {
        assert_eq!(normalize("Stay  hydrated!"), "stay hydrated");
        assert_eq!(normalize("stay hydrated"), "stay hydrated");
    }

    #[test]
    fn overlap_ratio_uses_larger_set() {
        let a = word_set("one two three four");
        let b = word_set("one two");
        assert!((overlap_ratio(&a, &b) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn overlap_ratio_empty_is_zero() {
        let a = word_set("");
        let b = word_set("one");
        assert_eq!(overlap_ratio(&a, &b), 0.0);
    }

    #[test]
    fn terminal_punctuation_added_once() {
        assert_eq!(ensure_terminal_punctuation("hello".to_string()), "hello.");
        assert_eq!(ensure_terminal_punctuation("hello?".to_string()), "hello?");
    }

    #[test]
    fn token_estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcde"), 2);
    }
}
