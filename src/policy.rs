//! Fixed phrase and pattern tables, loaded once at startup.
//!
//! All denylists, substitution maps, canned replies, prompt instructions and
//! opening/closing pools live in one declarative JSON resource keyed by
//! language and category. The default resource is embedded in the binary; a
//! deployment can override it with its own file.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

const EMBEDDED_POLICY: &str = include_str!("../resources/policy.json");

#[derive(Debug, Clone, Deserialize)]
pub struct Policy {
    pub retrieval: RetrievalPolicy,
    pub language: LanguagePolicy,
    pub emotion: EmotionPolicy,
    pub special_cases: SpecialCasePolicy,
    pub canned: CannedReplies,
    pub prompt: PromptPolicy,
    pub validation: ValidationPolicy,
    pub fallback: FallbackPolicy,
    pub translation: TranslationPolicy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalPolicy {
    /// Terms whose containing text is dropped unless the query itself raises them.
    pub irrelevant_terms: Vec<String>,
    /// Query terms that re-admit texts mentioning the irrelevant terms.
    pub irrelevant_query_exceptions: Vec<String>,
    /// Reference phrases tied to the wrong region, always dropped.
    pub region_mismatch_phrases: Vec<String>,
    /// Per-topic denylists applied to retrieved context after the fact.
    pub query_denylists: Vec<QueryDenylist>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryDenylist {
    pub triggers: Vec<String>,
    pub terms: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LanguagePolicy {
    pub swahili_markers: Vec<String>,
    pub strong_markers: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmotionPolicy {
    pub pain: Vec<String>,
    pub anxious: Vec<String>,
    pub sad: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpecialCasePolicy {
    pub greetings_en: Vec<String>,
    pub greetings_sw: Vec<String>,
    pub off_topic_keywords: Vec<String>,
    pub bot_identity_phrases: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CannedReplies {
    pub greeting_en: String,
    pub greeting_en_named: String,
    pub greeting_sw: String,
    pub off_topic_en: String,
    pub off_topic_sw: String,
    pub bot_identity_en: String,
    pub bot_identity_sw: String,
    pub mismatch_sw_text_en_mode: String,
    pub mismatch_en_text_sw_mode: String,
    /// Returned when every generated sentence was an instruction echo.
    pub clarify_en: String,
    /// Returned when unsafe medical advice is detected.
    pub safe_fallback_en: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PromptPolicy {
    pub system_en: String,
    /// Swahili mode still generates in English; the instruction says so.
    pub system_sw_mode: String,
    pub emotion_instructions: EmotionInstructions,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmotionInstructions {
    pub pain: String,
    pub anxious: String,
    pub sad: String,
    pub neutral: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidationPolicy {
    pub instruction_echo_en: Vec<String>,
    pub instruction_echo_sw: Vec<String>,
    /// English context fragments that must not leak into a Swahili response.
    pub english_leak_phrases: Vec<String>,
    pub unsafe_patterns: Vec<String>,
    pub safety_rewrites: Vec<SafetyRewrite>,
    pub contradiction_pairs: Vec<ContradictionPair>,
    pub typo_fixes: Vec<(String, String)>,
    pub generic_closings: Vec<String>,
    pub varied_closings: Vec<String>,
    pub cold_phrases: Vec<String>,
    pub cold_replacement: String,
    pub generic_phrases: Vec<String>,
    pub menarche_sentence_terms: Vec<String>,
    pub menarche_keywords: Vec<String>,
    pub menarche_query_terms: Vec<String>,
    pub sex_context_terms: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SafetyRewrite {
    pub pattern: String,
    pub replacement: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContradictionPair {
    /// The incorrect claim; removed when both patterns co-occur.
    pub claim: String,
    pub counter: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FallbackPolicy {
    pub openings: EmotionPools,
    pub closings: EmotionPools,
    pub no_context_tail: String,
    pub generic_markers: Vec<String>,
    pub actionable_markers: Vec<String>,
    pub informative_markers: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmotionPools {
    pub pain: Vec<String>,
    pub anxious: Vec<String>,
    pub sad: Vec<String>,
    pub neutral: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TranslationPolicy {
    /// Ordered Swahili → English query mappings; a substring hit short-circuits
    /// translation entirely.
    pub direct_mappings: Vec<(String, String)>,
    /// Ordered substring rewrites applied to the lowercased query before
    /// translation.
    pub query_replacements: Vec<(String, String)>,
    /// Words that mark a preprocessed query as already English.
    pub english_indicators: Vec<String>,
    pub help_corrections: Vec<(String, String)>,
    pub labor_corrections: Vec<(String, String)>,
    /// Source terms indicating the query is about menstruation.
    pub period_source_terms: Vec<String>,
    /// Ordered formal → casual rewrites for translated Swahili. An empty
    /// replacement removes the phrase.
    pub naturalize: Vec<(String, String)>,
}

impl Policy {
    /// Load the policy tables, preferring `override_path` when given.
    pub fn load(override_path: Option<&Path>) -> Result<Self> {
        let raw = match override_path {
            Some(path) => std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read policy file {}", path.display()))?,
            None => EMBEDDED_POLICY.to_string(),
        };
        let policy: Policy =
            serde_json::from_str(&raw).context("Failed to parse policy tables")?;
        Ok(policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_policy_parses() {
        let policy = Policy::load(None).unwrap();
        assert!(!policy.validation.instruction_echo_en.is_empty());
        assert!(!policy.validation.instruction_echo_sw.is_empty());
        assert!(!policy.fallback.openings.neutral.is_empty());
        assert!(!policy.translation.naturalize.is_empty());
        assert!(!policy.retrieval.region_mismatch_phrases.is_empty());
    }

    #[test]
    fn canned_replies_cover_both_languages() {
        let policy = Policy::load(None).unwrap();
        assert!(policy.canned.greeting_sw.contains("Eunoia"));
        assert!(policy.canned.greeting_en.contains("Eunoia"));
        assert!(policy.canned.greeting_en_named.contains("{name}"));
    }

    #[test]
    fn direct_mappings_precede_generic_replacements() {
        // The longer period-pain mapping must be hit before the bare
        // "ninasaidia aje" rewrite would fire.
        let policy = Policy::load(None).unwrap();
        let first = &policy.translation.direct_mappings[0];
        assert_eq!(first.0, "ninasaidia aje maumivu ya hedhi");
        assert_eq!(first.1, "how to help with period pain");
    }
}
