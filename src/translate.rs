//! Runtime translation between English and Swahili.
//!
//! Two pretrained models sit behind text2text endpoints, one per direction.
//! The Swahili → English path rewrites known query shapes first and skips the
//! model entirely when a direct mapping resolves the query; the English →
//! Swahili path rewrites the formal machine output into casual Kenyan
//! phrasing. Translation is fail-open: any error returns the input unchanged.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::inference::{GenerationParams, Text2TextClient};
use crate::policy::Policy;

#[async_trait]
pub trait TranslationBackend: Send + Sync {
    async fn en_to_sw(&self, text: &str) -> Result<String>;
    async fn sw_to_en(&self, text: &str) -> Result<String>;
}

pub struct HttpTranslationBackend {
    en_sw: Text2TextClient,
    sw_en: Text2TextClient,
}

impl HttpTranslationBackend {
    pub fn new(en_sw: Text2TextClient, sw_en: Text2TextClient) -> Self {
        Self { en_sw, sw_en }
    }
}

#[async_trait]
impl TranslationBackend for HttpTranslationBackend {
    async fn en_to_sw(&self, text: &str) -> Result<String> {
        self.en_sw.generate(text, &GenerationParams::translation()).await
    }

    async fn sw_to_en(&self, text: &str) -> Result<String> {
        self.sw_en.generate(text, &GenerationParams::translation()).await
    }
}

pub struct Translator {
    backend: Arc<dyn TranslationBackend>,
    policy: Arc<Policy>,
}

impl Translator {
    pub fn new(backend: Arc<dyn TranslationBackend>, policy: Arc<Policy>) -> Self {
        Self { backend, policy }
    }

    /// Translate to Swahili and naturalize. Returns the input unchanged when
    /// the model is unreachable.
    pub async fn en_to_sw(&self, text: &str) -> String {
        if text.trim().is_empty() {
            return String::new();
        }
        match self.backend.en_to_sw(text).await {
            Ok(swahili) => self.naturalize(&swahili),
            Err(e) => {
                tracing::warn!("en→sw translation failed, keeping English: {e:#}");
                text.to_string()
            }
        }
    }

    /// Translate a Swahili query to English. Preprocessing may resolve the
    /// query without the model; otherwise the model output gets the fixed
    /// corrections. Returns the input unchanged when the model is unreachable.
    pub async fn sw_to_en(&self, text: &str) -> String {
        if text.trim().is_empty() {
            return String::new();
        }

        let preprocessed = self.preprocess_swahili_query(text);
        if preprocessed != text && self.looks_english(&preprocessed) {
            tracing::debug!("Direct mapping resolved query without translation");
            return preprocessed;
        }

        let source = if preprocessed != text { preprocessed.as_str() } else { text };
        match self.backend.sw_to_en(source).await {
            Ok(english) => self.correct_english(english, text),
            Err(e) => {
                tracing::warn!("sw→en translation failed, keeping original: {e:#}");
                text.to_string()
            }
        }
    }

    /// Rewrite common Swahili query shapes into forms the translation model
    /// handles well. A direct-mapping substring hit returns its English
    /// equivalent outright.
    pub fn preprocess_swahili_query(&self, text: &str) -> String {
        let tables = &self.policy.translation;
        let lowered = text.trim().to_lowercase();

        for (swahili, english) in &tables.direct_mappings {
            if lowered.contains(swahili.as_str()) {
                return english.clone();
            }
        }

        let mut result = lowered.clone();
        for (swahili, english) in &tables.query_replacements {
            if result.contains(swahili.as_str()) {
                result = result.replace(swahili.as_str(), english);
            }
        }

        // Shape pain/period fragments into a question when no question word
        // survived the rewrites.
        let has_question_word =
            result.contains("how") || result.contains("why") || result.contains("what");
        if !has_question_word
            && (result.contains("pain") || result.contains("cramp") || result.contains("period"))
        {
            if !result.contains("help") {
                result = format!("how to help with {result}");
            } else {
                result = format!("how {result}");
            }
        }

        // Nothing useful changed: hand the original to the model.
        if result == lowered
            && result.split_whitespace().count() == text.split_whitespace().count()
        {
            return text.to_string();
        }
        result
    }

    fn looks_english(&self, text: &str) -> bool {
        let lowered = text.to_lowercase();
        self.policy
            .translation
            .english_indicators
            .iter()
            .any(|w| lowered.contains(w.as_str()))
    }

    /// Fixed corrections for known mistranslations.
    fn correct_english(&self, mut english: String, source: &str) -> String {
        let tables = &self.policy.translation;
        let lowered = english.to_lowercase();

        if lowered.contains("help to come") || lowered.contains("help come") {
            for (from, to) in &tables.help_corrections {
                english = english.replace(from.as_str(), to);
            }
        }

        let source_lower = source.to_lowercase();
        let about_menstruation = tables
            .period_source_terms
            .iter()
            .any(|t| source_lower.contains(t.as_str()));
        if lowered.contains("labor pain") && about_menstruation {
            for (from, to) in &tables.labor_corrections {
                english = english.replace(from.as_str(), to);
            }
        }

        if english.trim().to_lowercase() == source_lower.trim() {
            tracing::warn!("Translation returned the source text unchanged");
        }

        english
    }

    /// Rewrite formal machine Swahili into casual Kenyan phrasing: ordered
    /// phrase substitutions, long-sentence splitting at conjunctions, and
    /// punctuation cleanup.
    pub fn naturalize(&self, text: &str) -> String {
        if text.is_empty() {
            return String::new();
        }

        let mut result = text.to_string();
        for (formal, casual) in &self.policy.translation.naturalize {
            result = result.replace(formal.as_str(), casual);
        }

        // Break sentences longer than 25 words at "au"/"na".
        let mut sentences: Vec<String> = Vec::new();
        for sentence in result.split(". ") {
            let sentence = sentence.trim();
            if sentence.is_empty() {
                continue;
            }
            let words = sentence.split_whitespace().count();
            if words > 25 {
                if let Some((head, tail)) = sentence.split_once(" au ") {
                    sentences.push(format!("{}.", head.trim()));
                    sentences.push(format!("Au {}", tail.trim()));
                } else if let Some((head, tail)) = sentence.split_once(" na ") {
                    sentences.push(format!("{}.", head.trim()));
                    sentences.push(format!("Na {}", tail.trim()));
                } else {
                    sentences.push(sentence.to_string());
                }
            } else {
                sentences.push(sentence.to_string());
            }
        }
        result = sentences.join(". ");

        // Cleanup left over from phrase removal and splitting.
        result = result.split_whitespace().collect::<Vec<_>>().join(" ");
        result = result.replace("..", ".");
        result = result.replace(" .", ".");
        result = result.replace(" ,", ",");

        // Capitalize each sentence start.
        let capitalized: Vec<String> = result
            .split(". ")
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                let mut chars = s.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                    None => String::new(),
                }
            })
            .collect();

        capitalized.join(". ").trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct EchoBackend;

    #[async_trait]
    impl TranslationBackend for EchoBackend {
        async fn en_to_sw(&self, text: &str) -> Result<String> {
            Ok(format!("sw:{text}"))
        }
        async fn sw_to_en(&self, text: &str) -> Result<String> {
            Ok(format!("en:{text}"))
        }
    }

    struct FailingBackend;

    #[async_trait]
    impl TranslationBackend for FailingBackend {
        async fn en_to_sw(&self, _text: &str) -> Result<String> {
            anyhow::bail!("model unavailable")
        }
        async fn sw_to_en(&self, _text: &str) -> Result<String> {
            anyhow::bail!("model unavailable")
        }
    }

    struct CountingBackend {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TranslationBackend for CountingBackend {
        async fn en_to_sw(&self, text: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(text.to_string())
        }
        async fn sw_to_en(&self, text: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(text.to_string())
        }
    }

    fn translator(backend: Arc<dyn TranslationBackend>) -> Translator {
        Translator::new(backend, Arc::new(Policy::load(None).unwrap()))
    }

    #[tokio::test]
    async fn direct_mapping_skips_the_model() {
        let backend = Arc::new(CountingBackend { calls: AtomicUsize::new(0) });
        let t = Translator::new(backend.clone(), Arc::new(Policy::load(None).unwrap()));
        let english = t.sw_to_en("ninasaidia aje maumivu ya hedhi").await;
        assert_eq!(english, "how to help with period pain");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failure_is_fail_open() {
        let t = translator(Arc::new(FailingBackend));
        assert_eq!(t.sw_to_en("swali langu la hedhi").await, "swali langu la hedhi");
        assert_eq!(t.en_to_sw("my answer").await, "my answer");
    }

    #[test]
    fn replacements_rewrite_question_words() {
        let t = translator(Arc::new(EchoBackend));
        let out = t.preprocess_swahili_query("mbona hedhi imekuja mapema");
        assert!(out.starts_with("why"), "got: {out}");
    }

    #[test]
    fn unknown_text_passes_through_untouched() {
        let t = translator(Arc::new(EchoBackend));
        let original = "leo kuna jua kali";
        assert_eq!(t.preprocess_swahili_query(original), original);
    }

    #[tokio::test]
    async fn labor_pain_corrected_for_menstrual_queries() {
        struct LaborBackend;
        #[async_trait]
        impl TranslationBackend for LaborBackend {
            async fn en_to_sw(&self, text: &str) -> Result<String> {
                Ok(text.to_string())
            }
            async fn sw_to_en(&self, _text: &str) -> Result<String> {
                Ok("how to ease labor pains".to_string())
            }
        }
        let t = translator(Arc::new(LaborBackend));
        let english = t.sw_to_en("nisaidie kupunguza uchungu wa hedhi").await;
        assert_eq!(english, "how to ease period pain");
    }

    #[test]
    fn naturalize_applies_casual_rewrites() {
        let t = translator(Arc::new(EchoBackend));
        let out = t.naturalize("Ikiwa una maumivu, wasiliana na mtaalamu wa afya");
        assert!(out.contains("Kama una"), "got: {out}");
        assert!(out.contains("daktari"), "got: {out}");
        assert!(!out.contains("mtaalamu wa afya"));
    }

    #[test]
    fn naturalize_splits_long_sentences_at_conjunctions() {
        let t = translator(Arc::new(EchoBackend));
        let long: Vec<String> = (0..13).map(|i| format!("neno{i}")).collect();
        let sentence = format!("{} au {}", long.join(" "), long.join(" "));
        let out = t.naturalize(&sentence);
        assert!(out.contains(". Au "), "got: {out}");
    }

    #[test]
    fn naturalize_cleans_double_periods_and_capitalizes() {
        let t = translator(Arc::new(EchoBackend));
        let out = t.naturalize("pole sana.. kunywa maji mengi");
        assert!(!out.contains(".."));
        assert!(out.starts_with('P'), "got: {out}");
    }

    #[tokio::test]
    async fn empty_input_translates_to_empty() {
        let t = translator(Arc::new(EchoBackend));
        assert_eq!(t.en_to_sw("   ").await, "");
        assert_eq!(t.sw_to_en("").await, "");
    }
}
