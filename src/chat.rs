//! The per-request chat pipeline.
//!
//! Each turn runs: language resolution → special-case short-circuits
//! (greeting, off-topic, bot identity, language mismatch) → retrieval →
//! generation → acceptance gates → validation or empathetic fallback →
//! persistence. Whatever happens, a well-formed non-empty message gets a
//! response; persistence failures are logged and never surfaced.

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::sync::Arc;

use crate::defaults::{
    CONTEXT_WORD_BUDGET, DEFAULT_SIMILARITY_THRESHOLD, DEFAULT_TOP_K, SWAHILI_DIRECT_THRESHOLD,
};
use crate::fallback::FallbackComposer;
use crate::generate::Generator;
use crate::history::{ConversationStore, ASSISTANT_ROLE, USER_ROLE};
use crate::lang::{detect_emotion, detect_language, Emotion, Language};
use crate::policy::Policy;
use crate::retrieval::{summarize_context, ContextSource};
use crate::text;
use crate::translate::Translator;
use crate::validate::Validator;

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub message: String,
    pub user_id: String,
    pub conversation_id: Option<String>,
    pub language: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatOutcome {
    pub response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emotion: Option<Emotion>,
    pub language: Language,
    pub conversation_id: String,
}

pub struct ChatEngine {
    policy: Arc<Policy>,
    retriever: Arc<dyn ContextSource>,
    translator: Translator,
    generator: Generator,
    validator: Validator,
    composer: FallbackComposer,
    store: Arc<ConversationStore>,
}

impl ChatEngine {
    pub fn new(
        policy: Arc<Policy>,
        retriever: Arc<dyn ContextSource>,
        translator: Translator,
        generator: Generator,
        validator: Validator,
        composer: FallbackComposer,
        store: Arc<ConversationStore>,
    ) -> Self {
        Self {
            policy,
            retriever,
            translator,
            generator,
            validator,
            composer,
            store,
        }
    }

    pub async fn handle(&self, request: ChatRequest) -> Result<ChatOutcome> {
        let message = request.message.trim().to_string();
        if message.is_empty() {
            anyhow::bail!("No input given");
        }

        let conversation_id = match request.conversation_id.filter(|id| !id.is_empty()) {
            Some(id) => id,
            None => self.store.create_conversation(&request.user_id).await?,
        };

        let preference = request.language.as_deref().and_then(Language::from_code);
        let detected = detect_language(&message, &self.policy.language);
        let language = match preference {
            Some(p) => p,
            None => detected,
        };

        // Canned short-circuits skip retrieval and generation entirely.
        if let Some(reply) = self.greeting_reply(&message, language, request.name.as_deref()) {
            return self
                .respond_canned(&request.user_id, &conversation_id, &message, reply, language)
                .await;
        }
        if let Some(reply) = self.off_topic_reply(&message, language) {
            return self
                .respond_canned(&request.user_id, &conversation_id, &message, reply, language)
                .await;
        }
        if let Some(reply) = self.bot_identity_reply(&message, language) {
            return self
                .respond_canned(&request.user_id, &conversation_id, &message, reply, language)
                .await;
        }
        // An explicit language preference disagreeing with the typed language
        // gets a "switch modes" nudge instead of a weak cross-language answer.
        match (preference, detected) {
            (Some(Language::English), Language::Swahili) => {
                let reply = self.policy.canned.mismatch_sw_text_en_mode.clone();
                return self
                    .respond_canned(
                        &request.user_id,
                        &conversation_id,
                        &message,
                        reply,
                        Language::English,
                    )
                    .await;
            }
            (Some(Language::Swahili), Language::English) => {
                let reply = self.policy.canned.mismatch_en_text_sw_mode.clone();
                return self
                    .respond_canned(
                        &request.user_id,
                        &conversation_id,
                        &message,
                        reply,
                        Language::Swahili,
                    )
                    .await;
            }
            _ => {}
        }

        self.persist(&request.user_id, &conversation_id, USER_ROLE, &message)
            .await;

        // Swahili mode: translate the query and search the English corpus;
        // when translation is unavailable, search the Swahili corpus directly
        // with a looser threshold.
        let (query_for_generation, unfiltered_context) = match language {
            Language::Swahili => {
                let translated = self.translator.sw_to_en(&message).await;
                if translated.trim().to_lowercase() == message.trim().to_lowercase() {
                    tracing::warn!("Query translation unavailable, searching Swahili corpus directly");
                    let context = self.retriever.retrieve(
                        &message,
                        DEFAULT_TOP_K,
                        SWAHILI_DIRECT_THRESHOLD,
                        Language::Swahili,
                    );
                    (message.clone(), context)
                } else {
                    tracing::debug!("Query translated for retrieval: {translated}");
                    let context = self.retriever.retrieve(
                        &translated,
                        DEFAULT_TOP_K,
                        DEFAULT_SIMILARITY_THRESHOLD,
                        Language::English,
                    );
                    (translated, context)
                }
            }
            Language::English => {
                let context = self.retriever.retrieve(
                    &message,
                    DEFAULT_TOP_K,
                    DEFAULT_SIMILARITY_THRESHOLD,
                    Language::English,
                );
                (message.clone(), context)
            }
        };

        let raw_context = self.filter_query_specific(&message, &unfiltered_context);
        let context = summarize_context(&raw_context, CONTEXT_WORD_BUDGET);
        let raw_for_fallback = if raw_context.is_empty() {
            unfiltered_context
        } else {
            raw_context
        };

        let history = self
            .store
            .prompt_history(&request.user_id, &conversation_id)
            .await
            .unwrap_or_default();

        // Detect emotion on the English form of the query; the keyword lists
        // cover Swahili too for the untranslated path.
        let emotion = detect_emotion(&query_for_generation, &self.policy.emotion);

        let mut rng = StdRng::from_entropy();
        let response = match self
            .generator
            .answer(&query_for_generation, &context, &raw_for_fallback, &history, emotion, language)
            .await
        {
            Ok(draft) => {
                self.accept_or_fall_back(
                    draft,
                    &message,
                    &context,
                    &raw_for_fallback,
                    emotion,
                    language,
                    &mut rng,
                )
                .await
            }
            Err(e) => {
                tracing::error!("Generation failed: {e:#}");
                self.compose_fallback(&message, &context, &raw_for_fallback, emotion, language, &mut rng)
                    .await
            }
        };

        self.persist(&request.user_id, &conversation_id, ASSISTANT_ROLE, &response)
            .await;

        Ok(ChatOutcome {
            response,
            emotion: Some(emotion),
            language,
            conversation_id,
        })
    }

    /// Quality gates over the generated draft; failures engage the composer.
    #[allow(clippy::too_many_arguments)]
    async fn accept_or_fall_back<R: Rng>(
        &self,
        draft: String,
        message: &str,
        context: &str,
        raw_context: &str,
        emotion: Emotion,
        language: Language,
        rng: &mut R,
    ) -> String {
        let draft = match language {
            Language::Swahili => self.translator.en_to_sw(&draft).await,
            Language::English => draft,
        };

        if self.validator.contains_instruction_echo(&draft, language) {
            tracing::warn!("Draft echoes instructions or copies context, composing fallback");
            return self
                .compose_fallback(message, context, raw_context, emotion, language, rng)
                .await;
        }

        let (min_words, min_sentences) = match language {
            Language::Swahili => (20, 2),
            Language::English => (30, 3),
        };
        let words = text::word_count(&draft);
        let sentences = text::split_sentences(&draft).len();
        if words < min_words || sentences < min_sentences || self.validator.is_too_generic(&draft) {
            tracing::warn!(
                "Draft too short or generic (words: {words}, sentences: {sentences}), composing fallback"
            );
            return self
                .compose_fallback(message, context, raw_context, emotion, language, rng)
                .await;
        }

        let cleaned = self.validator.validate(&draft, message, rng);
        let words = text::word_count(&cleaned);
        let sentences = text::split_sentences(&cleaned).len();
        if words < min_words || sentences < min_sentences {
            tracing::warn!("Draft too short after validation, composing fallback");
            return self
                .compose_fallback(message, context, raw_context, emotion, language, rng)
                .await;
        }
        cleaned
    }

    async fn compose_fallback<R: Rng>(
        &self,
        message: &str,
        context: &str,
        raw_context: &str,
        emotion: Emotion,
        language: Language,
        rng: &mut R,
    ) -> String {
        // A heavily filtered context starves the composer; hand it the
        // unsummarized text instead.
        let usable = if text::word_count(context) < 20 {
            raw_context
        } else {
            context
        };
        let composed = self.composer.compose(message, usable, emotion, rng);
        match language {
            Language::Swahili => self.translator.en_to_sw(&composed).await,
            Language::English => composed,
        }
    }

    fn greeting_reply(&self, message: &str, language: Language, name: Option<&str>) -> Option<String> {
        let s = &self.policy.special_cases;
        let lowered = message.trim().to_lowercase();
        let words: Vec<&str> = lowered.split_whitespace().collect();
        let greetings = s.greetings_en.iter().chain(s.greetings_sw.iter());

        let short_greeting = words.len() <= 2
            && words.iter().any(|w| {
                s.greetings_en.iter().chain(s.greetings_sw.iter()).any(|g| g == w)
            });
        let greeting_prefix = greetings.clone().any(|g| {
            lowered == *g || (lowered.starts_with(g.as_str()) && lowered[g.len()..].starts_with(' '))
        });
        if !short_greeting && !greeting_prefix {
            return None;
        }

        Some(match language {
            Language::Swahili => self.policy.canned.greeting_sw.clone(),
            Language::English => match name.map(str::trim).filter(|n| !n.is_empty()) {
                Some(name) => self.policy.canned.greeting_en_named.replace("{name}", name),
                None => self.policy.canned.greeting_en.clone(),
            },
        })
    }

    fn off_topic_reply(&self, message: &str, language: Language) -> Option<String> {
        let lowered = message.to_lowercase();
        let words: Vec<String> = lowered
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
            .collect();
        let hit = self
            .policy
            .special_cases
            .off_topic_keywords
            .iter()
            .any(|k| words.iter().any(|w| w == k));
        if !hit {
            return None;
        }
        Some(match language {
            Language::Swahili => self.policy.canned.off_topic_sw.clone(),
            Language::English => self.policy.canned.off_topic_en.clone(),
        })
    }

    fn bot_identity_reply(&self, message: &str, language: Language) -> Option<String> {
        let lowered = message.to_lowercase();
        let hit = self
            .policy
            .special_cases
            .bot_identity_phrases
            .iter()
            .any(|p| lowered.contains(p.as_str()));
        if !hit {
            return None;
        }
        Some(match language {
            Language::Swahili => self.policy.canned.bot_identity_sw.clone(),
            Language::English => self.policy.canned.bot_identity_en.clone(),
        })
    }

    /// Drop context sentences denylisted for this particular query topic.
    fn filter_query_specific(&self, query: &str, context: &str) -> String {
        if context.is_empty() {
            return String::new();
        }
        let query_lower = query.to_lowercase();
        let Some(denylist) = self
            .policy
            .retrieval
            .query_denylists
            .iter()
            .find(|d| d.triggers.iter().any(|t| query_lower.contains(t.as_str())))
        else {
            return context.to_string();
        };

        let kept: Vec<String> = context
            .split('.')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .filter(|s| {
                let lower = s.to_lowercase();
                !denylist.terms.iter().any(|t| lower.contains(t.as_str()))
            })
            .map(str::to_string)
            .collect();
        kept.join(". ")
    }

    async fn respond_canned(
        &self,
        user_id: &str,
        conversation_id: &str,
        message: &str,
        response: String,
        language: Language,
    ) -> Result<ChatOutcome> {
        self.persist(user_id, conversation_id, USER_ROLE, message).await;
        self.persist(user_id, conversation_id, ASSISTANT_ROLE, &response).await;
        Ok(ChatOutcome {
            response,
            emotion: None,
            language,
            conversation_id: conversation_id.to_string(),
        })
    }

    async fn persist(&self, user_id: &str, conversation_id: &str, role: &str, text: &str) {
        if let Err(e) = self.store.append_turn(user_id, conversation_id, role, text).await {
            tracing::error!("Failed to persist {role} message: {e:#}");
        }
    }
}
