//! Prompt assembly and the generation call.
//!
//! One stateless call per turn: system instruction, emotion hint,
//! conversation history, context, question. Swahili mode generates in English
//! and is translated afterwards, so its system instruction differs. When the
//! assembled prompt runs past the token budget, the context is re-summarized
//! to a tighter budget and history is cut to the last two lines.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::defaults::{PROMPT_TOKEN_BUDGET, TIGHT_CONTEXT_WORD_BUDGET};
use crate::inference::{GenerationParams, Text2TextClient};
use crate::lang::{Emotion, Language};
use crate::policy::Policy;
use crate::retrieval::summarize_context;
use crate::text::estimate_tokens;

#[async_trait]
pub trait TextGeneration: Send + Sync {
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String>;
}

#[async_trait]
impl TextGeneration for Text2TextClient {
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        Text2TextClient::generate(self, prompt, params).await
    }
}

pub struct Generator {
    backend: Arc<dyn TextGeneration>,
    policy: Arc<Policy>,
}

impl Generator {
    pub fn new(backend: Arc<dyn TextGeneration>, policy: Arc<Policy>) -> Self {
        Self { backend, policy }
    }

    /// Generate a draft answer. `raw_context` is the unsummarized context,
    /// used when the prompt must be tightened.
    pub async fn answer(
        &self,
        question: &str,
        context: &str,
        raw_context: &str,
        history: &str,
        emotion: Emotion,
        language: Language,
    ) -> Result<String> {
        let mut prompt = self.build_prompt(question, context, history, emotion, language);

        if estimate_tokens(&prompt) > PROMPT_TOKEN_BUDGET {
            let source = if raw_context.is_empty() { context } else { raw_context };
            let tight_context = summarize_context(source, TIGHT_CONTEXT_WORD_BUDGET);
            let tight_history = last_lines(history, 2);
            prompt =
                self.build_prompt(question, &tight_context, &tight_history, emotion, language);
            tracing::debug!(
                "Prompt over budget, reassembled at ~{} tokens",
                estimate_tokens(&prompt)
            );
        }

        self.backend.generate(&prompt, &GenerationParams::chat()).await
    }

    pub fn build_prompt(
        &self,
        question: &str,
        context: &str,
        history: &str,
        emotion: Emotion,
        language: Language,
    ) -> String {
        let prompts = &self.policy.prompt;
        let system = match language {
            Language::Swahili => &prompts.system_sw_mode,
            Language::English => &prompts.system_en,
        };
        let emotion_instruction = match emotion {
            Emotion::Pain => &prompts.emotion_instructions.pain,
            Emotion::Anxious => &prompts.emotion_instructions.anxious,
            Emotion::Sad => &prompts.emotion_instructions.sad,
            Emotion::Neutral => &prompts.emotion_instructions.neutral,
        };

        let mut prompt = format!("{system}\n{emotion_instruction}\n");
        if !history.is_empty() {
            prompt.push_str(&format!("Conversation so far:\n{history}\n"));
        }
        prompt.push_str(&format!("Context: {context}\n"));
        match language {
            Language::Swahili => {
                prompt.push_str(&format!(
                    "Question (user wrote in Swahili, translated to English): {question}\n"
                ));
                prompt.push_str("Answer in English (will be translated to Swahili):");
            }
            Language::English => {
                prompt.push_str(&format!("Question: {question}\n"));
                prompt.push_str("Answer:");
            }
        }
        prompt
    }
}

fn last_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    if lines.len() <= n {
        return text.to_string();
    }
    lines[lines.len() - n..].join("\n")
}
