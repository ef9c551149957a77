//! Language and emotion detection.
//!
//! Both are keyword heuristics over the policy tables: emotion detection is a
//! priority scan (pain before anxious before sad), language detection scores
//! Swahili function words and domain terms.

use crate::policy::{EmotionPolicy, LanguagePolicy};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Language {
    #[serde(rename = "en")]
    English,
    #[serde(rename = "sw")]
    Swahili,
}

impl Language {
    pub fn code(self) -> &'static str {
        match self {
            Language::English => "en",
            Language::Swahili => "sw",
        }
    }

    pub fn from_code(code: &str) -> Option<Language> {
        match code.trim().to_lowercase().as_str() {
            "en" | "english" => Some(Language::English),
            "sw" | "swahili" => Some(Language::Swahili),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Pain,
    Anxious,
    Sad,
    Neutral,
}

impl Emotion {
    pub fn as_str(self) -> &'static str {
        match self {
            Emotion::Pain => "pain",
            Emotion::Anxious => "anxious",
            Emotion::Sad => "sad",
            Emotion::Neutral => "neutral",
        }
    }
}

/// Keyword scan in priority order. Keywords cover both languages so Swahili
/// queries are classified without translation.
pub fn detect_emotion(text: &str, policy: &EmotionPolicy) -> Emotion {
    let lowered = text.to_lowercase();
    if policy.pain.iter().any(|w| lowered.contains(w.as_str())) {
        return Emotion::Pain;
    }
    if policy.anxious.iter().any(|w| lowered.contains(w.as_str())) {
        return Emotion::Anxious;
    }
    if policy.sad.iter().any(|w| lowered.contains(w.as_str())) {
        return Emotion::Sad;
    }
    Emotion::Neutral
}

/// Classify as Swahili when a strong domain marker appears, or when at least
/// a quarter of the words are common Swahili function words. Defaults to
/// English, mirroring how the service treats undetectable input.
pub fn detect_language(text: &str, policy: &LanguagePolicy) -> Language {
    let lowered = text.to_lowercase();
    let words: Vec<String> = lowered
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|w| !w.is_empty())
        .collect();

    if words.is_empty() {
        return Language::English;
    }

    if words
        .iter()
        .any(|w| policy.strong_markers.iter().any(|m| m == w))
    {
        return Language::Swahili;
    }

    let hits = words
        .iter()
        .filter(|w| policy.swahili_markers.iter().any(|m| m == *w))
        .count();

    if words.len() >= 2 && hits as f32 / words.len() as f32 >= 0.25 {
        Language::Swahili
    } else {
        Language::English
    }
}
