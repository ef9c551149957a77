//! Context retrieval: nearest-neighbor search plus admission filtering.
//!
//! A query is embedded and searched against the corpus index; candidates are
//! admitted on semantic similarity or lexical overlap, screened against the
//! denylists, deduplicated, and joined into a context string. Retrieval never
//! fails — anything going wrong degrades to an empty context.

use anyhow::Result;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::embedding::Embedder;
use crate::index::VectorIndex;
use crate::lang::Language;
use crate::policy::{Policy, RetrievalPolicy};
use crate::text;

/// Seam between the orchestrator and the search stack, so orchestration can
/// be tested against an in-memory source.
pub trait ContextSource: Send + Sync {
    fn retrieve(&self, query: &str, k: usize, threshold: f32, language: Language) -> String;
}

/// One language's searchable corpus: the index plus the texts it was built
/// from, in the same row order.
pub struct SearchCorpus {
    index: Mutex<VectorIndex>,
    texts: Vec<String>,
}

impl SearchCorpus {
    pub fn new(index: VectorIndex, texts: Vec<String>) -> Self {
        Self {
            index: Mutex::new(index),
            texts,
        }
    }

    /// `(text, distance)` candidates for the query vector, nearest first.
    fn candidates(&self, vector: &[f32], count: usize) -> Result<Vec<(String, f32)>> {
        let mut index = self
            .index
            .lock()
            .map_err(|_| anyhow::anyhow!("Index lock poisoned"))?;
        let hits = index.search(vector, count)?;
        Ok(hits
            .into_iter()
            .filter_map(|(row, distance)| self.texts.get(row).map(|t| (t.clone(), distance)))
            .collect())
    }
}

pub struct Retriever {
    embedder: Arc<Embedder>,
    english: SearchCorpus,
    swahili: Option<SearchCorpus>,
    policy: Arc<Policy>,
}

impl Retriever {
    pub fn new(
        embedder: Arc<Embedder>,
        english: SearchCorpus,
        swahili: Option<SearchCorpus>,
        policy: Arc<Policy>,
    ) -> Self {
        Self {
            embedder,
            english,
            swahili,
            policy,
        }
    }
}

impl ContextSource for Retriever {
    fn retrieve(&self, query: &str, k: usize, threshold: f32, language: Language) -> String {
        let corpus = match (language, &self.swahili) {
            (Language::Swahili, Some(sw)) => sw,
            _ => &self.english,
        };

        let vector = match self.embedder.embed_one(query) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("Query embedding failed: {e:#}");
                return String::new();
            }
        };

        // Over-fetch so the admission filters still have k survivors.
        let candidates = match corpus.candidates(&vector, k * 3) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("Index search failed: {e:#}");
                return String::new();
            }
        };

        let accepted = select_texts(query, &candidates, k, threshold, &self.policy.retrieval);
        let joined = accepted.join("\n");
        strip_region_sentences(&joined, &self.policy.retrieval)
    }
}

/// Admission filtering over search candidates, in order: empty-text skip,
/// similarity-or-overlap test, denylists, exact dedup, stop at k.
pub fn select_texts(
    query: &str,
    candidates: &[(String, f32)],
    k: usize,
    threshold: f32,
    policy: &RetrievalPolicy,
) -> Vec<String> {
    let query_lower = query.to_lowercase();
    let query_words = text::word_set(&query_lower);
    let query_mentions_exception = policy
        .irrelevant_query_exceptions
        .iter()
        .any(|term| query_lower.contains(term.as_str()));

    let mut seen: HashSet<&str> = HashSet::new();
    let mut accepted = Vec::new();

    for (candidate, distance) in candidates {
        if candidate.trim().is_empty() {
            continue;
        }

        let similarity = 1.0 / (1.0 + distance);
        let lower = candidate.to_lowercase();
        let candidate_words = text::word_set(&lower);
        let overlap = query_words.intersection(&candidate_words).count() as f32
            / query_words.len().max(1) as f32;

        if similarity < threshold && overlap <= 0.15 {
            continue;
        }
        if seen.contains(candidate.as_str()) {
            continue;
        }

        let is_irrelevant = policy
            .irrelevant_terms
            .iter()
            .any(|term| lower.contains(term.as_str()))
            && !query_mentions_exception;
        let has_region_mismatch = policy
            .region_mismatch_phrases
            .iter()
            .any(|phrase| lower.contains(phrase.as_str()));

        if is_irrelevant || has_region_mismatch {
            continue;
        }

        accepted.push(candidate.clone());
        seen.insert(candidate.as_str());
        if accepted.len() >= k {
            break;
        }
    }

    accepted
}

/// Drop every sentence containing a region-mismatch phrase. Catches phrases
/// inside otherwise-admitted texts.
pub fn strip_region_sentences(context: &str, policy: &RetrievalPolicy) -> String {
    if context.is_empty() {
        return String::new();
    }
    let kept: Vec<String> = context
        .split('.')
        .map(str::trim)
        .filter(|sentence| !sentence.is_empty())
        .filter(|sentence| {
            let lower = sentence.to_lowercase();
            !policy
                .region_mismatch_phrases
                .iter()
                .any(|phrase| lower.contains(phrase.as_str()))
        })
        .map(str::to_string)
        .collect();
    kept.join(". ")
}

/// Greedily keep whole sentences within the word budget; append the head of
/// the next sentence only when at least 20 words of budget remain.
pub fn summarize_context(context: &str, max_words: usize) -> String {
    if context.is_empty() {
        return String::new();
    }

    let sentences = text::split_sentences(context);
    let mut used = 0usize;
    let mut selected: Vec<String> = Vec::new();

    for sentence in sentences {
        let words: Vec<&str> = sentence.split_whitespace().collect();
        if used + words.len() <= max_words {
            used += words.len();
            selected.push(sentence);
        } else {
            let remaining = max_words - used;
            if remaining > 20 {
                selected.push(words[..remaining].join(" "));
            }
            break;
        }
    }

    selected.join(". ")
}
