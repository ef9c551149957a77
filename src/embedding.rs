//! Sentence embeddings via fastembed (ONNX runtime).
//!
//! Uses all-MiniLM-L6-v2, the same 384-dimension model the index artifacts
//! were built with. The model handle requires exclusive access for inference,
//! so it sits behind a mutex; construction happens once at startup.

use anyhow::{Context, Result};
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::Mutex;

use crate::defaults::EMBEDDING_DIMENSION;

pub struct Embedder {
    model: Mutex<TextEmbedding>,
}

impl Embedder {
    pub fn new() -> Result<Self> {
        let model = TextEmbedding::try_new(
            InitOptions::new(EmbeddingModel::AllMiniLML6V2).with_show_download_progress(false),
        )
        .context("Failed to initialize embedding model")?;
        Ok(Self {
            model: Mutex::new(model),
        })
    }

    pub fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let mut model = self
            .model
            .lock()
            .map_err(|_| anyhow::anyhow!("Embedding model lock poisoned"))?;
        let embeddings = model
            .embed(texts.to_vec(), None)
            .context("Failed to embed texts")?;
        Ok(embeddings)
    }

    pub fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut embeddings = self.embed_batch(&[text.to_string()])?;
        embeddings
            .pop()
            .ok_or_else(|| anyhow::anyhow!("Embedding model returned no vector"))
    }

    pub const fn dimension() -> usize {
        EMBEDDING_DIMENSION
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimension_matches_minilm() {
        assert_eq!(Embedder::dimension(), 384);
    }
}
