//! Application context: every shared resource, constructed eagerly at
//! startup and handed to request handlers as one `Arc`.
//!
//! Nothing here is lazily initialized — the corpus, embedding model, indexes,
//! policy tables, inference clients and conversation store all exist before
//! the listener accepts its first request.

use anyhow::{Context as _, Result};
use std::path::Path;
use std::sync::Arc;

use crate::chat::ChatEngine;
use crate::config::Config;
use crate::corpus::Corpus;
use crate::embedding::Embedder;
use crate::fallback::FallbackComposer;
use crate::generate::Generator;
use crate::history::ConversationStore;
use crate::index::{self, VectorIndex};
use crate::inference::Text2TextClient;
use crate::policy::Policy;
use crate::retrieval::{Retriever, SearchCorpus};
use crate::translate::{HttpTranslationBackend, Translator};
use crate::validate::Validator;

pub struct AppContext {
    pub config: Config,
    pub policy: Arc<Policy>,
    pub engine: ChatEngine,
    pub store: Arc<ConversationStore>,
}

impl AppContext {
    pub async fn initialize(config: Config) -> Result<Self> {
        let policy = Arc::new(Policy::load(config.policy_path.as_deref())?);

        let corpus = Corpus::load(&config.corpus_csv, &config.corpus_sw_csv)?;
        if corpus.is_empty() {
            return Err(crate::errors::ServiceError::CorpusNotFound(
                config.corpus_csv.display().to_string(),
            )
            .into());
        }

        let embedder = Arc::new(Embedder::new()?);

        let english = open_or_build(
            &embedder,
            corpus.answers(),
            &config.index_path,
            &config.embeddings_path,
        )
        .context("Failed to prepare English index")?;

        let swahili = match corpus.swahili_answers() {
            Some(answers) => Some(
                open_or_build(
                    &embedder,
                    answers,
                    &config.index_sw_path,
                    &config.embeddings_sw_path,
                )
                .context("Failed to prepare Swahili index")?,
            ),
            None => None,
        };

        let retriever = Arc::new(Retriever::new(
            embedder,
            english,
            swahili,
            policy.clone(),
        ));

        let generator = Generator::new(
            Arc::new(Text2TextClient::new(&config.generator_url)?),
            policy.clone(),
        );
        let translator = Translator::new(
            Arc::new(HttpTranslationBackend::new(
                Text2TextClient::new(&config.translator_en_sw_url)?,
                Text2TextClient::new(&config.translator_sw_en_url)?,
            )),
            policy.clone(),
        );

        let validator = Validator::new(policy.clone())?;
        let composer = FallbackComposer::new(policy.clone());
        let store = Arc::new(ConversationStore::new(&config.conversations_dir)?);

        let engine = ChatEngine::new(
            policy.clone(),
            retriever,
            translator,
            generator,
            validator,
            composer,
            store.clone(),
        );

        Ok(Self {
            config,
            policy,
            engine,
            store,
        })
    }
}

/// Load the persisted index and embedding matrix, or embed the corpus and
/// persist both. A row-count mismatch with the corpus forces a rebuild, since
/// index row i must be corpus row i.
fn open_or_build(
    embedder: &Embedder,
    texts: Vec<String>,
    index_path: &Path,
    matrix_path: &Path,
) -> Result<SearchCorpus> {
    if index_path.exists() && matrix_path.exists() {
        match VectorIndex::load(index_path) {
            Ok(index) if index.ntotal() == texts.len() => {
                tracing::info!(
                    "Loaded index {} ({} vectors)",
                    index_path.display(),
                    index.ntotal()
                );
                return Ok(SearchCorpus::new(index, texts));
            }
            Ok(index) => {
                tracing::warn!(
                    "Index {} has {} vectors but corpus has {}; rebuilding",
                    index_path.display(),
                    index.ntotal(),
                    texts.len()
                );
            }
            Err(e) => {
                tracing::warn!("Could not load index {}: {e:#}; rebuilding", index_path.display());
            }
        }
    } else {
        tracing::info!("Index artifacts missing, embedding corpus ({} texts)", texts.len());
    }

    let vectors = embedder.embed_batch(&texts)?;
    let index = VectorIndex::build(Embedder::dimension(), &vectors)?;
    index.save(index_path)?;
    index::write_matrix(matrix_path, &vectors)?;
    Ok(SearchCorpus::new(index, texts))
}
