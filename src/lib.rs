//! Eunoia chatbot backend
//!
//! A bilingual (English/Swahili) menstrual-health question-answering service:
//! retrieval-augmented generation over a fixed knowledge base, with heavy
//! heuristic post-processing of model output.

pub mod api;
pub mod chat;
pub mod config;
pub mod context;
pub mod corpus;
pub mod embedding;
pub mod fallback;
pub mod generate;
pub mod history;
pub mod index;
pub mod inference;
pub mod lang;
pub mod policy;
pub mod retrieval;
pub mod text;
pub mod translate;
pub mod validate;

pub use config::Config;
pub use context::AppContext;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod defaults {
    /// Dimension of the all-MiniLM-L6-v2 sentence embeddings.
    pub const EMBEDDING_DIMENSION: usize = 384;
    pub const DEFAULT_TOP_K: usize = 5;
    pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.5;
    /// Looser threshold used when searching the Swahili corpus directly.
    pub const SWAHILI_DIRECT_THRESHOLD: f32 = 0.4;
    pub const CONTEXT_WORD_BUDGET: usize = 120;
    /// Tighter budget applied when the assembled prompt runs over the token cap.
    pub const TIGHT_CONTEXT_WORD_BUDGET: usize = 80;
    pub const PROMPT_TOKEN_BUDGET: usize = 400;
    /// Messages of history included in the generation prompt.
    pub const MAX_PROMPT_HISTORY: usize = 5;
    /// Messages retained per conversation on disk.
    pub const MAX_STORED_MESSAGES: usize = 50;
}

/// Error types for the chatbot service
pub mod errors {
    use anyhow::Error;

    pub type Result<T> = std::result::Result<T, Error>;

    #[derive(Debug, thiserror::Error)]
    pub enum ServiceError {
        #[error("Knowledge base not found: {0}")]
        CorpusNotFound(String),

        #[error("Invalid dimension: expected {expected}, got {actual}")]
        InvalidDimension { expected: usize, actual: usize },

        #[error("Conversation not found: {0}")]
        ConversationNotFound(String),

        #[error("Inference endpoint error: {0}")]
        Inference(String),
    }
}
