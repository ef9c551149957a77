use std::path::PathBuf;

/// Runtime configuration, collected from the environment at startup.
///
/// Every knob has a default so the service starts with nothing but the data
/// files in the working directory.
#[derive(Debug, Clone)]
pub struct Config {
    /// English knowledge base CSV (`question`, `answer` columns).
    pub corpus_csv: PathBuf,
    /// Optional pre-translated Swahili CSV (`question_sw`, `answer_sw` columns).
    pub corpus_sw_csv: PathBuf,
    /// Persisted embedding matrix, one JSON array per line.
    pub embeddings_path: PathBuf,
    /// Persisted Faiss index over the English corpus.
    pub index_path: PathBuf,
    pub embeddings_sw_path: PathBuf,
    pub index_sw_path: PathBuf,
    /// Directory holding one conversations JSON file per user.
    pub conversations_dir: PathBuf,
    /// Optional override for the embedded policy tables.
    pub policy_path: Option<PathBuf>,
    /// Text2text endpoint serving the fine-tuned generation model.
    pub generator_url: String,
    /// Text2text endpoint serving the English → Swahili translation model.
    pub translator_en_sw_url: String,
    /// Text2text endpoint serving the Swahili → English translation model.
    pub translator_sw_en_url: String,
    pub bind_addr: String,
}

impl Config {
    pub fn from_env() -> Self {
        let data_dir = PathBuf::from(
            std::env::var("EUNOIA_DATA_DIR").unwrap_or_else(|_| ".".to_string()),
        );

        Self {
            corpus_csv: data_dir.join("menstrual_data.csv"),
            corpus_sw_csv: data_dir.join("menstrual_data_sw.csv"),
            embeddings_path: data_dir.join("embeddings.jsonl"),
            index_path: data_dir.join("menstrual_index.faiss"),
            embeddings_sw_path: data_dir.join("embeddings_sw.jsonl"),
            index_sw_path: data_dir.join("menstrual_index_sw.faiss"),
            conversations_dir: PathBuf::from(
                std::env::var("EUNOIA_CONVERSATIONS_DIR")
                    .unwrap_or_else(|_| "./conversations".to_string()),
            ),
            policy_path: std::env::var("EUNOIA_POLICY_FILE").ok().map(PathBuf::from),
            generator_url: std::env::var("EUNOIA_GENERATOR_URL")
                .unwrap_or_else(|_| "http://localhost:8090".to_string()),
            translator_en_sw_url: std::env::var("EUNOIA_TRANSLATOR_EN_SW_URL")
                .unwrap_or_else(|_| "http://localhost:8091".to_string()),
            translator_sw_en_url: std::env::var("EUNOIA_TRANSLATOR_SW_EN_URL")
                .unwrap_or_else(|_| "http://localhost:8092".to_string()),
            bind_addr: std::env::var("EUNOIA_BIND_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:5000".to_string()),
        }
    }
}
