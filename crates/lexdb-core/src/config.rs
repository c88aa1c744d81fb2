//! Layered configuration and path helpers.
//!
//! Uses Figment to merge built-in defaults, `config.toml`, `config.<env>.toml`
//! and `APP_*` env vars (`__` separates nested keys, e.g.
//! `APP_STORE__BATCH_SIZE=1000`). `expand_path` handles `~` and `${VAR}` in
//! configured paths.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

use crate::chunker::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use crate::error::{Error, Result};
use crate::types::{BackendKind, Metric};

/// Sections retrieved per question unless the caller asks otherwise.
pub const DEFAULT_TOP_K: usize = 3;

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        Ok(Self { figment: Self::figment_for(&env_name) })
    }

    /// Defaults, then the shared file, then the per-environment file, then env vars.
    pub fn figment_for(env_name: &str) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file("config.toml"));
        match env_name {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment.merge(Env::prefixed("APP_").split("__"))
    }

    /// Extract and validate the whole typed configuration.
    pub fn app(&self) -> anyhow::Result<AppConfig> {
        let cfg: AppConfig = self
            .figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;
        cfg.validate()?;
        Ok(cfg)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub data: DataConfig,
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingConfig,
    pub store: StoreConfig,
    pub query: QueryConfig,
    pub generation: GenerationConfig,
    pub indexing: IndexingConfig,
    pub retry: RetryConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chunking.size == 0 || self.chunking.overlap >= self.chunking.size {
            return Err(Error::InvalidConfig(format!(
                "chunking.overlap ({}) must be smaller than chunking.size ({})",
                self.chunking.overlap, self.chunking.size
            )));
        }
        if self.store.batch_size == 0 {
            return Err(Error::InvalidConfig("store.batch_size must be positive".into()));
        }
        if self.embedding.workers == 0 {
            return Err(Error::InvalidConfig("embedding.workers must be positive".into()));
        }
        if self.embedding.provider == EmbeddingProvider::Local && self.embedding.model_dir.is_none() {
            return Err(Error::InvalidConfig("embedding.model_dir is required for the local provider".into()));
        }
        if self.query.top_k == 0 {
            return Err(Error::InvalidConfig("query.top_k must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Folder of structured act files to index.
    pub folder: String,
    /// Folder the metadata browser reads; usually the same as `folder`.
    pub metadata_folder: String,
    pub collection: String,
    /// Also ingest `.txt` files, one section per act titled by the file name.
    pub plain_text: bool,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            folder: "data/acts".into(),
            metadata_folder: "data/acts".into(),
            collection: "legal_acts".into(),
            plain_text: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub size: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { size: DEFAULT_CHUNK_SIZE, overlap: DEFAULT_CHUNK_OVERLAP }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    Fake,
    Local,
    #[default]
    Ollama,
    OpenAi,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    pub model: String,
    pub base_url: String,
    /// Output dimension. Remote models must report this size; the fake model uses it as-is.
    pub dim: usize,
    /// Directory with `tokenizer.json`, `config.json` and weights for the local model.
    pub model_dir: Option<String>,
    /// Name of the env var holding the API key, if the provider needs one.
    pub api_key_env: Option<String>,
    /// Maximum in-flight embedding calls.
    pub workers: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Ollama,
            model: "nomic-embed-text".into(),
            base_url: "http://localhost:11434".into(),
            dim: 768,
            model_dir: None,
            api_key_env: None,
            workers: 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: BackendKind,
    /// LanceDB directory for the persistent backend.
    pub path: String,
    pub metric: Metric,
    pub batch_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Persistent,
            path: "~/.lexdb/lance".into(),
            metric: Metric::Cosine,
            batch_size: 5000,
        }
    }
}

impl StoreConfig {
    pub fn ephemeral() -> Self {
        Self { backend: BackendKind::Ephemeral, ..Self::default() }
    }

    pub fn resolved_path(&self) -> PathBuf {
        expand_path(&self.path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub top_k: usize,
    /// Characters of each retrieved chunk placed in the prompt context.
    pub max_chunk_chars: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self { top_k: DEFAULT_TOP_K, max_chunk_chars: 1000 }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationProvider {
    /// No model configured: answers are the retrieved excerpts.
    None,
    /// OpenAI-compatible `/chat/completions` endpoint.
    #[default]
    Chat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub provider: GenerationProvider,
    pub base_url: String,
    pub model: String,
    pub api_key_env: Option<String>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub system_prompt: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: GenerationProvider::Chat,
            base_url: "https://api.groq.com/openai/v1".into(),
            model: "llama3-70b-8192".into(),
            api_key_env: Some("GROQ_API_KEY".into()),
            temperature: 0.2,
            max_tokens: None,
            system_prompt: "You are a legal expert on Indian laws.".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingConfig {
    pub progress: bool,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self { progress: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: usize,
    pub base_delay_ms: u64,
    /// Per-attempt timeout; 0 disables it.
    pub timeout_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay_ms: 2000, timeout_secs: 60 }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}
