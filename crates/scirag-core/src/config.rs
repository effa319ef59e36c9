//! Lightweight configuration loader and path helpers.
//!
//! Uses Figment to merge built-in defaults + `config.toml` + `config.<env>.toml`
//! + `APP_*` env vars (`__` separates nested keys, e.g.
//! `APP_RETRIEVAL__VECTOR_WEIGHT=0.8`). `RUST_ENV` picks the env file and
//! defaults to `dev`. `expand_path` expands `~` and `${VAR}` in path settings.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::types::{validate_top_k, DistanceMetric, DEFAULT_TOP_K};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub store: StoreSettings,
    pub lexical: LexicalSettings,
    pub embedding: EmbeddingSettings,
    pub generation: GenerationSettings,
    pub retrieval: RetrievalSettings,
    pub context: ContextSettings,
    pub stream: StreamSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
    /// Fire one throwaway generation at startup so the model is loaded.
    pub warmup: bool,
}

impl Default for ServerSettings {
    fn default() -> Self { Self { bind: "0.0.0.0:8000".to_string(), warmup: true } }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Lance,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub backend: StoreBackend,
    pub uri: String,
    pub table: String,
    pub metric: DistanceMetric,
    /// IVF partitions probed per query once an ANN index exists.
    pub nprobes: usize,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Lance,
            uri: "data/lancedb".to_string(),
            table: "textbook_chunks".to_string(),
            metric: DistanceMetric::Cosine,
            nprobes: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LexicalSettings {
    pub enabled: bool,
    /// On-disk Tantivy directory; kept in RAM when unset.
    pub index_dir: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    #[default]
    Ollama,
    Hashing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingProvider,
    pub url: String,
    pub model: String,
    pub dim: usize,
    pub timeout_secs: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Ollama,
            url: "http://localhost:11434".to_string(),
            model: "all-minilm".to_string(),
            dim: 384,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub url: String,
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub num_ctx: u32,
    /// Upper bound on a whole answer stream.
    pub timeout_secs: u64,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            url: "http://localhost:11434".to_string(),
            model: "qwen2.5:3b".to_string(),
            temperature: 0.2,
            top_p: 0.9,
            num_ctx: 8192,
            timeout_secs: 180,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub default_top_k: usize,
    /// Nearest-neighbour fetch is `top_k * candidate_multiplier`.
    pub candidate_multiplier: usize,
    pub vector_weight: f32,
    pub lexical_weight: f32,
    pub retry_backoff_ms: u64,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            default_top_k: DEFAULT_TOP_K,
            candidate_multiplier: 4,
            vector_weight: 0.7,
            lexical_weight: 0.3,
            retry_backoff_ms: 250,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextSettings {
    pub max_chars: usize,
}

impl Default for ContextSettings {
    fn default() -> Self { Self { max_chars: 12_000 } }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    pub heartbeat_secs: u64,
}

impl Default for StreamSettings {
    fn default() -> Self { Self { heartbeat_secs: 15 } }
}

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file("config.toml"))
            .merge(Toml::file(format!("config.{env_name}.toml")))
            .merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.settings()?;
        Ok(config)
    }

    /// Typed view of the whole configuration, validated.
    pub fn settings(&self) -> Result<Settings> {
        let settings: Settings = self.figment.extract().map_err(|e| Error::InvalidConfig(e.to_string()))?;
        validate(&settings)?;
        Ok(settings)
    }
}

fn validate(s: &Settings) -> Result<()> {
    let invalid = |msg: String| Err(Error::InvalidConfig(msg));
    if s.embedding.dim == 0 {
        return invalid("embedding.dim must be positive".into());
    }
    let r = &s.retrieval;
    if r.vector_weight < 0.0 || r.lexical_weight < 0.0 || r.vector_weight + r.lexical_weight <= 0.0 {
        return invalid(format!(
            "retrieval weights must be non-negative and not both zero (vector={}, lexical={})",
            r.vector_weight, r.lexical_weight
        ));
    }
    if r.candidate_multiplier == 0 {
        return invalid("retrieval.candidate_multiplier must be at least 1".into());
    }
    validate_top_k(r.default_top_k).map_err(|e| Error::InvalidConfig(e.to_string()))?;
    if s.context.max_chars == 0 {
        return invalid("context.max_chars must be positive".into());
    }
    if s.stream.heartbeat_secs == 0 || s.generation.timeout_secs == 0 {
        return invalid("stream.heartbeat_secs and generation.timeout_secs must be positive".into());
    }
    Ok(())
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
