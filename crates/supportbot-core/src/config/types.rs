use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;
use supportbot_memory::document::SplitterConfig;
use supportbot_memory::{Distance, StalenessPolicy};
use supportbot_tools::ScrapeConfig;

use crate::prompt::DEFAULT_TEMPLATE;
use crate::vault::Secret;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub store: StoreSettings,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub scrape: ScrapeConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    #[serde(skip)]
    pub secrets: ResolvedSecrets,
}

/// Model backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Ollama,
    /// Any OpenAI-compatible chat/embeddings endpoint (Groq included).
    OpenAi,
}

impl ProviderKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::OpenAi => "openai",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAi),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}

fn default_llm_provider() -> ProviderKind {
    ProviderKind::OpenAi
}

fn default_llm_base_url() -> String {
    "https://api.groq.com/openai/v1".into()
}

fn default_llm_model() -> String {
    "llama3-8b-8192".into()
}

fn default_max_tokens() -> u32 {
    1024
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: ProviderKind,
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_embedding_provider() -> ProviderKind {
    ProviderKind::Ollama
}

fn default_embedding_base_url() -> String {
    "http://localhost:11434".into()
}

fn default_embedding_model() -> String {
    "all-minilm".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: ProviderKind,
    #[serde(default = "default_embedding_base_url")]
    pub base_url: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            base_url: default_embedding_base_url(),
            model: default_embedding_model(),
        }
    }
}

fn default_persist_dir() -> PathBuf {
    PathBuf::from("Beem")
}

fn default_corpus_path() -> PathBuf {
    PathBuf::from("beem.txt")
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreSettings {
    #[serde(default = "default_persist_dir")]
    pub persist_dir: PathBuf,
    #[serde(default)]
    pub overwrite: bool,
    /// Only used when building a new index; a persisted index keeps its own.
    #[serde(default)]
    pub distance: Distance,
    #[serde(default)]
    pub staleness: StalenessPolicy,
    #[serde(default = "default_corpus_path")]
    pub corpus_path: PathBuf,
    #[serde(default)]
    pub splitter: SplitterConfig,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            persist_dir: default_persist_dir(),
            overwrite: false,
            distance: Distance::default(),
            staleness: StalenessPolicy::default(),
            corpus_path: default_corpus_path(),
            splitter: SplitterConfig::default(),
        }
    }
}

fn default_top_k() -> usize {
    crate::pipeline::DEFAULT_TOP_K
}

fn default_template() -> String {
    DEFAULT_TEMPLATE.to_owned()
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_template")]
    pub template: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            template: default_template(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    8000
}

fn default_home_page() -> PathBuf {
    PathBuf::from("index.html")
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("static")
}

fn default_max_body_size() -> usize {
    64 * 1024
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_home_page")]
    pub home_page: PathBuf,
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            home_page: default_home_page(),
            static_dir: default_static_dir(),
            max_body_size: default_max_body_size(),
        }
    }
}

fn default_llm_request_secs() -> u64 {
    60
}

fn default_connect_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_llm_request_secs")]
    pub llm_request_secs: u64,
    #[serde(default = "default_connect_secs")]
    pub connect_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            llm_request_secs: default_llm_request_secs(),
            connect_secs: default_connect_secs(),
        }
    }
}

fn default_otlp_endpoint() -> String {
    "http://localhost:4317".into()
}

/// Span export. Only honored when the binary is built with the `otel` feature.
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// `""` (fmt logging only) or `"otlp"`.
    #[serde(default)]
    pub exporter: String,
    #[serde(default = "default_otlp_endpoint")]
    pub endpoint: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            exporter: String::new(),
            endpoint: default_otlp_endpoint(),
        }
    }
}

/// Secrets resolved at runtime from the vault. Never read from TOML.
#[derive(Debug, Default, Clone)]
pub struct ResolvedSecrets {
    pub llm_api_key: Option<Secret>,
    pub embedding_api_key: Option<Secret>,
}
