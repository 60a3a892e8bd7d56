//! Application bootstrap: config resolution, secret lookup, provider, store
//! and service construction.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use supportbot_llm::any::AnyProvider;
use supportbot_llm::http::client_with_timeouts;
use supportbot_llm::ollama::OllamaProvider;
use supportbot_llm::openai::OpenAiProvider;
use supportbot_llm::provider::LlmProvider;
use supportbot_memory::EmbeddingStore;

use crate::config::{Config, ProviderKind};
use crate::pipeline::AnswerPipeline;
use crate::service::ChatService;
use crate::vault::{EnvVaultProvider, LLM_API_KEY, VaultProvider};

pub struct AppBuilder {
    config: Config,
    config_path: PathBuf,
}

impl AppBuilder {
    /// Load config from `config_path` and resolve secrets from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be loaded or the vault fails.
    pub async fn load(config_path: PathBuf) -> anyhow::Result<Self> {
        Self::load_with_vault(config_path, &EnvVaultProvider).await
    }

    /// # Errors
    ///
    /// Returns an error if the config cannot be loaded or the vault fails.
    pub async fn load_with_vault(
        config_path: PathBuf,
        vault: &dyn VaultProvider,
    ) -> anyhow::Result<Self> {
        let mut config = Config::load(&config_path)?;
        config.resolve_secrets(vault).await?;
        Ok(Self {
            config,
            config_path,
        })
    }

    #[must_use]
    pub fn from_config(config: Config) -> Self {
        Self {
            config,
            config_path: PathBuf::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    #[must_use]
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Construct the chat service. Nothing is read from disk or the network.
    ///
    /// # Errors
    ///
    /// Returns an error if a provider is misconfigured (e.g. missing API key)
    /// or the prompt template is invalid.
    pub fn build_service(&self) -> anyhow::Result<Arc<ChatService>> {
        let llm = create_llm_provider(&self.config)?;
        let embedder = create_embedding_provider(&self.config);
        build_service(&self.config, llm, &embedder)
    }
}

/// Priority: `--config` > `SUPPORTBOT_CONFIG` > `config/default.toml`.
#[must_use]
pub fn resolve_config_path(cli: Option<&Path>) -> PathBuf {
    if let Some(path) = cli {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var("SUPPORTBOT_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from("config/default.toml")
}

fn timeouts(config: &Config) -> (Duration, Duration) {
    (
        Duration::from_secs(config.timeouts.connect_secs),
        Duration::from_secs(config.timeouts.llm_request_secs),
    )
}

/// Name shown in logs for an OpenAI-compatible endpoint.
fn endpoint_label(base_url: &str) -> &'static str {
    if base_url.contains("groq.com") {
        "groq"
    } else {
        "openai"
    }
}

/// Chat provider from `[llm]`.
///
/// # Errors
///
/// Returns an error when the `openai` provider is selected and no API key was
/// resolved.
pub fn create_llm_provider(config: &Config) -> anyhow::Result<AnyProvider> {
    let llm = &config.llm;
    let (connect, request) = timeouts(config);
    let provider = match llm.provider {
        ProviderKind::OpenAi => {
            let Some(key) = config.secrets.llm_api_key.as_ref() else {
                bail!("{LLM_API_KEY} not found; set it in the environment or .env");
            };
            AnyProvider::OpenAi(
                OpenAiProvider::new(
                    key.expose().to_owned(),
                    llm.base_url.clone(),
                    llm.model.clone(),
                    llm.max_tokens,
                    None,
                )
                .with_client(client_with_timeouts(connect, request))
                .with_name(endpoint_label(&llm.base_url)),
            )
        }
        ProviderKind::Ollama => AnyProvider::Ollama(OllamaProvider::new(
            &llm.base_url,
            llm.model.clone(),
            config.embedding.model.clone(),
        )),
    };
    tracing::info!(provider = provider.name(), model = %llm.model, "chat provider ready");
    Ok(provider)
}

/// Embedding provider from `[embedding]`. An OpenAI-compatible endpoint
/// without a key is called without an `Authorization` header.
#[must_use]
pub fn create_embedding_provider(config: &Config) -> AnyProvider {
    let emb = &config.embedding;
    let (connect, request) = timeouts(config);
    let provider = match emb.provider {
        ProviderKind::Ollama => AnyProvider::Ollama(OllamaProvider::new(
            &emb.base_url,
            emb.model.clone(),
            emb.model.clone(),
        )),
        ProviderKind::OpenAi => {
            let key = config
                .secrets
                .embedding_api_key
                .as_ref()
                .map(|s| s.expose().to_owned())
                .unwrap_or_default();
            AnyProvider::OpenAi(
                OpenAiProvider::new(
                    key,
                    emb.base_url.clone(),
                    emb.model.clone(),
                    0,
                    Some(emb.model.clone()),
                )
                .with_client(client_with_timeouts(connect, request))
                .with_name(endpoint_label(&emb.base_url)),
            )
        }
    };
    tracing::info!(provider = provider.name(), model = %emb.model, "embedding provider ready");
    provider
}

#[must_use]
pub fn build_store(config: &Config, embedder: &AnyProvider) -> Arc<EmbeddingStore> {
    Arc::new(EmbeddingStore::new(
        Box::new(embedder.embed_fn()),
        config.store_config(),
    ))
}

/// # Errors
///
/// Returns an error if the configured prompt template is invalid.
pub fn build_pipeline(
    config: &Config,
    store: Arc<EmbeddingStore>,
    llm: AnyProvider,
) -> anyhow::Result<AnswerPipeline> {
    Ok(AnswerPipeline::new(
        store,
        Arc::new(llm),
        config.prompt_template()?,
        config.pipeline.top_k,
    ))
}

/// # Errors
///
/// Returns an error if the configured prompt template is invalid.
pub fn build_service(
    config: &Config,
    llm: AnyProvider,
    embedder: &AnyProvider,
) -> anyhow::Result<Arc<ChatService>> {
    let store = build_store(config, embedder);
    let pipeline = build_pipeline(config, Arc::clone(&store), llm)?;
    Ok(Arc::new(ChatService::new(store, pipeline)))
}

#[cfg(test)]
mod tests {
    use serial_test::serial;
    use supportbot_llm::mock::MockProvider;

    use super::*;
    use crate::service::InitState;
    use crate::vault::{MockVaultProvider, Secret};

    #[test]
    #[serial]
    fn config_path_priority() {
        unsafe { std::env::remove_var("SUPPORTBOT_CONFIG") };
        assert_eq!(
            resolve_config_path(None),
            PathBuf::from("config/default.toml")
        );

        unsafe { std::env::set_var("SUPPORTBOT_CONFIG", "/etc/supportbot.toml") };
        assert_eq!(
            resolve_config_path(None),
            PathBuf::from("/etc/supportbot.toml")
        );
        assert_eq!(
            resolve_config_path(Some(Path::new("cli.toml"))),
            PathBuf::from("cli.toml")
        );
        unsafe { std::env::remove_var("SUPPORTBOT_CONFIG") };
    }

    #[test]
    fn openai_llm_requires_key() {
        let config = Config::default();
        let err = create_llm_provider(&config).unwrap_err();
        assert!(err.to_string().contains("SUPPORTBOT_LLM_API_KEY not found"));
    }

    #[test]
    fn openai_llm_with_key_is_labelled_groq() {
        let mut config = Config::default();
        config.secrets.llm_api_key = Some(Secret::new("gsk-test"));
        let provider = create_llm_provider(&config).unwrap();
        assert!(matches!(provider, AnyProvider::OpenAi(_)));
        assert_eq!(provider.name(), "groq");
    }

    #[test]
    fn ollama_llm_needs_no_key() {
        let mut config = Config::default();
        config.llm.provider = ProviderKind::Ollama;
        config.llm.base_url = "http://localhost:11434".into();
        let provider = create_llm_provider(&config).unwrap();
        assert_eq!(provider.name(), "ollama");
    }

    #[test]
    fn default_embedding_provider_is_ollama() {
        let provider = create_embedding_provider(&Config::default());
        assert!(matches!(provider, AnyProvider::Ollama(_)));
        assert!(provider.supports_embeddings());
    }

    #[test]
    fn openai_embedding_provider_supports_embeddings() {
        let mut config = Config::default();
        config.embedding.provider = ProviderKind::OpenAi;
        config.embedding.base_url = "https://api.openai.com/v1".into();
        config.embedding.model = "text-embedding-3-small".into();
        let provider = create_embedding_provider(&config);
        assert_eq!(provider.name(), "openai");
        assert!(provider.supports_embeddings());
    }

    #[tokio::test]
    #[serial]
    async fn app_builder_resolves_secrets_from_vault() {
        let dir = tempfile::tempdir().unwrap();
        let vault = MockVaultProvider::new().with_secret(LLM_API_KEY, "gsk-from-vault");
        let app = AppBuilder::load_with_vault(dir.path().join("missing.toml"), &vault)
            .await
            .unwrap();
        assert_eq!(
            app.config().secrets.llm_api_key.as_ref().unwrap().expose(),
            "gsk-from-vault"
        );
        assert!(app.build_service().is_ok());
    }

    #[tokio::test]
    async fn built_service_answers_after_init() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = dir.path().join("beem.txt");
        std::fs::write(&corpus, "Beem lets you file taxes for free.").unwrap();

        let mut config = Config::default();
        config.store.persist_dir = dir.path().join("Beem");
        let mock = AnyProvider::Mock(MockProvider::with_responses(vec![
            "Chatbot Response: Taxes are free with Beem.".into(),
        ]));

        let service = build_service(&config, mock.clone(), &mock).unwrap();
        assert_eq!(service.initialize(Some(&corpus)).await, InitState::Ready);
        assert_eq!(
            service.chat("Can I file taxes?").await.unwrap(),
            "Taxes are free with Beem."
        );
    }
}
