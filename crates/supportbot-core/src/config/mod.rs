mod env;
mod types;


pub use types::*;

use std::path::Path;

use anyhow::Context;
use supportbot_memory::StoreConfig;

use crate::prompt::PromptTemplate;
use crate::vault::{EMBEDDING_API_KEY, LLM_API_KEY, Secret, VaultProvider};

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to built-in defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or
    /// if the resulting prompt template is invalid.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            tracing::debug!("config file {} not found, using defaults", path.display());
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns an error if the prompt template lacks a placeholder.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.prompt_template().map(|_| ())
    }

    /// # Errors
    ///
    /// Returns an error if the configured template lacks a placeholder.
    pub fn prompt_template(&self) -> anyhow::Result<PromptTemplate> {
        PromptTemplate::new(self.pipeline.template.clone()).context("invalid [pipeline] template")
    }

    /// Resolve API keys through the vault.
    ///
    /// # Errors
    ///
    /// Returns an error if the vault backend fails.
    pub async fn resolve_secrets(&mut self, vault: &dyn VaultProvider) -> anyhow::Result<()> {
        if let Some(val) = vault.get_secret(LLM_API_KEY).await? {
            self.secrets.llm_api_key = Some(Secret::new(val));
        }
        if let Some(val) = vault.get_secret(EMBEDDING_API_KEY).await? {
            self.secrets.embedding_api_key = Some(Secret::new(val));
        }
        Ok(())
    }

    #[must_use]
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            persist_dir: self.store.persist_dir.clone(),
            overwrite: self.store.overwrite,
            distance: self.store.distance,
            staleness: self.store.staleness,
            splitter: self.store.splitter.clone(),
            embedding_model: self.embedding.model.clone(),
        }
    }
}
