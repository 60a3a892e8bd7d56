use std::path::PathBuf;
use std::str::FromStr;

use super::{Config, ProviderKind};

fn parse_env<T: FromStr>(key: &str) -> Option<T> {
    let v = std::env::var(key).ok()?;
    if let Ok(parsed) = v.parse::<T>() {
        Some(parsed)
    } else {
        tracing::warn!("ignoring invalid {key} value: {v}");
        None
    }
}

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Some(kind) = parse_env::<ProviderKind>("SUPPORTBOT_LLM_PROVIDER") {
            self.llm.provider = kind;
        }
        if let Ok(v) = std::env::var("SUPPORTBOT_LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Ok(v) = std::env::var("SUPPORTBOT_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Some(kind) = parse_env::<ProviderKind>("SUPPORTBOT_EMBEDDING_PROVIDER") {
            self.embedding.provider = kind;
        }
        if let Ok(v) = std::env::var("SUPPORTBOT_EMBEDDING_BASE_URL") {
            self.embedding.base_url = v;
        }
        if let Ok(v) = std::env::var("SUPPORTBOT_EMBEDDING_MODEL") {
            self.embedding.model = v;
        }
        if let Ok(v) = std::env::var("SUPPORTBOT_STORE_DIR") {
            self.store.persist_dir = PathBuf::from(v);
        }
        if let Some(overwrite) = parse_env::<bool>("SUPPORTBOT_STORE_OVERWRITE") {
            self.store.overwrite = overwrite;
        }
        if let Ok(v) = std::env::var("SUPPORTBOT_CORPUS_PATH") {
            self.store.corpus_path = PathBuf::from(v);
        }
        if let Some(k) = parse_env::<usize>("SUPPORTBOT_TOP_K") {
            self.pipeline.top_k = k;
        }
        if let Ok(v) = std::env::var("SUPPORTBOT_GATEWAY_BIND") {
            self.gateway.bind = v;
        }
        if let Some(port) = parse_env::<u16>("SUPPORTBOT_GATEWAY_PORT") {
            self.gateway.port = port;
        }
    }
}
