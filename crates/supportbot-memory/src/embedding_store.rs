//! Build-or-load lifecycle of the persisted embedding index.
//!
//! A store is created without touching disk or network. The first call to
//! [`EmbeddingStore::build_or_load`] either loads an existing index from
//! `<persist_dir>/index.db` or embeds the corpus file and persists the
//! result. Queries are served from an in-memory snapshot afterwards.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use supportbot_llm::LlmError;
use supportbot_llm::provider::EmbedFuture;
use tokio::sync::Mutex;

use crate::document::{DocumentLoader, SplitterConfig, TextLoader, TextSplitter};
use crate::error::StoreError;
use crate::index::{Distance, IndexEntry, IndexManifest, ScoredChunk, VectorIndex};
use crate::sqlite::{INDEX_FILE, IndexDb};

pub type EmbedFn = Box<dyn Fn(&str) -> EmbedFuture + Send + Sync>;

/// What to do when a persisted index was built from a different corpus.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StalenessPolicy {
    Ignore,
    #[default]
    Warn,
    Rebuild,
}

impl FromStr for StalenessPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ignore" => Ok(Self::Ignore),
            "warn" => Ok(Self::Warn),
            "rebuild" => Ok(Self::Rebuild),
            other => Err(format!("unknown staleness policy: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub persist_dir: PathBuf,
    pub overwrite: bool,
    pub distance: Distance,
    pub staleness: StalenessPolicy,
    pub splitter: SplitterConfig,
    /// Recorded in the manifest; a persisted index built with another model
    /// is handled like a stale corpus.
    pub embedding_model: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            persist_dir: PathBuf::from("Beem"),
            overwrite: false,
            distance: Distance::default(),
            staleness: StalenessPolicy::default(),
            splitter: SplitterConfig::default(),
            embedding_model: "all-minilm".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    /// A persisted index was loaded as-is.
    Loaded { chunks: usize },
    /// The corpus was embedded and persisted.
    Built { chunks: usize },
    /// Nothing persisted and document loading was not requested.
    Uninitialized,
}

pub struct EmbeddingStore {
    embed: EmbedFn,
    config: StoreConfig,
    index: RwLock<Option<Arc<VectorIndex>>>,
    build_lock: Mutex<()>,
}

impl std::fmt::Debug for EmbeddingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingStore")
            .field("config", &self.config)
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}

impl EmbeddingStore {
    #[must_use]
    pub fn new(embed: EmbedFn, config: StoreConfig) -> Self {
        Self {
            embed,
            config,
            index: RwLock::new(None),
            build_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.config.persist_dir.join(INDEX_FILE)
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.snapshot().is_some()
    }

    #[must_use]
    pub fn manifest(&self) -> Option<IndexManifest> {
        self.snapshot().map(|idx| idx.manifest().clone())
    }

    fn snapshot(&self) -> Option<Arc<VectorIndex>> {
        self.index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn publish(&self, index: VectorIndex) {
        *self.index.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(index));
    }

    /// Load the persisted index, or build it from `filepath`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidInput`] when documents must be loaded but no
    /// path is given, [`StoreError::NotFound`] when the corpus file is missing,
    /// and embedding or database errors from the build.
    pub async fn build_or_load(
        &self,
        load_documents: bool,
        filepath: Option<&Path>,
    ) -> Result<BuildOutcome, StoreError> {
        let _guard = self.build_lock.lock().await;
        let db_path = self.db_path();

        if !self.config.overwrite && tokio::fs::try_exists(&db_path).await.unwrap_or(false) {
            let db = IndexDb::open(&db_path).await?;
            if let Some(manifest) = db.load_manifest().await?
                && !self.needs_rebuild(&manifest, load_documents, filepath).await
            {
                let entries = db.load_entries().await?;
                db.close().await;
                if manifest.distance != self.config.distance {
                    tracing::debug!(
                        "persisted index uses {} distance, configured {}; keeping persisted",
                        manifest.distance,
                        self.config.distance
                    );
                }
                let index = VectorIndex::new(manifest, entries)?;
                let chunks = index.len();
                self.publish(index);
                tracing::info!("loaded {chunks} chunks from {}", db_path.display());
                return Ok(BuildOutcome::Loaded { chunks });
            }
            db.close().await;
        }

        if !load_documents {
            tracing::info!(
                "no persisted index at {} and document loading disabled",
                db_path.display()
            );
            return Ok(BuildOutcome::Uninitialized);
        }

        let Some(path) = filepath else {
            return Err(StoreError::InvalidInput(
                "document loading requested without a corpus file path".into(),
            ));
        };

        let chunks = self.build(path).await?;
        Ok(BuildOutcome::Built { chunks })
    }

    async fn needs_rebuild(
        &self,
        manifest: &IndexManifest,
        load_documents: bool,
        filepath: Option<&Path>,
    ) -> bool {
        let can_rebuild = self.config.staleness == StalenessPolicy::Rebuild
            && load_documents
            && filepath.is_some();

        if manifest.embedding_model != self.config.embedding_model {
            if can_rebuild {
                tracing::info!(
                    "index was embedded with {}, configured {}; rebuilding",
                    manifest.embedding_model,
                    self.config.embedding_model
                );
                return true;
            }
            tracing::warn!(
                "index was embedded with {}, configured {}; queries may fail until the index is rebuilt",
                manifest.embedding_model,
                self.config.embedding_model
            );
        }

        if self.config.staleness == StalenessPolicy::Ignore {
            return false;
        }
        let Some(path) = filepath else {
            return false;
        };
        let current = match corpus_hash(path).await {
            Ok(hash) => hash,
            Err(e) => {
                tracing::debug!("cannot hash corpus {}: {e}", path.display());
                return false;
            }
        };
        if current == manifest.corpus_hash {
            return false;
        }

        match self.config.staleness {
            StalenessPolicy::Rebuild if load_documents => {
                tracing::info!(
                    "corpus {} changed since the index was built, rebuilding",
                    path.display()
                );
                true
            }
            _ => {
                tracing::warn!(
                    "corpus {} changed since the index was built at {}; serving the persisted index",
                    path.display(),
                    manifest.built_at
                );
                false
            }
        }
    }

    async fn build(&self, path: &Path) -> Result<usize, StoreError> {
        let documents = TextLoader::default().load(path).await?;
        let hash = corpus_hash(path).await?;
        let splitter = TextSplitter::new(self.config.splitter.clone());

        let mut entries = Vec::new();
        let mut dimensions: Option<usize> = None;
        for document in &documents {
            for chunk in splitter.split(document) {
                let vector = (self.embed)(&chunk.content).await?;
                if vector.is_empty() {
                    return Err(StoreError::Embedding(LlmError::EmptyResponse {
                        provider: self.config.embedding_model.clone(),
                    }));
                }
                match dimensions {
                    None => dimensions = Some(vector.len()),
                    Some(expected) if expected != vector.len() => {
                        return Err(StoreError::DimensionMismatch {
                            expected,
                            actual: vector.len(),
                        });
                    }
                    Some(_) => {}
                }
                entries.push(IndexEntry {
                    id: chunk_id(&chunk.metadata.source, chunk.chunk_index),
                    content: chunk.content,
                    source: chunk.metadata.source,
                    chunk_index: chunk.chunk_index,
                    vector,
                });
            }
        }

        if entries.is_empty() {
            tracing::warn!("corpus {} produced no chunks", path.display());
        }

        let manifest = IndexManifest {
            embedding_model: self.config.embedding_model.clone(),
            dimensions: dimensions.unwrap_or(0),
            distance: self.config.distance,
            corpus_hash: hash,
            chunk_count: entries.len(),
            built_at: chrono::Utc::now().to_rfc3339(),
        };

        tokio::fs::create_dir_all(&self.config.persist_dir).await?;
        let db = IndexDb::open(&self.db_path()).await?;
        let persisted = db.replace(&manifest, &entries).await;
        db.close().await;
        persisted?;

        let chunks = entries.len();
        self.publish(VectorIndex::new(manifest, entries)?);
        tracing::info!(
            "built index with {chunks} chunks from {} into {}",
            path.display(),
            self.db_path().display()
        );
        Ok(chunks)
    }

    /// Nearest `k` chunks to `question`, closest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Uninitialized`] before a successful build or load,
    /// embedding errors, and [`StoreError::DimensionMismatch`].
    pub async fn query(&self, question: &str, k: usize) -> Result<Vec<ScoredChunk>, StoreError> {
        let index = self.snapshot().ok_or(StoreError::Uninitialized)?;
        if k == 0 {
            return Ok(Vec::new());
        }
        let vector = (self.embed)(question).await?;
        index.search(&vector, k)
    }
}

async fn corpus_hash(path: &Path) -> Result<String, StoreError> {
    let bytes = tokio::fs::read(path).await?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

fn chunk_id(source: &str, chunk_index: usize) -> String {
    uuid::Uuid::new_v5(
        &uuid::Uuid::NAMESPACE_OID,
        format!("{source}:{chunk_index}").as_bytes(),
    )
    .to_string()
}
