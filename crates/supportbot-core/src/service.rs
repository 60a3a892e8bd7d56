//! Chat service: owns the embedding store and answer pipeline, tracks index
//! initialization, and answers questions once the index is ready.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use supportbot_memory::{BuildOutcome, EmbeddingStore, StoreError};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::pipeline::{AnswerPipeline, PipelineError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitState {
    Pending,
    Ready,
    /// Initialization finished without an index (no persisted index, no corpus).
    Uninitialized,
    Failed(String),
}

impl InitState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Ready => "ready",
            Self::Uninitialized => "uninitialized",
            Self::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("chatbot is not ready yet, the index is still loading")]
    NotReady,

    #[error("chatbot initialization failed: {0}")]
    InitFailed(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("internal error: {0}")]
    Internal(String),
}

pub struct ChatService {
    store: Arc<EmbeddingStore>,
    pipeline: Arc<AnswerPipeline>,
    state_tx: watch::Sender<InitState>,
    started_at: Instant,
}

impl std::fmt::Debug for ChatService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatService")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl ChatService {
    /// Cheap and synchronous; the index is not touched until initialization.
    #[must_use]
    pub fn new(store: Arc<EmbeddingStore>, pipeline: AnswerPipeline) -> Self {
        let (state_tx, _) = watch::channel(InitState::Pending);
        Self {
            store,
            pipeline: Arc::new(pipeline),
            state_tx,
            started_at: Instant::now(),
        }
    }

    #[must_use]
    pub fn state(&self) -> InitState {
        self.state_tx.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<InitState> {
        self.state_tx.subscribe()
    }

    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    #[must_use]
    pub fn store(&self) -> &Arc<EmbeddingStore> {
        &self.store
    }

    /// Build or load the index in a background task.
    ///
    /// A panic inside initialization is published as [`InitState::Failed`].
    pub fn start_background_init(self: &Arc<Self>, corpus: Option<PathBuf>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        let init = tokio::spawn(async move {
            this.initialize(corpus.as_deref()).await;
        });

        let this = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = init.await {
                tracing::error!("index initialization task failed: {e}");
                this.state_tx.send_replace(InitState::Failed(e.to_string()));
            }
        })
    }

    /// Build or load the index in the current task and publish the result.
    pub async fn initialize(&self, corpus: Option<&Path>) -> InitState {
        self.state_tx.send_replace(InitState::Pending);
        let state = match self.store.build_or_load(corpus.is_some(), corpus).await {
            Ok(BuildOutcome::Loaded { chunks }) => {
                tracing::info!("embeddings loaded successfully ({chunks} chunks)");
                InitState::Ready
            }
            Ok(BuildOutcome::Built { chunks }) => {
                tracing::info!("embeddings generated successfully ({chunks} chunks)");
                InitState::Ready
            }
            Ok(BuildOutcome::Uninitialized) => {
                tracing::warn!("no index available; chat requests will fail until one is built");
                InitState::Uninitialized
            }
            Err(e) => {
                tracing::error!("error loading embeddings: {e}");
                InitState::Failed(e.to_string())
            }
        };
        self.state_tx.send_replace(state.clone());
        state
    }

    /// Wait until initialization leaves `Pending`.
    pub async fn wait_ready(&self) -> InitState {
        let mut rx = self.state_tx.subscribe();
        match rx.wait_for(|s| *s != InitState::Pending).await {
            Ok(state) => state.clone(),
            Err(_) => self.state(),
        }
    }

    /// Answer a question with retrieved context.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotReady`] while initialization is running,
    /// [`ServiceError::InitFailed`] if it failed, and pipeline errors otherwise.
    pub async fn chat(&self, question: &str) -> Result<String, ServiceError> {
        match self.state() {
            InitState::Ready => {}
            InitState::Pending => return Err(ServiceError::NotReady),
            InitState::Failed(msg) => return Err(ServiceError::InitFailed(msg)),
            InitState::Uninitialized => {
                return Err(PipelineError::Store(StoreError::Uninitialized).into());
            }
        }

        let pipeline = Arc::clone(&self.pipeline);
        let question = question.to_owned();
        let answer = tokio::spawn(async move { pipeline.answer(&question).await })
            .await
            .map_err(|e| ServiceError::Internal(e.to_string()))??;
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use supportbot_llm::any::AnyProvider;
    use supportbot_llm::mock::MockProvider;
    use supportbot_llm::provider::EmbedFuture;
    use supportbot_memory::StoreConfig;

    use super::*;
    use crate::prompt::PromptTemplate;

    fn service(dir: &Path, mock: MockProvider) -> Arc<ChatService> {
        let provider = AnyProvider::Mock(mock);
        let store = Arc::new(EmbeddingStore::new(
            Box::new(provider.embed_fn()),
            StoreConfig {
                persist_dir: dir.join("Beem"),
                ..StoreConfig::default()
            },
        ));
        let pipeline = AnswerPipeline::new(
            Arc::clone(&store),
            Arc::new(provider),
            PromptTemplate::default(),
            2,
        );
        Arc::new(ChatService::new(store, pipeline))
    }

    fn corpus(dir: &Path) -> PathBuf {
        let path = dir.join("beem.txt");
        std::fs::write(&path, "Beem is the #1 smart wallet app.").unwrap();
        path
    }

    #[tokio::test]
    async fn chat_before_init_is_not_ready() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path(), MockProvider::default());
        assert_eq!(svc.state(), InitState::Pending);
        assert!(matches!(
            svc.chat("hi").await,
            Err(ServiceError::NotReady)
        ));
    }

    #[tokio::test]
    async fn background_init_then_chat() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(
            dir.path(),
            MockProvider::with_responses(vec!["Chatbot Response: Welcome to Beem!".into()]),
        );

        svc.start_background_init(Some(corpus(dir.path())))
            .await
            .unwrap();
        assert_eq!(svc.state(), InitState::Ready);
        assert_eq!(svc.chat("What is Beem?").await.unwrap(), "Welcome to Beem!");
    }

    #[tokio::test]
    async fn wait_ready_observes_completion() {
        let dir = tempfile::tempdir().unwrap();
        let mut mock = MockProvider::default();
        mock.delay_ms = 0;
        let svc = service(dir.path(), mock);

        let handle = svc.start_background_init(Some(corpus(dir.path())));
        assert_eq!(svc.wait_ready().await, InitState::Ready);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn panicking_init_is_reported_as_failed() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(EmbeddingStore::new(
            Box::new(|_: &str| -> EmbedFuture { panic!("embedder crashed") }),
            StoreConfig {
                persist_dir: dir.path().join("Beem"),
                ..StoreConfig::default()
            },
        ));
        let pipeline = AnswerPipeline::new(
            Arc::clone(&store),
            Arc::new(AnyProvider::Mock(MockProvider::default())),
            PromptTemplate::default(),
            2,
        );
        let svc = Arc::new(ChatService::new(store, pipeline));

        svc.start_background_init(Some(corpus(dir.path())))
            .await
            .unwrap();
        let state = svc.wait_ready().await;
        assert!(matches!(state, InitState::Failed(ref m) if m.contains("panicked")));
        assert!(matches!(
            svc.chat("hi").await,
            Err(ServiceError::InitFailed(_))
        ));
    }

    #[tokio::test]
    async fn missing_corpus_fails_init() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path(), MockProvider::default());

        let state = svc.initialize(Some(&dir.path().join("missing.txt"))).await;
        assert!(matches!(state, InitState::Failed(ref m) if m.contains("does not exist")));
        assert!(matches!(
            svc.chat("hi").await,
            Err(ServiceError::InitFailed(_))
        ));
    }

    #[tokio::test]
    async fn no_corpus_and_no_index_is_uninitialized() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path(), MockProvider::default());

        assert_eq!(svc.initialize(None).await, InitState::Uninitialized);
        let err = svc.chat("hi").await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Pipeline(PipelineError::Store(StoreError::Uninitialized))
        ));
    }

    #[tokio::test]
    async fn llm_failure_surfaces_as_pipeline_error() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path(), MockProvider::failing());
        svc.initialize(Some(&corpus(dir.path()))).await;

        let err = svc.chat("hi").await.unwrap_err();
        assert!(matches!(err, ServiceError::Pipeline(PipelineError::Llm(_))));
    }

    #[tokio::test]
    async fn concurrent_chats_do_not_block_each_other() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path(), MockProvider::default().with_delay(200));
        svc.initialize(Some(&corpus(dir.path()))).await;

        let started = Instant::now();
        let (a, b) = tokio::join!(svc.chat("one"), svc.chat("two"));
        assert_eq!(a.unwrap(), "mock response");
        assert_eq!(b.unwrap(), "mock response");
        assert!(started.elapsed() < Duration::from_millis(390));
    }

    #[test]
    fn state_names() {
        assert_eq!(InitState::Pending.as_str(), "pending");
        assert_eq!(InitState::Failed("x".into()).as_str(), "failed");
    }
}
