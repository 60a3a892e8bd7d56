//! Retrieval-answer pipeline: retrieve top-K chunks, fill the prompt template,
//! ask the model once, clean the answer.

pub mod builder;
pub mod step;
pub mod steps;

use std::sync::Arc;

pub use builder::Pipeline;
pub use step::Step;
use supportbot_llm::any::AnyProvider;
use supportbot_memory::{EmbeddingStore, StoreError};

use self::builder::{First, Then};
use self::steps::{CleanAnswerStep, LlmStep, PromptStep, Query, RetrieveStep};
use crate::prompt::PromptTemplate;

/// Number of chunks retrieved per question by default.
pub const DEFAULT_TOP_K: usize = 2;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Llm(#[from] supportbot_llm::LlmError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

type AnswerStages =
    Then<Then<Then<First<RetrieveStep>, PromptStep>, LlmStep<AnyProvider>>, CleanAnswerStep>;

pub struct AnswerPipeline {
    pipeline: Pipeline<AnswerStages>,
    top_k: usize,
}

impl std::fmt::Debug for AnswerPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnswerPipeline")
            .field("top_k", &self.top_k)
            .finish_non_exhaustive()
    }
}

impl AnswerPipeline {
    #[must_use]
    pub fn new(
        store: Arc<EmbeddingStore>,
        provider: Arc<AnyProvider>,
        template: PromptTemplate,
        top_k: usize,
    ) -> Self {
        let pipeline = Pipeline::start(RetrieveStep::new(store))
            .step(PromptStep::new(template))
            .step(LlmStep::new(provider))
            .step(CleanAnswerStep);
        Self { pipeline, top_k }
    }

    #[must_use]
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Answer `question` using the configured top-K.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Store`] when the store is uninitialized or
    /// retrieval fails, and [`PipelineError::Llm`] when the model call fails.
    pub async fn answer(&self, question: &str) -> Result<String, PipelineError> {
        self.answer_with_k(question, self.top_k).await
    }

    /// # Errors
    ///
    /// See [`AnswerPipeline::answer`].
    pub async fn answer_with_k(&self, question: &str, k: usize) -> Result<String, PipelineError> {
        self.pipeline
            .run(Query {
                question: question.to_owned(),
                k,
            })
            .await
    }
}
