use std::sync::Arc;

use supportbot_llm::provider::{LlmProvider, Message};
use supportbot_memory::{EmbeddingStore, ScoredChunk};

use super::PipelineError;
use super::step::Step;
use crate::prompt::PromptTemplate;

/// Label some models prefix their answer with.
pub const ANSWER_LABEL: &str = "Chatbot Response:";

#[derive(Debug, Clone)]
pub struct Query {
    pub question: String,
    pub k: usize,
}

#[derive(Debug, Clone)]
pub struct Retrieved {
    pub question: String,
    pub chunks: Vec<ScoredChunk>,
}

pub struct RetrieveStep {
    store: Arc<EmbeddingStore>,
}

impl RetrieveStep {
    #[must_use]
    pub fn new(store: Arc<EmbeddingStore>) -> Self {
        Self { store }
    }
}

impl Step for RetrieveStep {
    type Input = Query;
    type Output = Retrieved;

    async fn run(&self, input: Self::Input) -> Result<Self::Output, PipelineError> {
        let chunks = self.store.query(&input.question, input.k).await?;
        tracing::debug!(k = input.k, retrieved = chunks.len(), "retrieved context");
        Ok(Retrieved {
            question: input.question,
            chunks,
        })
    }
}

pub struct PromptStep {
    template: PromptTemplate,
}

impl PromptStep {
    #[must_use]
    pub fn new(template: PromptTemplate) -> Self {
        Self { template }
    }
}

impl Step for PromptStep {
    type Input = Retrieved;
    type Output = String;

    async fn run(&self, input: Self::Input) -> Result<Self::Output, PipelineError> {
        let context = input
            .chunks
            .iter()
            .map(|c| c.content.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        Ok(self.template.render(&context, &input.question))
    }
}

/// Sends the prompt as a single user message.
pub struct LlmStep<P> {
    provider: Arc<P>,
}

impl<P> LlmStep<P> {
    #[must_use]
    pub fn new(provider: Arc<P>) -> Self {
        Self { provider }
    }
}

impl<P: LlmProvider> Step for LlmStep<P> {
    type Input = String;
    type Output = String;

    async fn run(&self, input: Self::Input) -> Result<Self::Output, PipelineError> {
        let messages = [Message::user(input)];
        Ok(self.provider.chat(&messages).await?)
    }
}

pub struct CleanAnswerStep;

impl Step for CleanAnswerStep {
    type Input = String;
    type Output = String;

    async fn run(&self, input: Self::Input) -> Result<Self::Output, PipelineError> {
        Ok(clean_answer(&input))
    }
}

#[must_use]
pub fn clean_answer(raw: &str) -> String {
    raw.replace(ANSWER_LABEL, "").trim().to_owned()
}
