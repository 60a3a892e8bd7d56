//! Configuration, secrets, the retrieval-answer pipeline, and the chat service.

pub mod bootstrap;
pub mod config;
pub mod pipeline;
pub mod prompt;
pub mod service;
pub mod vault;

pub use config::Config;
pub use pipeline::{AnswerPipeline, PipelineError};
pub use prompt::PromptTemplate;
pub use service::{ChatService, InitState, ServiceError};
