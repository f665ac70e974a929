pub mod cache_store;
pub mod catalog;
pub mod export;
pub mod generator;
pub mod llm_service;
pub mod validator;

pub use cache_store::{CacheStats, CacheStore, KeyPattern};
pub use catalog::Catalog;
pub use generator::{LlmQuestionGenerator, QuestionGenerator, SubjectChain};
pub use llm_service::LlmService;
pub use validator::{LlmQuestionValidator, QuestionValidator};
