pub mod agents;
pub mod embedding_service;
pub mod error;
pub mod llm_service;
pub mod providers;
pub mod retrieval;
pub mod session;
pub mod vision_service;

pub use embedding_service::EmbeddingService;
pub use error::AgentError;
pub use llm_service::LlmService;
pub use providers::{EmbeddingProvider, ImageInput, LlmProvider, VisionProvider};
pub use vision_service::VisionService;
