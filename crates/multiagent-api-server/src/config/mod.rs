pub mod settings;

pub use settings::{
    EmbeddingConfig, LlmConfig, PromptsConfig, RagConfig, ServerConfig, Settings, StorageConfig,
    UploadConfig,
};
