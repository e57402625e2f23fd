use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct Settings {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub vision: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub rag: RagConfig,
    pub storage: StorageConfig,
    pub upload: UploadConfig,
    pub prompts: PromptsConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_seconds: u64,
    /// Sessions idle longer than this are evicted from RAM (durable state stays)
    pub session_idle_minutes: u64,
    pub cleanup_interval_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            request_timeout_seconds: 30,
            session_idle_minutes: 120,
            cleanup_interval_seconds: 300,
        }
    }
}

/// Shared by the text LLM and the vision model (both OpenAI-compatible)
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_seconds: u64,
    pub max_tokens: usize,
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            model: "gemini-2.5-flash".to_string(),
            api_key: None,
            timeout_seconds: 60,
            max_tokens: 1024,
            temperature: 0.2,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub model: String,
    /// 0 disables the dimension check
    pub dimension: usize,
    pub timeout_seconds: u64,
    /// Max inputs per `/v1/embeddings` request
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8081".to_string(),
            model: "text-embedding-004".to_string(),
            dimension: 0,
            timeout_seconds: 60,
            batch_size: 64,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct RagConfig {
    pub retrieval_top_k: usize,
    pub fetch_k: usize,
    pub mmr_lambda: f32,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub unknown_sentinel: String,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            retrieval_top_k: 6,
            fetch_k: 20,
            mmr_lambda: 0.5,
            chunk_size: 500,
            chunk_overlap: 50,
            unknown_sentinel: "Non lo so".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    /// false keeps conversations and indexes in RAM only
    pub persist: bool,
    pub memory_dir: String,
    pub index_dir: String,
    pub log_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            persist: true,
            memory_dir: "data/memorie_utenti".to_string(),
            index_dir: "data/vectorstore".to_string(),
            log_dir: "logs".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct UploadConfig {
    pub max_file_size_bytes: usize,
    pub image_extensions: Vec<String>,
    pub document_extensions: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size_bytes: 20 * 1024 * 1024,
            image_extensions: ["png", "jpg", "jpeg", "bmp", "webp"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            document_extensions: ["pdf", "txt", "docx", "csv"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct PromptsConfig {
    pub condense_system_prompt: String,
    pub answer_system_prompt: String,
    /// Placeholders: {has_images}, {has_documents}, {message}
    pub router_prompt_template: String,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            condense_system_prompt:
                "Sei un assistente tecnico. Se utile, riformula la domanda usando la cronologia. \
                 Rispondi solo con la domanda riformulata."
                    .to_string(),
            answer_system_prompt: "Sei un assistente tecnico. Rispondi in modo mirato SOLO alla domanda usando il contesto fornito.\n\
                 - Se l'informazione NON è nel contesto, rispondi esattamente Non lo so, senza altro testo.\n\
                 - Cita le fonti rilevanti con il loro 'source' (es. nome file) in fondo alla risposta.\n"
                .to_string(),
            router_prompt_template: DEFAULT_ROUTER_PROMPT.to_string(),
        }
    }
}

const DEFAULT_ROUTER_PROMPT: &str = r#"Sei un router che decide quale agente deve rispondere:
- Se la domanda riguarda un'immagine caricata (descriverla, analizzarla, capire cosa contiene) → "vision"
- Se riguarda un documento caricato (contenuti di PDF, CSV, ecc.) → "document"
- Se è una domanda generale, senza legame con immagini o documenti → "general"

Rispondi SOLO con una delle tre parole: vision, document, general.

Contesto sessione:
- Immagini caricate: {has_images}
- Documenti caricati: {has_documents}

Messaggio utente: "{message}""#;

impl Settings {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config::builder()
            .add_source(File::with_name("config/settings").required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("upload.image_extensions")
                    .with_list_parse_key("upload.document_extensions"),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        Ok(settings)
    }

    pub fn memory_dir(&self) -> PathBuf {
        PathBuf::from(&self.storage.memory_dir)
    }

    pub fn index_dir(&self) -> PathBuf {
        PathBuf::from(&self.storage.index_dir)
    }
}
