use thiserror::Error;

/// Failures that escape the agent core. Everything else (ambiguous routing,
/// insufficient or failed retrieval) is absorbed before reaching the caller.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("external capability failed: {0}")]
    ExternalCapability(String),

    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("unsupported input: {0}")]
    UnsupportedInput(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AgentError {
    pub fn capability(err: anyhow::Error) -> Self {
        AgentError::ExternalCapability(format!("{:#}", err))
    }

    pub fn storage(err: anyhow::Error) -> Self {
        AgentError::Storage(format!("{:#}", err))
    }
}
