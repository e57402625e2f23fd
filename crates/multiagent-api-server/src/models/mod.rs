pub mod chat;
pub mod session;
pub mod upload;

pub use chat::{ChatRequest, ChatResponse};
pub use session::{InitSessionResponse, ResetRequest, ResetResponse};
pub use upload::{UploadKind, UploadResponse};
