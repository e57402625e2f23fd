pub mod registry;
pub mod store;
pub mod types;

pub use registry::{DocumentUpload, IndexLifecycle, SessionHandle, SessionRegistry};
pub use store::{ConversationStore, InMemoryConversationStore, JsonConversationStore};
pub use types::{ConversationMemory, ImageRef, Role, Session, SessionId, SessionSnapshot, Turn};
