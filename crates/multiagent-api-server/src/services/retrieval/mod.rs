pub mod index;
pub mod pipeline;
pub mod store;

pub use index::{DocumentIndex, ScoredPassage};
pub use pipeline::{
    is_unknown_answer, RetrievalAnswer, RetrievalConfig, RetrievalOutcome, RetrievalPipeline,
};
pub use store::{FsIndexStore, InMemoryIndexStore, IndexStore};
