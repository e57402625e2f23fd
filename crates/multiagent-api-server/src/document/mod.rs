pub mod chunker;
pub mod parser;

pub use chunker::{Passage, TextChunker};
pub use parser::{DocumentParser, ParsedDocument};
