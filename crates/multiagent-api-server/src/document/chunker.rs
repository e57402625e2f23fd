use anyhow::Result;
use serde::{Deserialize, Serialize};

/// A retrieval unit: a fixed-size slice of a source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub content: String,
    /// Originating file name, cited in document answers
    pub source: String,
}

/// Character-based sliding window (sizes count chars, not bytes).
pub struct TextChunker {
    chunk_size: usize,
    overlap: usize,
}

impl TextChunker {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            anyhow::bail!("chunk_size must be greater than zero");
        }
        if overlap >= chunk_size {
            anyhow::bail!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                overlap,
                chunk_size
            );
        }
        Ok(Self { chunk_size, overlap })
    }

    pub fn chunk(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        let total_len = chars.len();
        let step = self.chunk_size - self.overlap;

        let mut chunks = Vec::new();
        let mut start = 0;

        while start < total_len {
            let end = (start + self.chunk_size).min(total_len);
            chunks.push(chars[start..end].iter().collect());

            if end == total_len {
                break;
            }
            start += step;
        }

        chunks
    }

    /// Chunks `text` and tags every non-blank chunk with `source`.
    pub fn passages(&self, text: &str, source: &str) -> Vec<Passage> {
        self.chunk(text)
            .into_iter()
            .filter(|c| !c.trim().is_empty())
            .map(|content| Passage {
                content,
                source: source.to_string(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_and_overlap() {
        let chunker = TextChunker::new(500, 50).unwrap();
        let text: String = (0..1200).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let chunks = chunker.chunk(&text);

        let sizes: Vec<usize> = chunks.iter().map(|c| c.chars().count()).collect();
        assert_eq!(sizes, vec![500, 500, 300]);
        // windows start every 450 chars, so each one repeats the previous tail
        assert_eq!(&chunks[0][450..], &chunks[1][..50]);
        assert_eq!(&chunks[1][450..], &chunks[2][..50]);
        assert!(text.ends_with(chunks[2].as_str()));
    }

    #[test]
    fn test_multibyte_text_is_split_on_chars() {
        let chunker = TextChunker::new(4, 1).unwrap();
        let chunks = chunker.chunk("perché è così");
        assert_eq!(chunks[0], "perc");
        assert_eq!(chunks[1], "ché ");
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(TextChunker::new(0, 0).is_err());
        assert!(TextChunker::new(50, 50).is_err());
    }

    #[test]
    fn test_passages_skip_blank_chunks_and_tag_source() {
        let chunker = TextChunker::new(5, 0).unwrap();
        let passages = chunker.passages("hello     world", "note.txt");
        assert_eq!(passages.len(), 2);
        assert!(passages.iter().all(|p| p.source == "note.txt"));
        assert!(chunker.passages("", "empty.txt").is_empty());
    }
}
