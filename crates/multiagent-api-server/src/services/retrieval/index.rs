use crate::document::Passage;
use crate::utils::similarity::{cosine_similarity, max_similarity};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct IndexEntry {
    id: String,
    passage: Passage,
    vector: Vec<f32>,
}

/// A passage picked by MMR, with its relevance to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPassage {
    pub passage: Passage,
    pub relevance: f32,
}

/// In-memory vector index over one session's document chunks.
/// Append-only: entries are never removed once indexed.
#[derive(Debug, Clone, Default)]
pub struct DocumentIndex {
    entries: Vec<IndexEntry>,
    dimension: Option<usize>,
}

/// On-disk layout: `vectors.json` holds ids in insertion order with their vectors,
/// `docstore.json` maps id -> passage.
#[derive(Debug, Serialize, Deserialize)]
pub struct PersistedVectors {
    pub dimension: usize,
    pub ids: Vec<String>,
    pub vectors: Vec<Vec<f32>>,
}

pub type PersistedDocstore = HashMap<String, Passage>;

impl DocumentIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn passages(&self) -> impl Iterator<Item = &Passage> {
        self.entries.iter().map(|e| &e.passage)
    }

    /// Appends passages with their embeddings. All-or-nothing: on error the index is untouched.
    pub fn add(&mut self, passages: Vec<Passage>, vectors: Vec<Vec<f32>>) -> Result<usize> {
        if passages.len() != vectors.len() {
            anyhow::bail!(
                "Got {} passages but {} vectors",
                passages.len(),
                vectors.len()
            );
        }

        let mut dimension = self.dimension;
        for vector in &vectors {
            match dimension {
                _ if vector.is_empty() => anyhow::bail!("Cannot index an empty vector"),
                Some(d) if d != vector.len() => {
                    anyhow::bail!("Vector dimension {} does not match index dimension {}", vector.len(), d)
                }
                _ => dimension = Some(vector.len()),
            }
        }

        let added = passages.len();
        self.dimension = dimension;
        self.entries.extend(
            passages
                .into_iter()
                .zip(vectors)
                .map(|(passage, vector)| IndexEntry {
                    id: uuid::Uuid::new_v4().to_string(),
                    passage,
                    vector,
                }),
        );

        Ok(added)
    }

    /// Maximal marginal relevance: take the `fetch_k` nearest entries, then greedily pick `k`
    /// maximising `lambda * sim(query, d) - (1 - lambda) * max sim(d, already picked)`.
    pub fn mmr_search(
        &self,
        query: &[f32],
        k: usize,
        fetch_k: usize,
        lambda: f32,
    ) -> Result<Vec<ScoredPassage>> {
        if k == 0 || self.entries.is_empty() {
            return Ok(Vec::new());
        }

        let mut candidates: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| Ok((i, cosine_similarity(query, &entry.vector)?)))
            .collect::<Result<_>>()?;
        candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        candidates.truncate(fetch_k.max(k));

        let mut selected: Vec<(usize, f32)> = Vec::with_capacity(k);
        while selected.len() < k && !candidates.is_empty() {
            let mut best: Option<(usize, f32)> = None;

            for (pos, (idx, relevance)) in candidates.iter().enumerate() {
                let redundancy = max_similarity(
                    &self.entries[*idx].vector,
                    selected.iter().map(|(s, _)| self.entries[*s].vector.as_slice()),
                )?;
                let score = lambda * relevance - (1.0 - lambda) * redundancy;
                if best.map_or(true, |(_, b)| score > b) {
                    best = Some((pos, score));
                }
            }

            match best {
                Some((pos, _)) => selected.push(candidates.remove(pos)),
                None => break,
            }
        }

        Ok(selected
            .into_iter()
            .map(|(idx, relevance)| ScoredPassage {
                passage: self.entries[idx].passage.clone(),
                relevance,
            })
            .collect())
    }

    pub fn to_persisted(&self) -> (PersistedVectors, PersistedDocstore) {
        let vectors = PersistedVectors {
            dimension: self.dimension.unwrap_or(0),
            ids: self.entries.iter().map(|e| e.id.clone()).collect(),
            vectors: self.entries.iter().map(|e| e.vector.clone()).collect(),
        };
        let docstore = self
            .entries
            .iter()
            .map(|e| (e.id.clone(), e.passage.clone()))
            .collect();
        (vectors, docstore)
    }

    pub fn from_persisted(vectors: PersistedVectors, mut docstore: PersistedDocstore) -> Result<Self> {
        if vectors.ids.len() != vectors.vectors.len() {
            anyhow::bail!("Corrupt index: {} ids for {} vectors", vectors.ids.len(), vectors.vectors.len());
        }

        let mut entries = Vec::with_capacity(vectors.ids.len());
        for (id, vector) in vectors.ids.into_iter().zip(vectors.vectors) {
            if vector.len() != vectors.dimension {
                anyhow::bail!("Corrupt index: vector {} has dimension {}", id, vector.len());
            }
            let passage = docstore
                .remove(&id)
                .ok_or_else(|| anyhow::anyhow!("Corrupt index: no passage for id {}", id))?;
            entries.push(IndexEntry { id, passage, vector });
        }

        Ok(Self {
            dimension: (!entries.is_empty()).then_some(vectors.dimension),
            entries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passage(content: &str) -> Passage {
        Passage {
            content: content.to_string(),
            source: "manuale.pdf".to_string(),
        }
    }

    fn sample_index() -> DocumentIndex {
        let mut index = DocumentIndex::new();
        index
            .add(
                vec![passage("a"), passage("a-copy"), passage("b"), passage("far")],
                vec![
                    vec![1.0, 0.0, 0.0],
                    vec![1.0, -0.01, 0.0],
                    vec![0.5, 1.0, 0.0],
                    vec![0.0, 0.0, 1.0],
                ],
            )
            .unwrap();
        index
    }

    #[test]
    fn test_add_checks_shape() {
        let mut index = DocumentIndex::new();
        assert!(index.add(vec![passage("x")], vec![]).is_err());
        assert!(index.add(vec![passage("x")], vec![vec![]]).is_err());

        index.add(vec![passage("x")], vec![vec![1.0, 0.0]]).unwrap();
        assert_eq!(index.dimension(), Some(2));

        // dimension mismatch leaves the index as it was
        assert!(index
            .add(vec![passage("y"), passage("z")], vec![vec![1.0, 0.0], vec![1.0]])
            .is_err());
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_mmr_prefers_diverse_passages() {
        let index = sample_index();

        // pure relevance keeps the near-duplicate
        let query = [1.0, 0.2, 0.0];
        let relevant = index.mmr_search(&query, 2, 4, 1.0).unwrap();
        assert_eq!(relevant[0].passage.content, "a");
        assert_eq!(relevant[1].passage.content, "a-copy");

        // balanced MMR skips it in favour of a different passage
        let diverse = index.mmr_search(&query, 2, 4, 0.5).unwrap();
        assert_eq!(diverse[0].passage.content, "a");
        assert_eq!(diverse[1].passage.content, "b");
    }

    #[test]
    fn test_mmr_bounds() {
        let index = sample_index();
        assert_eq!(index.mmr_search(&[1.0, 0.0, 0.0], 6, 20, 0.5).unwrap().len(), 4);
        assert!(index.mmr_search(&[1.0, 0.0, 0.0], 0, 20, 0.5).unwrap().is_empty());
        assert!(DocumentIndex::new().mmr_search(&[1.0], 6, 20, 0.5).unwrap().is_empty());
        assert!(index.mmr_search(&[1.0, 0.0], 2, 4, 0.5).is_err());
    }

    #[test]
    fn test_persisted_round_trip_keeps_order() {
        let index = sample_index();
        let (vectors, docstore) = index.to_persisted();
        assert_eq!(docstore.len(), 4);

        let restored = DocumentIndex::from_persisted(vectors, docstore).unwrap();
        let contents: Vec<_> = restored.passages().map(|p| p.content.as_str()).collect();
        assert_eq!(contents, vec!["a", "a-copy", "b", "far"]);
        assert_eq!(restored.dimension(), Some(3));
    }

    #[test]
    fn test_persisted_missing_passage_is_corrupt() {
        let (vectors, mut docstore) = sample_index().to_persisted();
        let first = vectors.ids[0].clone();
        docstore.remove(&first);
        assert!(DocumentIndex::from_persisted(vectors, docstore).is_err());
    }
}
