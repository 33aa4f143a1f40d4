//! Query-time retrieval: embed, search, deduplicate.

use std::collections::HashMap;
use std::sync::Arc;

use crate::embeddings::EmbeddingProvider;
use crate::stores::VectorStore;
use crate::types::{PipelineError, RetrievalHit};

/// Retrieves the most relevant stored chunks for a query.
///
/// Deduplication guards against double-ingestion of the same content from
/// redundant URLs: of two hits with identical text, the higher-scored one is
/// kept, ties going to the lower id.
pub struct Retriever {
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    collection: String,
}

impl Retriever {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            store,
            collection: collection.into(),
        }
    }

    /// Returns up to `top_k` deduplicated hits, descending by score. Returns
    /// fewer when the store holds fewer; never pads.
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievalHit>, PipelineError> {
        let query_embedding = self.provider.embed(query).await?;
        let hits = self
            .store
            .search(&self.collection, &query_embedding, top_k)
            .await?;
        Ok(dedup_by_text(hits))
    }
}

/// Keeps one hit per distinct text: the higher score wins, ties go to the
/// lower id. Relative ordering of the survivors is preserved.
fn dedup_by_text(hits: Vec<RetrievalHit>) -> Vec<RetrievalHit> {
    let mut best: HashMap<String, usize> = HashMap::new();
    let mut keep = vec![true; hits.len()];

    for (index, hit) in hits.iter().enumerate() {
        match best.get(&hit.chunk.text) {
            None => {
                best.insert(hit.chunk.text.clone(), index);
            }
            Some(&winner) => {
                let current = &hits[winner];
                let replaces = hit.score > current.score
                    || (hit.score == current.score && hit.chunk.id < current.chunk.id);
                if replaces {
                    keep[winner] = false;
                    keep[index] = true;
                    best.insert(hit.chunk.text.clone(), index);
                } else {
                    keep[index] = false;
                }
            }
        }
    }

    hits.into_iter()
        .zip(keep)
        .filter_map(|(hit, kept)| kept.then_some(hit))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Chunk;

    fn hit(id: i64, text: &str, score: f32) -> RetrievalHit {
        RetrievalHit {
            chunk: Chunk {
                id,
                text: text.to_string(),
                embedding: vec![0.0],
            },
            score,
        }
    }

    #[test]
    fn identical_text_keeps_the_higher_score() {
        let hits = vec![
            hit(1, "shared text", 0.9),
            hit(2, "other", 0.8),
            hit(3, "shared text", 0.7),
        ];
        let deduped = dedup_by_text(hits);
        let ids: Vec<i64> = deduped.iter().map(|h| h.chunk.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn score_ties_keep_the_lower_id() {
        let hits = vec![hit(9, "same", 0.5), hit(4, "same", 0.5)];
        let deduped = dedup_by_text(hits);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].chunk.id, 4);
    }

    #[test]
    fn distinct_texts_are_untouched() {
        let hits = vec![hit(1, "a", 0.9), hit(2, "b", 0.8), hit(3, "c", 0.7)];
        assert_eq!(dedup_by_text(hits).len(), 3);
    }

    #[test]
    fn empty_input_stays_empty() {
        assert!(dedup_by_text(Vec::new()).is_empty());
    }
}
