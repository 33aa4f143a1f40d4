//! Pairing text segments with embeddings and assigning chunk ids.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::embeddings::EmbeddingProvider;
use crate::ingestion::chunker::TextChunker;
use crate::types::{Chunk, PipelineError};

/// Hands out monotonically increasing chunk ids.
///
/// Shared across all documents of a run so ids stay unique even when
/// ingestion is pipelined with fetching. Ordering across documents carries no
/// meaning; only uniqueness matters for retrieval dedup.
#[derive(Clone, Debug, Default)]
pub struct ChunkIdAllocator {
    next: Arc<AtomicI64>,
}

impl ChunkIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> i64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

/// Splits `text` into bounded segments and embeds each one.
///
/// Whitespace-only input yields an empty vector, not an error. A provider
/// failure surfaces as [`PipelineError::Embedding`] and leaves the allocator
/// untouched for the failed text.
pub async fn chunk_and_embed(
    chunker: &TextChunker,
    provider: &dyn EmbeddingProvider,
    ids: &ChunkIdAllocator,
    text: &str,
) -> Result<Vec<Chunk>, PipelineError> {
    let segments = chunker.chunk(text);
    if segments.is_empty() {
        return Ok(Vec::new());
    }

    let embeddings = provider.embed_batch(&segments).await?;
    if embeddings.len() != segments.len() {
        return Err(PipelineError::Embedding(format!(
            "provider returned {} vectors for {} segments",
            embeddings.len(),
            segments.len()
        )));
    }

    let chunks = segments
        .into_iter()
        .zip(embeddings)
        .map(|(text, embedding)| Chunk {
            id: ids.next_id(),
            text,
            embedding,
        })
        .collect();
    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::MockEmbeddingProvider;

    #[tokio::test]
    async fn empty_input_yields_no_chunks() {
        let chunker = TextChunker::new(100);
        let provider = MockEmbeddingProvider::new(8);
        let ids = ChunkIdAllocator::new();

        let chunks = chunk_and_embed(&chunker, &provider, &ids, "  \n ")
            .await
            .unwrap();
        assert!(chunks.is_empty());
        assert_eq!(ids.next_id(), 0, "no ids consumed for empty input");
    }

    #[tokio::test]
    async fn chunks_carry_monotonic_ids_and_matching_vectors() {
        let chunker = TextChunker::new(30);
        let provider = MockEmbeddingProvider::new(8);
        let ids = ChunkIdAllocator::new();

        let chunks = chunk_and_embed(
            &chunker,
            &provider,
            &ids,
            "First paragraph here.\nSecond paragraph here.\nThird paragraph here.",
        )
        .await
        .unwrap();

        assert!(chunks.len() > 1);
        for (index, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.id, index as i64);
            assert_eq!(chunk.embedding.len(), 8);
            assert!(chunk.text.chars().count() <= 30);
        }
    }

    #[tokio::test]
    async fn identical_text_embeds_identically_across_documents() {
        let chunker = TextChunker::new(100);
        let provider = MockEmbeddingProvider::new(8);
        let ids = ChunkIdAllocator::new();

        let first = chunk_and_embed(&chunker, &provider, &ids, "Shared content.")
            .await
            .unwrap();
        let second = chunk_and_embed(&chunker, &provider, &ids, "Shared content.")
            .await
            .unwrap();

        assert_ne!(first[0].id, second[0].id, "ids stay unique");
        assert_eq!(
            first[0].embedding, second[0].embedding,
            "embedding is deterministic for identical text"
        );
    }
}
