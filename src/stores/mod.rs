//! Storage backends for embedded chunks.
//!
//! [`VectorStore`] abstracts over concrete vector databases so the rest of
//! the pipeline never ties itself to one engine. The shipped implementation
//! is [`sqlite::SqliteVectorStore`], an embedded store built on
//! `tokio-rusqlite` with `sqlite-vec` for cosine similarity; remote backends
//! can implement the same trait.
//!
//! Semantics every implementation must honor:
//!
//! * `ensure_collection` is idempotent and fails with
//!   [`PipelineError::SchemaMismatch`] when an existing collection was
//!   registered with a different schema.
//! * `insert` writes in batches; a failing batch reports its index range and
//!   earlier batches are not rolled back (ingestion is at-least-once).
//! * `search` orders by similarity descending with ties broken by ascending
//!   `id`, clamps `top_k` to the configured maximum, and returns an empty
//!   result (not an error) on an empty collection.
//! * Connections are scoped to one operation and released on all exit paths;
//!   connectivity failures surface as [`PipelineError::StoreUnavailable`],
//!   distinct from schema and query errors.

pub mod sqlite;

use async_trait::async_trait;

use crate::types::{Chunk, PipelineError, RetrievalHit};

pub use sqlite::SqliteVectorStore;

/// Fixed schema of a collection: primary key `id`, vector `embedding`, text
/// `text`. Only the sizes vary per deployment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CollectionSchema {
    /// Length of every stored embedding vector.
    pub dimension: usize,
    /// Upper bound on stored text length, in characters.
    pub max_text_length: usize,
}

/// Unified interface to a vector database.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Creates the named collection if needed; verifies the schema if it
    /// already exists.
    async fn ensure_collection(
        &self,
        name: &str,
        schema: CollectionSchema,
    ) -> Result<(), PipelineError>;

    /// Inserts chunks in batches of at most the configured batch size.
    async fn insert(&self, collection: &str, chunks: &[Chunk]) -> Result<(), PipelineError>;

    /// Returns up to `top_k` nearest chunks by cosine similarity.
    async fn search(
        &self,
        collection: &str,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievalHit>, PipelineError>;
}
