//! Ingestion: turning trusted URLs into embedded chunks.
//!
//! * [`fetch`] — retrieves a URL and reduces it to markup-free plain text.
//! * [`chunker`] — splits text into bounded-length, boundary-aware segments.
//! * [`embed`] — pairs segments with embeddings and assigns chunk ids.

pub mod chunker;
pub mod embed;
pub mod fetch;

pub use chunker::TextChunker;
pub use embed::{ChunkIdAllocator, chunk_and_embed};
pub use fetch::ContentFetcher;
