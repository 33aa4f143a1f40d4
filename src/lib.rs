//! ```text
//! Trusted URL list ──► ingestion::fetch ──► plain text per source
//!                                   │
//!                                   ▼
//!             ingestion::chunker ──► bounded segments ──► embeddings::EmbeddingProvider
//!                                                                  │
//!                                                                  ▼
//!                       stores::VectorStore (batched inserts, one collection per target)
//!                                                                  │
//! Template section ──► retriever::Retriever ◄──────────────────────┘
//!          │                      │
//!          ▼                      ▼
//! prompt::PromptAssembler (token budgeted) ──► llm::ModelClient ──► ReportSection
//!                                                                  │
//!                         pipeline::ReportPipeline ◄───────────────┘
//!                                   │
//!                                   ▼
//!                      documents::ReportWriter (best-effort report + skip list)
//! ```

pub mod catalog;
pub mod config;
pub mod documents;
pub mod embeddings;
pub mod ingestion;
pub mod llm;
pub mod pipeline;
pub mod prompt;
pub mod retriever;
pub mod retry;
pub mod stores;
pub mod tokenizer;
pub mod types;

pub use embeddings::{EmbeddingProvider, MockEmbeddingProvider};
pub use pipeline::{ReportPipeline, RunReport};
pub use types::{Chunk, EntityKind, PipelineError, RetrievalHit};
