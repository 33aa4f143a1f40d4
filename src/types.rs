//! Core data types and the crate-wide error taxonomy.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A bounded-length text segment plus its embedding vector, the unit stored
/// and retrieved.
///
/// Invariants maintained by the ingestion pipeline:
/// `text.len() <= max_text_length` and `embedding.len() == dimension`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Monotonically assigned identifier, unique across all documents of a run.
    pub id: i64,
    /// The segment text.
    pub text: String,
    /// Fixed-dimension embedding of `text`.
    pub embedding: Vec<f32>,
}

/// Kind of research target a report is generated for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityKind {
    Company,
    Individual,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Company => write!(f, "company"),
            Self::Individual => write!(f, "individual"),
        }
    }
}

/// A retrieved chunk with its similarity score (higher is more relevant).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetrievalHit {
    pub chunk: Chunk,
    pub score: f32,
}

/// One generated report section, keyed by the template section name.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReportSection {
    pub name: String,
    pub text: String,
}

/// Crate-wide error taxonomy.
///
/// Variants map onto the propagation policy of the pipeline: per-URL and
/// per-section failures are collected and surfaced in the final report, while
/// schema and configuration errors abort the run. [`is_transient`] tells the
/// orchestrator which failures are worth retrying with backoff.
///
/// [`is_transient`]: PipelineError::is_transient
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A single URL could not be fetched; non-fatal to the run.
    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    /// Embedding backend failed or was handed unusable input.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// An existing collection's registered schema differs from the requested
    /// one. Fatal misconfiguration; never retried.
    #[error("collection '{collection}' schema mismatch: {detail}")]
    SchemaMismatch { collection: String, detail: String },

    /// The vector store could not be reached or opened. Transient.
    #[error("vector store unavailable: {0}")]
    StoreUnavailable(String),

    /// A batch insert failed; `start..end` is the chunk index range of the
    /// failing batch. Earlier batches are not rolled back.
    #[error("insert into '{collection}' failed for chunks {start}..{end}: {reason}")]
    BatchInsert {
        collection: String,
        start: usize,
        end: usize,
        reason: String,
    },

    /// A store query failed for a reason other than availability.
    #[error("store query failed: {0}")]
    Query(String),

    /// The prompt shell alone exceeds the token budget; no chunk can fit.
    #[error("token budget exceeded: {0}")]
    BudgetExceeded(String),

    /// The provider's guardrail blocked the request. Not retryable with the
    /// same prompt.
    #[error("guardrail blocked the request: {0}")]
    ContentPolicy(String),

    /// The model endpoint timed out or returned a server error. Transient.
    #[error("model endpoint unavailable: {0}")]
    ModelUnavailable(String),

    /// Rate or usage limit hit. Transient.
    #[error("model quota exceeded: {0}")]
    Quota(String),

    /// Invalid or incomplete configuration; aborts the run.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// An input or template document could not be understood.
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Returns `true` for failures a bounded-backoff retry may recover from.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::StoreUnavailable(_) | Self::ModelUnavailable(_) | Self::Quota(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification_matches_taxonomy() {
        assert!(PipelineError::StoreUnavailable("down".into()).is_transient());
        assert!(PipelineError::ModelUnavailable("503".into()).is_transient());
        assert!(PipelineError::Quota("429".into()).is_transient());

        assert!(!PipelineError::ContentPolicy("blocked".into()).is_transient());
        assert!(!PipelineError::BudgetExceeded("shell too large".into()).is_transient());
        assert!(
            !PipelineError::SchemaMismatch {
                collection: "c".into(),
                detail: "dim".into()
            }
            .is_transient()
        );
    }
}
