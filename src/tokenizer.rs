//! Token counting behind a single seam.
//!
//! Budgeting is the highest-risk numeric surface in the pipeline: counts must
//! come from the identical tokenizer the model provider uses, or budgeting
//! either drops content that fits or produces requests the endpoint rejects.
//! Everything downstream depends only on [`TokenCounter`], so tests can swap
//! the tokenizer without touching budgeting logic.

use std::sync::Arc;

use tiktoken_rs::{CoreBPE, cl100k_base};

use crate::types::PipelineError;

/// Counts tokens the way the target model does.
pub trait TokenCounter: Send + Sync {
    fn count_tokens(&self, text: &str) -> usize;
}

/// `cl100k_base` byte-pair tokenizer, matching the encoding the report model
/// expects.
#[derive(Clone)]
pub struct TiktokenCounter {
    bpe: Arc<CoreBPE>,
}

impl TiktokenCounter {
    pub fn new() -> Result<Self, PipelineError> {
        let bpe = cl100k_base().map_err(|err| PipelineError::Config(err.to_string()))?;
        Ok(Self { bpe: Arc::new(bpe) })
    }
}

impl TokenCounter for TiktokenCounter {
    fn count_tokens(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_are_stable_and_nonzero_for_text() {
        let counter = TiktokenCounter::new().unwrap();
        let text = "Acme Corp was founded in 1999 and is headquartered in Denver.";
        let first = counter.count_tokens(text);
        let second = counter.count_tokens(text);
        assert_eq!(first, second);
        assert!(first > 0);
    }

    #[test]
    fn empty_text_counts_zero() {
        let counter = TiktokenCounter::new().unwrap();
        assert_eq!(counter.count_tokens(""), 0);
    }

    #[test]
    fn longer_text_never_counts_fewer_tokens() {
        let counter = TiktokenCounter::new().unwrap();
        let short = counter.count_tokens("alpha beta");
        let long = counter.count_tokens("alpha beta gamma delta epsilon");
        assert!(long >= short);
    }
}
