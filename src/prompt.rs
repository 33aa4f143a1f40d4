//! Prompt assembly under a hard token budget.

use std::sync::Arc;

use crate::catalog;
use crate::documents::TemplateSection;
use crate::tokenizer::TokenCounter;
use crate::types::{EntityKind, PipelineError, RetrievalHit};

/// Everything needed to build the prompt for one report section. Built per
/// section and discarded after assembly.
#[derive(Debug)]
pub struct PromptContext<'a> {
    pub section: &'a TemplateSection,
    pub hits: &'a [RetrievalHit],
    pub entity_name: &'a str,
    pub entity_kind: EntityKind,
}

/// A rendered prompt together with its measured cost.
#[derive(Clone, Debug)]
pub struct AssembledPrompt {
    pub text: String,
    pub token_count: usize,
    pub chunks_included: usize,
}

/// Renders catalog prompts and trims retrieved context to the token budget.
///
/// Chunks are appended whole, in relevance order; the first chunk that would
/// push the rendered prompt past `max_tokens` minus the response reserve
/// stops the appending. The token count is always measured on the fully
/// rendered prompt with the same [`TokenCounter`] the model provider expects,
/// so the budget guarantee is exact rather than estimated.
pub struct PromptAssembler {
    counter: Arc<dyn TokenCounter>,
    response_reserve: usize,
}

impl PromptAssembler {
    pub fn new(counter: Arc<dyn TokenCounter>, response_reserve: usize) -> Self {
        Self {
            counter,
            response_reserve,
        }
    }

    /// Builds the retrieval query for one section.
    pub fn retrieval_query(&self, ctx: &PromptContext<'_>) -> String {
        render(catalog::RETRIEVAL_QUERY_TEMPLATE, ctx, "")
    }

    /// Renders the prompt for `ctx`, including as many retrieved chunks as
    /// the budget allows.
    ///
    /// Fails with [`PipelineError::BudgetExceeded`] when the template shell
    /// alone does not fit. An empty `ctx.hits` still renders the shell.
    pub fn assemble(
        &self,
        ctx: &PromptContext<'_>,
        max_tokens: usize,
    ) -> Result<AssembledPrompt, PipelineError> {
        let budget = max_tokens.saturating_sub(self.response_reserve);
        let template = catalog::system_prompt(ctx.entity_kind);

        let shell = render(template, ctx, "");
        let shell_tokens = self.counter.count_tokens(&shell);
        if shell_tokens > budget {
            return Err(PipelineError::BudgetExceeded(format!(
                "template shell needs {shell_tokens} tokens, budget is {budget} \
                 ({max_tokens} minus {} reserved for the response)",
                self.response_reserve
            )));
        }

        let mut best = AssembledPrompt {
            text: shell,
            token_count: shell_tokens,
            chunks_included: 0,
        };

        let mut context_block = String::new();
        for (index, hit) in ctx.hits.iter().enumerate() {
            let mut candidate_block = context_block.clone();
            if !candidate_block.is_empty() {
                candidate_block.push_str("\n\n");
            }
            candidate_block.push_str(&hit.chunk.text);

            let candidate = render(template, ctx, &candidate_block);
            let tokens = self.counter.count_tokens(&candidate);
            if tokens > budget {
                // No partial inclusion: the first chunk that overflows ends
                // the context block.
                tracing::debug!(
                    section = %ctx.section.name,
                    chunks_included = index,
                    "token budget reached"
                );
                break;
            }

            context_block = candidate_block;
            best = AssembledPrompt {
                text: candidate,
                token_count: tokens,
                chunks_included: index + 1,
            };
        }

        Ok(best)
    }
}

fn render(template: &str, ctx: &PromptContext<'_>, context_block: &str) -> String {
    template
        .replace("{entity_name}", ctx.entity_name)
        .replace("{entity_kind}", &ctx.entity_kind.to_string())
        .replace("{section_name}", &ctx.section.name)
        .replace("{section_body}", &ctx.section.body)
        .replace("{context}", context_block)
}
