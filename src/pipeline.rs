//! Run orchestration: fetch → ingest → (retrieve → assemble → generate) per
//! section → assembled report.
//!
//! Per-URL and per-section failures are collected and surfaced in the final
//! [`RunReport`]; only schema and configuration errors abort a run. Transient
//! failures go through the [`RetryPolicy`] before counting as failures.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::StreamExt;
use url::Url;

use crate::config::Settings;
use crate::documents::ReportTemplate;
use crate::embeddings::EmbeddingProvider;
use crate::ingestion::{ChunkIdAllocator, ContentFetcher, TextChunker, chunk_and_embed};
use crate::llm::{GenerationRequest, GuardrailConfig, ModelClient};
use crate::prompt::{PromptAssembler, PromptContext};
use crate::retriever::Retriever;
use crate::retry::RetryPolicy;
use crate::stores::{CollectionSchema, VectorStore};
use crate::tokenizer::TokenCounter;
use crate::types::{EntityKind, PipelineError};

/// Steps of a run, in order. `Failed` is reachable from any of them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunPhase {
    Init,
    Fetching,
    Ingesting,
    Retrieving,
    Assembling,
    Generating,
    Assembled,
    Done,
    Failed,
}

/// Outcome of one template section.
#[derive(Clone, Debug)]
pub enum SectionResult {
    Generated(String),
    Failed(String),
}

#[derive(Clone, Debug)]
pub struct SectionOutcome {
    pub name: String,
    pub result: SectionResult,
}

/// Best-effort result of a run: every template section accounted for, plus
/// the sources that had to be skipped.
#[derive(Clone, Debug)]
pub struct RunReport {
    pub entity_name: String,
    pub entity_kind: EntityKind,
    pub sections: Vec<SectionOutcome>,
    /// `(url, reason)` for every source that did not make it into the store.
    pub skipped_urls: Vec<(String, String)>,
}

impl RunReport {
    pub fn failed_section_count(&self) -> usize {
        self.sections
            .iter()
            .filter(|s| matches!(s.result, SectionResult::Failed(_)))
            .count()
    }
}

/// Requests a graceful stop: the run ends after the current in-flight call.
#[derive(Clone, Debug)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }
}

/// Sequences one report run over the injected collaborators.
pub struct ReportPipeline {
    settings: Settings,
    fetcher: ContentFetcher,
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    model: Arc<dyn ModelClient>,
    assembler: PromptAssembler,
    retry: RetryPolicy,
    cancel: Arc<AtomicBool>,
}

impl ReportPipeline {
    pub fn new(
        settings: Settings,
        fetcher: ContentFetcher,
        provider: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        model: Arc<dyn ModelClient>,
        counter: Arc<dyn TokenCounter>,
    ) -> Self {
        let assembler = PromptAssembler::new(counter, settings.model.response_reserve_tokens);
        let retry = RetryPolicy::from(&settings.retry);
        Self {
            settings,
            fetcher,
            provider,
            store,
            model,
            assembler,
            retry,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle for aborting the run between steps.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            flag: Arc::clone(&self.cancel),
        }
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Executes one full run for the given target.
    ///
    /// Returns `Err` only for run-fatal conditions (schema mismatch, broken
    /// configuration); everything else lands in the report as a skipped URL
    /// or failed section.
    pub async fn run(
        &self,
        entity_name: &str,
        entity_kind: EntityKind,
        urls: &[Url],
        template: &ReportTemplate,
    ) -> Result<RunReport, PipelineError> {
        let mut phase = RunPhase::Init;
        let mut report = RunReport {
            entity_name: entity_name.to_string(),
            entity_kind,
            sections: Vec::new(),
            skipped_urls: Vec::new(),
        };

        let provider_dimension = self.provider.dimension();
        if provider_dimension != self.settings.store.dimension {
            let _ = self.enter(phase, RunPhase::Failed);
            return Err(PipelineError::Config(format!(
                "embedding provider dimension {provider_dimension} does not match \
                 store dimension {}",
                self.settings.store.dimension
            )));
        }

        // FETCHING: independent URLs, bounded concurrency, failures collected.
        phase = self.enter(phase, RunPhase::Fetching);
        let fetched = self.fetch_all(urls, &mut report.skipped_urls).await;

        // INGESTING: one pass over everything that fetched successfully. A
        // cancel issued during fetching stops here; already-fetched text is
        // recorded as skipped rather than ingested.
        phase = self.enter(phase, RunPhase::Ingesting);
        if self.cancelled() {
            for (url, _) in &fetched {
                report
                    .skipped_urls
                    .push((url.to_string(), "run cancelled".into()));
            }
        } else {
            if let Err(err) = self.ensure_collection().await {
                let _ = self.enter(phase, RunPhase::Failed);
                return Err(err);
            }
            if let Err(err) = self.ingest(fetched, &mut report.skipped_urls).await {
                let _ = self.enter(phase, RunPhase::Failed);
                return Err(err);
            }
        }

        let retriever = Retriever::new(
            Arc::clone(&self.provider),
            Arc::clone(&self.store),
            self.settings.store.collection.clone(),
        );

        // Section loop is sequential by design: later prompts may depend on
        // template ordering.
        for section in &template.sections {
            if self.cancelled() {
                tracing::warn!(section = %section.name, "run cancelled, skipping remaining sections");
                report.sections.push(SectionOutcome {
                    name: section.name.clone(),
                    result: SectionResult::Failed("run cancelled".into()),
                });
                continue;
            }

            phase = self.enter(phase, RunPhase::Retrieving);
            let result = self
                .generate_section(&retriever, entity_name, entity_kind, section, &mut phase)
                .await;

            let outcome = match result {
                Ok(text) => SectionResult::Generated(text),
                Err(err) => {
                    tracing::warn!(section = %section.name, error = %err, "section failed");
                    SectionResult::Failed(err.to_string())
                }
            };
            report.sections.push(SectionOutcome {
                name: section.name.clone(),
                result: outcome,
            });
        }

        phase = self.enter(phase, RunPhase::Assembled);
        let _ = self.enter(phase, RunPhase::Done);
        Ok(report)
    }

    fn enter(&self, from: RunPhase, to: RunPhase) -> RunPhase {
        tracing::debug!(?from, ?to, "run phase transition");
        to
    }

    async fn fetch_all(
        &self,
        urls: &[Url],
        skipped: &mut Vec<(String, String)>,
    ) -> Vec<(Url, String)> {
        let concurrency = self.settings.fetch.concurrency.max(1);
        let results: Vec<(Url, Result<String, PipelineError>)> =
            futures_util::stream::iter(urls.iter().cloned())
                .map(|url| {
                    let fetcher = self.fetcher.clone();
                    async move {
                        // In-flight fetches complete; cancelled URLs are not
                        // started.
                        if self.cancelled() {
                            let err = PipelineError::Fetch {
                                url: url.to_string(),
                                reason: "run cancelled".into(),
                            };
                            return (url, Err(err));
                        }
                        let result = fetcher.fetch(&url).await;
                        (url, result)
                    }
                })
                .buffer_unordered(concurrency)
                .collect()
                .await;

        let mut fetched = Vec::new();
        for (url, result) in results {
            match result {
                Ok(text) => fetched.push((url, text)),
                Err(err) => {
                    tracing::warn!(url = %url, error = %err, "source skipped");
                    skipped.push((url.to_string(), err.to_string()));
                }
            }
        }
        fetched
    }

    async fn ensure_collection(&self) -> Result<(), PipelineError> {
        let schema = CollectionSchema {
            dimension: self.settings.store.dimension,
            max_text_length: self.settings.store.max_text_length,
        };
        let name = &self.settings.store.collection;
        self.retry
            .run(|| self.store.ensure_collection(name, schema))
            .await
    }

    async fn ingest(
        &self,
        fetched: Vec<(Url, String)>,
        skipped: &mut Vec<(String, String)>,
    ) -> Result<(), PipelineError> {
        let chunker = TextChunker::new(self.settings.store.max_text_length);
        let ids = ChunkIdAllocator::new();
        let collection = &self.settings.store.collection;

        for (url, text) in fetched {
            if self.cancelled() {
                skipped.push((url.to_string(), "run cancelled".into()));
                continue;
            }
            let chunks =
                match chunk_and_embed(&chunker, self.provider.as_ref(), &ids, &text).await {
                    Ok(chunks) => chunks,
                    Err(err) => {
                        // Embedding failure is fatal to this text only.
                        tracing::warn!(url = %url, error = %err, "ingestion skipped for source");
                        skipped.push((url.to_string(), err.to_string()));
                        continue;
                    }
                };
            if chunks.is_empty() {
                skipped.push((url.to_string(), "no content after markup stripping".into()));
                continue;
            }

            let insert = self
                .retry
                .run(|| self.store.insert(collection, &chunks))
                .await;
            match insert {
                Ok(()) => {
                    tracing::info!(url = %url, chunks = chunks.len(), "source ingested");
                }
                Err(err @ PipelineError::SchemaMismatch { .. }) => return Err(err),
                Err(err) => {
                    skipped.push((url.to_string(), err.to_string()));
                }
            }
        }
        Ok(())
    }

    async fn generate_section(
        &self,
        retriever: &Retriever,
        entity_name: &str,
        entity_kind: EntityKind,
        section: &crate::documents::TemplateSection,
        phase: &mut RunPhase,
    ) -> Result<String, PipelineError> {
        let ctx = PromptContext {
            section,
            hits: &[],
            entity_name,
            entity_kind,
        };
        let query = self.assembler.retrieval_query(&ctx);
        let hits = self
            .retry
            .run(|| retriever.retrieve(&query, self.settings.store.top_k))
            .await?;

        *phase = self.enter(*phase, RunPhase::Assembling);
        let ctx = PromptContext {
            section,
            hits: &hits,
            entity_name,
            entity_kind,
        };
        let prompt = self
            .assembler
            .assemble(&ctx, self.settings.model.max_tokens)?;
        tracing::debug!(
            section = %section.name,
            tokens = prompt.token_count,
            chunks = prompt.chunks_included,
            "prompt assembled"
        );

        *phase = self.enter(*phase, RunPhase::Generating);
        let request = GenerationRequest {
            prompt: prompt.text,
            max_tokens: self.settings.model.response_reserve_tokens,
            guardrail: GuardrailConfig::from(&self.settings.model.guardrail),
            model_id: self.settings.model.model_id.clone(),
        };
        self.retry.run(|| self.model.generate(&request)).await
    }
}
