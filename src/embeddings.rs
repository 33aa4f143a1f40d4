//! Embedding providers: the fixed function mapping text to vectors.
//!
//! Embedding must be deterministic for identical input so duplicate content
//! from redundant URLs can be deduplicated at retrieval time and so tests are
//! reproducible. The HTTP provider inherits whatever determinism the backing
//! model offers; [`MockEmbeddingProvider`] is bit-for-bit stable and ships in
//! the library proper so integration tests and offline runs share it.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::EmbeddingSettings;
use crate::types::PipelineError;

/// The fixed embedding function used for both ingestion and queries.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embeds a batch of texts, one vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError>;

    /// Embeds a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, PipelineError> {
        let input = [text.to_string()];
        let mut vectors = self.embed_batch(&input).await?;
        vectors
            .pop()
            .ok_or_else(|| PipelineError::Embedding("provider returned no vector".into()))
    }

    /// Dimension of every vector this provider produces.
    fn dimension(&self) -> usize;
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingEntry>,
}

#[derive(Deserialize)]
struct EmbeddingEntry {
    index: usize,
    embedding: Vec<f32>,
}

/// Client for OpenAI-compatible `/embeddings` endpoints.
pub struct HttpEmbeddingProvider {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    dimension: usize,
}

impl HttpEmbeddingProvider {
    /// Builds a provider from configuration. `dimension` must match the
    /// vector size the configured model actually emits.
    pub fn new(settings: &EmbeddingSettings, dimension: usize) -> Result<Self, PipelineError> {
        let client = Client::builder()
            .timeout(settings.timeout())
            .use_rustls_tls()
            .build()
            .map_err(|err| PipelineError::Config(err.to_string()))?;
        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", settings.endpoint.trim_end_matches('/')),
            model: settings.model.clone(),
            api_key: settings.api_key.clone(),
            dimension,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut request = self.client.post(&self.endpoint).json(&EmbeddingRequest {
            model: &self.model,
            input: texts,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|err| PipelineError::Embedding(err.to_string()))?
            .error_for_status()
            .map_err(|err| PipelineError::Embedding(err.to_string()))?;

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|err| PipelineError::Embedding(err.to_string()))?;
        parsed.data.sort_by_key(|entry| entry.index);

        if parsed.data.len() != texts.len() {
            return Err(PipelineError::Embedding(format!(
                "endpoint returned {} vectors for {} inputs",
                parsed.data.len(),
                texts.len()
            )));
        }

        let vectors: Vec<Vec<f32>> = parsed.data.into_iter().map(|e| e.embedding).collect();
        for vector in &vectors {
            if vector.len() != self.dimension {
                return Err(PipelineError::Embedding(format!(
                    "expected dimension {}, endpoint returned {}",
                    self.dimension,
                    vector.len()
                )));
            }
        }
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Deterministic, offline embedding provider.
///
/// Vectors are derived from an FNV-1a hash of the input text driving a small
/// LCG, then L2-normalized. Identical text always yields the identical
/// vector; distinct texts collide with negligible probability.
#[derive(Clone, Debug)]
pub struct MockEmbeddingProvider {
    dimension: usize,
}

impl MockEmbeddingProvider {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut state: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in text.as_bytes() {
            state ^= u64::from(*byte);
            state = state.wrapping_mul(0x0000_0100_0000_01b3);
        }

        let mut vector = Vec::with_capacity(self.dimension);
        for _ in 0..self.dimension {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            // Map the top bits into [-1, 1).
            let unit = ((state >> 11) as f64) / ((1u64 << 53) as f64);
            vector.push((unit * 2.0 - 1.0) as f32);
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[tokio::test]
    async fn mock_provider_is_deterministic() {
        let provider = MockEmbeddingProvider::new(16);
        let inputs = vec![
            "Hello world".to_string(),
            "Goodbye world".to_string(),
            "Hello world".to_string(),
        ];

        let first = provider.embed_batch(&inputs).await.unwrap();
        let second = provider.embed_batch(&inputs).await.unwrap();

        assert_eq!(first, second, "same inputs must yield the same vectors");
        assert_eq!(first[0], first[2], "identical text, identical embedding");
        assert_ne!(first[0], first[1], "distinct text, distinct embedding");
        assert_eq!(first[0].len(), 16);
    }

    #[tokio::test]
    async fn mock_vectors_are_normalized() {
        let provider = MockEmbeddingProvider::new(32);
        let vector = provider.embed("some text").await.unwrap();
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5, "norm was {norm}");
    }

    #[tokio::test]
    async fn http_provider_parses_and_orders_response() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/embeddings");
                then.status(200).json_body(json!({
                    "data": [
                        {"index": 1, "embedding": [0.0, 1.0]},
                        {"index": 0, "embedding": [1.0, 0.0]}
                    ]
                }));
            })
            .await;

        let settings = EmbeddingSettings {
            endpoint: format!("{}/v1", server.base_url()),
            model: "test-model".into(),
            api_key: None,
            timeout_secs: 5,
        };
        let provider = HttpEmbeddingProvider::new(&settings, 2).unwrap();
        let vectors = provider
            .embed_batch(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[tokio::test]
    async fn http_provider_rejects_wrong_dimension() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/embeddings");
                then.status(200)
                    .json_body(json!({"data": [{"index": 0, "embedding": [0.5]}]}));
            })
            .await;

        let settings = EmbeddingSettings {
            endpoint: format!("{}/v1", server.base_url()),
            model: "test-model".into(),
            api_key: None,
            timeout_secs: 5,
        };
        let provider = HttpEmbeddingProvider::new(&settings, 3).unwrap();
        let err = provider.embed("x").await.unwrap_err();
        assert!(matches!(err, PipelineError::Embedding(_)));
    }
}
