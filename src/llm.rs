//! Hosted model client for report section generation.
//!
//! The shipped implementation speaks the `converse` REST shape: the prompt is
//! wrapped as guarded content, the configured guardrail policy rides along on
//! every request, and the generated text comes back under
//! `output.message.content`. Returned text is passed through unvalidated;
//! structural correctness of the output is the caller's responsibility.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::{GuardrailSettings, ModelSettings};
use crate::types::PipelineError;

/// Provider-side guardrail policy attached to a generation request.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardrailConfig {
    pub guardrail_identifier: String,
    pub guardrail_version: String,
    pub trace: String,
}

impl From<&GuardrailSettings> for GuardrailConfig {
    fn from(settings: &GuardrailSettings) -> Self {
        Self {
            guardrail_identifier: settings.identifier.clone(),
            guardrail_version: settings.version.clone(),
            trace: if settings.trace { "enabled" } else { "disabled" }.to_string(),
        }
    }
}

/// One generation call. Immutable once built.
#[derive(Clone, Debug)]
pub struct GenerationRequest {
    pub prompt: String,
    pub max_tokens: usize,
    pub guardrail: GuardrailConfig,
    pub model_id: String,
}

/// Sends assembled prompts to a hosted model.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Returns the generated text for one section.
    ///
    /// Failure classes: [`PipelineError::ModelUnavailable`] (transient, retry
    /// with backoff), [`PipelineError::ContentPolicy`] (guardrail blocked,
    /// not retryable with the same prompt), [`PipelineError::Quota`]
    /// (rate/usage limit).
    async fn generate(&self, request: &GenerationRequest) -> Result<String, PipelineError>;
}

#[derive(Deserialize)]
struct ConverseResponse {
    output: Option<ConverseOutput>,
    #[serde(rename = "stopReason")]
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
struct ConverseOutput {
    message: ConverseMessage,
}

#[derive(Deserialize)]
struct ConverseMessage {
    content: Vec<ConverseContent>,
}

#[derive(Deserialize)]
struct ConverseContent {
    text: Option<String>,
}

/// REST client for converse-style model endpoints.
pub struct ConverseClient {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl ConverseClient {
    pub fn new(settings: &ModelSettings) -> Result<Self, PipelineError> {
        let client = Client::builder()
            .timeout(settings.request_timeout())
            .use_rustls_tls()
            .build()
            .map_err(|err| PipelineError::Config(err.to_string()))?;
        Ok(Self {
            client,
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
        })
    }
}

#[async_trait]
impl ModelClient for ConverseClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, PipelineError> {
        let url = format!("{}/model/{}/converse", self.endpoint, request.model_id);
        let body = json!({
            "messages": [{
                "role": "user",
                "content": [{
                    "guardContent": { "text": { "text": request.prompt } }
                }]
            }],
            "guardrailConfig": request.guardrail,
            "inferenceConfig": {
                "temperature": 0.5,
                "maxTokens": request.max_tokens,
            },
        });

        let mut http = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            http = http.bearer_auth(key);
        }

        // Connect errors and timeouts are the transient class for this
        // component.
        let response = http
            .send()
            .await
            .map_err(|err| PipelineError::ModelUnavailable(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(classify_http_failure(status, &detail));
        }

        let parsed: ConverseResponse = response
            .json()
            .await
            .map_err(|err| PipelineError::ModelUnavailable(err.to_string()))?;

        if let Some(reason) = parsed.stop_reason.as_deref() {
            if reason == "guardrail_intervened" {
                return Err(PipelineError::ContentPolicy(
                    "guardrail intervened on the response".into(),
                ));
            }
        }

        let text = parsed
            .output
            .and_then(|output| {
                output
                    .message
                    .content
                    .into_iter()
                    .find_map(|content| content.text)
            })
            .ok_or_else(|| {
                PipelineError::ModelUnavailable("response carried no generated text".into())
            })?;
        Ok(text)
    }
}

fn classify_http_failure(status: StatusCode, detail: &str) -> PipelineError {
    let summary = format!("{status}: {}", detail.chars().take(200).collect::<String>());
    if status == StatusCode::TOO_MANY_REQUESTS {
        PipelineError::Quota(summary)
    } else if status.is_server_error() {
        PipelineError::ModelUnavailable(summary)
    } else if detail.to_ascii_lowercase().contains("guardrail") {
        PipelineError::ContentPolicy(summary)
    } else {
        // Remaining 4xx responses are request construction problems, not
        // worth retrying.
        PipelineError::Config(summary)
    }
}
