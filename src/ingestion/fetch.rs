//! Fetching trusted URLs and reducing them to plain text.

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use scraper::Html;
use url::Url;

use crate::config::FetchSettings;
use crate::types::PipelineError;

static SPACE_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+").expect("valid regex"));

/// Retrieves raw documents over HTTP(S) and strips markup.
///
/// No retries happen here; the orchestrator owns retry policy. A failure is
/// reported as [`PipelineError::Fetch`] carrying the URL and cause so the
/// caller can decide between skipping the source and aborting the run.
#[derive(Clone, Debug)]
pub struct ContentFetcher {
    client: Client,
}

impl ContentFetcher {
    pub fn new(settings: &FetchSettings) -> Result<Self, PipelineError> {
        let client = Client::builder()
            .timeout(settings.timeout())
            .use_rustls_tls()
            .build()
            .map_err(|err| PipelineError::Config(err.to_string()))?;
        Ok(Self { client })
    }

    /// Fetches `url` and returns its body as whitespace-normalized plain text.
    ///
    /// Network failures, timeouts, and non-success statuses all map to
    /// [`PipelineError::Fetch`].
    pub async fn fetch(&self, url: &Url) -> Result<String, PipelineError> {
        let fetch_err = |reason: String| PipelineError::Fetch {
            url: url.to_string(),
            reason,
        };

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|err| fetch_err(err.to_string()))?
            .error_for_status()
            .map_err(|err| fetch_err(err.to_string()))?;

        let body = response
            .text()
            .await
            .map_err(|err| fetch_err(err.to_string()))?;

        tracing::debug!(url = %url, bytes = body.len(), "fetched source");
        Ok(extract_text(&body))
    }
}

/// Strips markup from an HTML document, keeping one line per text node.
///
/// Script, style, and noscript contents are dropped. Runs of spaces and tabs
/// collapse to a single space; no semantic cleanup beyond that.
pub fn extract_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut lines: Vec<String> = Vec::new();

    for node in document.tree.nodes() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let in_ignored = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| matches!(el.name(), "script" | "style" | "noscript"))
        });
        if in_ignored {
            continue;
        }
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        lines.push(SPACE_RUNS.replace_all(trimmed, " ").into_owned());
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FetchSettings;
    use httpmock::prelude::*;

    #[test]
    fn extract_text_strips_markup_and_scripts() {
        let html = r#"<html><head><title>T</title>
            <script>var x = "ignored";</script>
            <style>body { color: red; }</style></head>
            <body><h1>Acme   Corp</h1><p>Founded in
            1999.</p></body></html>"#;

        let text = extract_text(html);
        assert!(text.contains("Acme Corp"));
        assert!(text.contains("Founded in"));
        assert!(!text.contains("ignored"));
        assert!(!text.contains("color: red"));
    }

    #[tokio::test]
    async fn fetch_returns_plain_text() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/about");
                then.status(200)
                    .body("<html><body><p>Hello <b>world</b></p></body></html>");
            })
            .await;

        let fetcher = ContentFetcher::new(&FetchSettings::default()).unwrap();
        let url = Url::parse(&format!("{}/about", server.base_url())).unwrap();
        let text = fetcher.fetch(&url).await.unwrap();
        assert!(text.contains("Hello"));
        assert!(text.contains("world"));
        assert!(!text.contains("<b>"));
    }

    #[tokio::test]
    async fn fetch_maps_http_error_to_fetch_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/gone");
                then.status(404);
            })
            .await;

        let fetcher = ContentFetcher::new(&FetchSettings::default()).unwrap();
        let url = Url::parse(&format!("{}/gone", server.base_url())).unwrap();
        let err = fetcher.fetch(&url).await.unwrap_err();
        match err {
            PipelineError::Fetch { url: failed, .. } => assert!(failed.contains("/gone")),
            other => panic!("expected Fetch error, got {other:?}"),
        }
    }
}
