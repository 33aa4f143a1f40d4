//! External document collaborators: the URL list, the report template, and
//! the report writer. Each has one narrow responsibility; layout and
//! formatting stay out of the pipeline.

use std::path::{Path, PathBuf};

use url::Url;

use crate::pipeline::{RunReport, SectionResult};
use crate::types::PipelineError;

/// One named template section with its guidance text and placeholder markers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TemplateSection {
    pub name: String,
    pub body: String,
}

/// Ordered list of named report sections, consumed read-only by prompt
/// assembly.
#[derive(Clone, Debug)]
pub struct ReportTemplate {
    pub sections: Vec<TemplateSection>,
}

impl ReportTemplate {
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let raw = tokio::fs::read_to_string(path.as_ref()).await?;
        Self::parse(&raw)
    }

    /// Parses a template: lines starting with `#` begin a named section, the
    /// lines until the next heading are its guidance body.
    pub fn parse(raw: &str) -> Result<Self, PipelineError> {
        let mut sections: Vec<TemplateSection> = Vec::new();

        for line in raw.lines() {
            let trimmed = line.trim();
            if let Some(heading) = trimmed.strip_prefix('#') {
                let name = heading.trim_start_matches('#').trim();
                if !name.is_empty() {
                    sections.push(TemplateSection {
                        name: name.to_string(),
                        body: String::new(),
                    });
                }
            } else if let Some(section) = sections.last_mut() {
                if !trimmed.is_empty() {
                    if !section.body.is_empty() {
                        section.body.push(' ');
                    }
                    section.body.push_str(trimmed);
                }
            }
        }

        if sections.is_empty() {
            return Err(PipelineError::InvalidDocument(
                "template contains no sections (expected '# Section Name' headings)".into(),
            ));
        }
        Ok(Self { sections })
    }
}

/// Reads the trusted URL list: any line containing `http` contributes the
/// substring from `http` to the next whitespace.
pub async fn read_links(path: impl AsRef<Path>) -> Result<Vec<Url>, PipelineError> {
    let raw = tokio::fs::read_to_string(path.as_ref()).await?;
    Ok(extract_urls(&raw))
}

/// Extracts well-formed HTTP(S) URLs from free text, one per line at most.
pub fn extract_urls(raw: &str) -> Vec<Url> {
    let mut urls = Vec::new();
    for line in raw.lines() {
        let Some(start) = line.find("http") else {
            continue;
        };
        let candidate = line[start..]
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .trim_end_matches(|c: char| matches!(c, '.' | ',' | ')' | ']'));
        match Url::parse(candidate) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => urls.push(url),
            _ => tracing::warn!(candidate, "skipping malformed URL in link document"),
        }
    }
    urls
}

/// Serializes the accumulated report, best-effort results included, to a
/// timestamped file in the output directory.
#[derive(Clone, Debug)]
pub struct ReportWriter {
    output_dir: PathBuf,
}

impl ReportWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub async fn write(&self, report: &RunReport) -> Result<PathBuf, PipelineError> {
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let stem: String = report
            .entity_name
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '_' })
            .collect();
        let path = self
            .output_dir
            .join(format!("{}_{timestamp}.md", stem.to_lowercase()));

        tokio::fs::create_dir_all(&self.output_dir).await?;
        tokio::fs::write(&path, render_report(report)).await?;
        tracing::info!(path = %path.display(), "report written");
        Ok(path)
    }
}

fn render_report(report: &RunReport) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "# Research report: {} ({})\n\n",
        report.entity_name, report.entity_kind
    ));

    for section in &report.sections {
        out.push_str(&format!("## {}\n\n", section.name));
        match &section.result {
            SectionResult::Generated(text) => {
                out.push_str(text.trim());
                out.push_str("\n\n");
            }
            SectionResult::Failed(reason) => {
                out.push_str(&format!("_Generation failed: {reason}_\n\n"));
            }
        }
    }

    out.push_str("## Run summary\n\n");
    if report.skipped_urls.is_empty() {
        out.push_str("All configured sources were ingested.\n");
    } else {
        out.push_str("Skipped sources:\n");
        for (url, reason) in &report.skipped_urls {
            out.push_str(&format!("- {url}: {reason}\n"));
        }
    }
    let failed: Vec<&str> = report
        .sections
        .iter()
        .filter(|s| matches!(s.result, SectionResult::Failed(_)))
        .map(|s| s.name.as_str())
        .collect();
    if !failed.is_empty() {
        out.push_str(&format!("Failed sections: {}\n", failed.join(", ")));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_parses_named_sections_in_order() {
        let raw = "# Overview\nGeneral background.\nAnd history.\n\n## Leadership\nKey people.\n";
        let template = ReportTemplate::parse(raw).unwrap();
        assert_eq!(template.sections.len(), 2);
        assert_eq!(template.sections[0].name, "Overview");
        assert_eq!(template.sections[0].body, "General background. And history.");
        assert_eq!(template.sections[1].name, "Leadership");
    }

    #[test]
    fn template_without_headings_is_rejected() {
        let err = ReportTemplate::parse("just some prose\n").unwrap_err();
        assert!(matches!(err, PipelineError::InvalidDocument(_)));
    }

    #[test]
    fn urls_are_extracted_from_surrounding_text() {
        let raw = "Trusted sources:\n\
                   - see https://example.com/about for background.\n\
                   - http://news.example.org/item?id=7\n\
                   - ftp://ignored.example.com/file\n\
                   - no link on this line\n";
        let urls = extract_urls(raw);
        assert_eq!(urls.len(), 2);
        assert_eq!(urls[0].as_str(), "https://example.com/about");
        assert_eq!(urls[1].as_str(), "http://news.example.org/item?id=7");
    }

    #[test]
    fn malformed_urls_are_skipped() {
        let urls = extract_urls("http://\nhttps://ok.example.com\n");
        assert_eq!(urls.len(), 1);
        assert_eq!(urls[0].host_str(), Some("ok.example.com"));
    }
}
