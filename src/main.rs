//! Command-line entry point: parse arguments, wire the collaborators, run one
//! report, write it out.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use dossier::config::Settings;
use dossier::documents::{ReportTemplate, ReportWriter, read_links};
use dossier::embeddings::HttpEmbeddingProvider;
use dossier::ingestion::ContentFetcher;
use dossier::llm::ConverseClient;
use dossier::stores::sqlite::SqliteVectorStore;
use dossier::tokenizer::TiktokenCounter;
use dossier::{EntityKind, PipelineError, ReportPipeline};

const USAGE: &str = "\
Usage: dossier --config <settings.yaml> --template <template.md> --input-links <links.txt>
               (--company-name <name> | --individual-name <name>) [--output-dir <dir>]

Exactly one of --company-name and --individual-name must carry a real name;
the literal value `none` marks the other as unset.";

#[derive(Debug)]
struct CliArgs {
    config: PathBuf,
    template: PathBuf,
    input_links: PathBuf,
    entity_name: String,
    entity_kind: EntityKind,
    output_dir: PathBuf,
}

fn parse_args(args: impl Iterator<Item = String>) -> Result<CliArgs, String> {
    let mut config = None;
    let mut template = None;
    let mut input_links = None;
    let mut company = None;
    let mut individual = None;
    let mut output_dir = PathBuf::from("reports");

    let mut args = args;
    while let Some(flag) = args.next() {
        let mut value = |name: &str| {
            args.next()
                .ok_or_else(|| format!("missing value for {name}"))
        };
        match flag.as_str() {
            "--config" => config = Some(PathBuf::from(value("--config")?)),
            "--template" => template = Some(PathBuf::from(value("--template")?)),
            "--input-links" => input_links = Some(PathBuf::from(value("--input-links")?)),
            "--company-name" => company = Some(value("--company-name")?),
            "--individual-name" => individual = Some(value("--individual-name")?),
            "--output-dir" => output_dir = PathBuf::from(value("--output-dir")?),
            other => return Err(format!("unknown argument: {other}")),
        }
    }

    // `none` is the explicit unset marker, matching the template documents
    // that list both flags.
    let company = company.filter(|name| !name.eq_ignore_ascii_case("none"));
    let individual = individual.filter(|name| !name.eq_ignore_ascii_case("none"));
    let (entity_name, entity_kind) = match (company, individual) {
        (Some(name), None) => (name, EntityKind::Company),
        (None, Some(name)) => (name, EntityKind::Individual),
        (Some(_), Some(_)) => {
            return Err("pass a real name for only one of --company-name and \
                 --individual-name, the other must be `none`"
                .into());
        }
        (None, None) => {
            return Err("one of --company-name and --individual-name must carry a real name".into());
        }
    };

    Ok(CliArgs {
        config: config.ok_or("missing required --config")?,
        template: template.ok_or("missing required --template")?,
        input_links: input_links.ok_or("missing required --input-links")?,
        entity_name,
        entity_kind,
        output_dir,
    })
}

async fn run(args: CliArgs) -> Result<(), PipelineError> {
    let settings = Settings::from_yaml_file(&args.config).await?;
    let urls = read_links(&args.input_links).await?;
    let template = ReportTemplate::from_file(&args.template).await?;
    tracing::info!(
        entity = %args.entity_name,
        kind = %args.entity_kind,
        urls = urls.len(),
        sections = template.sections.len(),
        "starting report run"
    );

    let fetcher = ContentFetcher::new(&settings.fetch)?;
    let provider = Arc::new(HttpEmbeddingProvider::new(
        &settings.embedding,
        settings.store.dimension,
    )?);
    let store = Arc::new(SqliteVectorStore::new(
        &settings.store.database,
        settings.store.batch_size,
        settings.store.top_k,
    ));
    let model = Arc::new(ConverseClient::new(&settings.model)?);
    let counter = Arc::new(TiktokenCounter::new()?);

    let pipeline = ReportPipeline::new(settings, fetcher, provider, store, model, counter);

    let cancel = pipeline.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, finishing current step then stopping");
            cancel.cancel();
        }
    });

    let report = pipeline
        .run(&args.entity_name, args.entity_kind, &urls, &template)
        .await?;
    tracing::info!(
        sections = report.sections.len(),
        failed = report.failed_section_count(),
        skipped_urls = report.skipped_urls.len(),
        "run finished"
    );

    let path = ReportWriter::new(args.output_dir).write(&report).await?;
    println!("{}", path.display());
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(message) => {
            eprintln!("error: {message}\n\n{USAGE}");
            return ExitCode::from(2);
        }
    };

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "run failed");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Result<CliArgs, String> {
        parse_args(list.iter().map(|s| s.to_string()))
    }

    const BASE: [&str; 6] = [
        "--config",
        "settings.yaml",
        "--template",
        "template.md",
        "--input-links",
        "links.txt",
    ];

    fn with(extra: &[&str]) -> Result<CliArgs, String> {
        let mut list: Vec<&str> = BASE.to_vec();
        list.extend_from_slice(extra);
        args(&list)
    }

    #[test]
    fn company_target_parses() {
        let parsed = with(&["--company-name", "Acme Corp", "--individual-name", "none"]).unwrap();
        assert_eq!(parsed.entity_name, "Acme Corp");
        assert_eq!(parsed.entity_kind, EntityKind::Company);
        assert_eq!(parsed.output_dir, PathBuf::from("reports"));
    }

    #[test]
    fn individual_target_parses_without_the_none_marker() {
        let parsed = with(&["--individual-name", "Jane Doe"]).unwrap();
        assert_eq!(parsed.entity_kind, EntityKind::Individual);
    }

    #[test]
    fn two_real_names_are_rejected() {
        let err = with(&["--company-name", "Acme", "--individual-name", "Jane"]).unwrap_err();
        assert!(err.contains("only one"));
    }

    #[test]
    fn two_none_markers_are_rejected() {
        assert!(with(&["--company-name", "none", "--individual-name", "none"]).is_err());
    }

    #[test]
    fn missing_config_is_rejected() {
        let err = args(&["--company-name", "Acme"]).unwrap_err();
        assert!(err.contains("--config"));
    }

    #[test]
    fn unknown_flags_are_rejected() {
        assert!(with(&["--company-name", "Acme", "--frobnicate", "x"]).is_err());
    }
}
