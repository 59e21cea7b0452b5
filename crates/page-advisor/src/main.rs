mod audit;
mod config;
mod corpus;
mod docs;
mod error;
mod generate;
mod interact;
mod markdown;
mod model;
mod pipeline;
mod rank;
mod render;
mod score;

use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use advisor_common::openai::{OpenAiClient, OpenAiClientConfig};
use anyhow::Context;
use clap::Parser;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use audit::{AuditEngine, ChromeLauncher, LighthouseCli, ReportFileAudit};
use config::Config;
use docs::HttpDocumentLoader;
use generate::RecommendationGenerator;
use interact::{DialoguerChooser, Progress};
use pipeline::{Collaborators, CorpusSource, Outcome, Pipeline, PipelineInput, PipelineOptions};

const DOCUMENTATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Audit a web page and get code-aware recommendations for its worst issue.
#[derive(Debug, Parser)]
#[command(name = "page-advisor", version, about)]
struct Cli {
    /// Page to audit (http or https).
    url: Option<String>,

    /// Local source directory to include as context.
    codebase: Option<PathBuf>,

    /// Use a saved Lighthouse JSON report instead of running a live audit.
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,

    /// Use a prebuilt corpus file instead of walking CODEBASE.
    #[arg(long, value_name = "FILE", conflicts_with = "codebase")]
    corpus_file: Option<PathBuf>,

    /// Disable spinners.
    #[arg(long)]
    no_progress: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr so they never interleave with the rendered report
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(Outcome::Rendered { issue_id }) => {
            info!(issue = %issue_id, "recommendations rendered");
            ExitCode::SUCCESS
        }
        Ok(Outcome::NoIssues) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "page-advisor failed");
            eprintln!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<Outcome> {
    // A bad URL is reported before any credential or backend setup can fail
    let url = pipeline::validate_url(cli.url.as_deref())?;

    let config = Config::from_env()?;
    let client_config = OpenAiClientConfig::from_env()?;
    info!(
        model = %client_config.model,
        base_url = %client_config.base_url,
        chrome = %config.chrome_path,
        "configuration loaded"
    );

    let backend = Arc::new(OpenAiClient::new(client_config)?);

    let audit: Box<dyn AuditEngine> = match cli.report {
        Some(path) => Box::new(ReportFileAudit::new(path)),
        None => Box::new(LighthouseCli::new(config.lighthouse_path.clone())),
    };

    let corpus = match (cli.corpus_file, cli.codebase) {
        (Some(path), _) => {
            let corpus = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("failed to read corpus file {}", path.display()))?;
            CorpusSource::Provided(corpus)
        }
        (None, Some(dir)) => CorpusSource::Directory(dir),
        (None, None) => CorpusSource::None,
    };

    let interactive = std::io::stdout().is_terminal();
    let collaborators = Collaborators {
        audit,
        launcher: Box::new(ChromeLauncher::new(config.chrome_path.clone())),
        chooser: Box::new(DialoguerChooser),
        loader: Box::new(HttpDocumentLoader::new(DOCUMENTATION_TIMEOUT)?),
        generator: RecommendationGenerator::new(backend),
    };
    let options = PipelineOptions {
        corpus_limits: config.corpus,
        progress: Progress::new(interactive && !cli.no_progress),
        clear_screen: interactive,
        render_width: None,
    };

    let mut pipeline = Pipeline::new(collaborators, options);
    let input = PipelineInput {
        url: Some(url),
        corpus,
    };
    let mut stdout = std::io::stdout();
    let outcome = pipeline.run(input, &mut stdout).await;
    debug!(stage = %pipeline.stage(), "pipeline finished");
    Ok(outcome?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_url_and_codebase() {
        let cli = Cli::try_parse_from(["page-advisor", "https://example.com", "./site"]).unwrap();
        assert_eq!(cli.url.as_deref(), Some("https://example.com"));
        assert_eq!(cli.codebase, Some(PathBuf::from("./site")));
        assert!(cli.report.is_none());
        assert!(!cli.no_progress);
    }

    #[test]
    fn cli_url_is_optional_at_parse_time() {
        let cli = Cli::try_parse_from(["page-advisor"]).unwrap();
        assert!(cli.url.is_none());
        assert!(cli.codebase.is_none());
    }

    #[tokio::test]
    async fn missing_url_is_reported_before_credentials() {
        std::env::set_var("OPENAI_API_KEY_FILE", "/nonexistent/page-advisor/key");
        let cli = Cli::try_parse_from(["page-advisor"]).unwrap();
        let err = run(cli).await.unwrap_err();
        std::env::remove_var("OPENAI_API_KEY_FILE");

        let app_err = err.downcast_ref::<error::AppError>().unwrap();
        assert!(matches!(app_err, error::AppError::InvalidInput(_)));
        assert!(err.to_string().starts_with("Please enter a valid link"));
    }

    #[test]
    fn corpus_file_conflicts_with_codebase() {
        let parsed = Cli::try_parse_from([
            "page-advisor",
            "https://example.com",
            "./site",
            "--corpus-file",
            "corpus.txt",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn report_flag_is_accepted() {
        let cli = Cli::try_parse_from([
            "page-advisor",
            "https://example.com",
            "--report",
            "report.json",
            "--no-progress",
        ])
        .unwrap();
        assert_eq!(cli.report, Some(PathBuf::from("report.json")));
        assert!(cli.no_progress);
    }
}
