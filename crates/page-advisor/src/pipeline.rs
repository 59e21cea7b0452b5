//! Audit-issue-to-recommendation pipeline.
//!
//! Stages run strictly in sequence:
//! validate → audit → print scores → rank → select → resolve docs → fetch docs →
//! gather local corpus → generate → render.
//!
//! The browser needed by the audit is started just before the audit and killed right after
//! it, whether the audit succeeded or not. Missing documentation pages and an unreadable
//! corpus directory degrade to empty context; every other failure stops the run.

use std::fmt;
use std::io::Write;
use std::path::PathBuf;

use crossterm::cursor::MoveTo;
use crossterm::execute;
use crossterm::terminal::{Clear, ClearType};
use regex::Regex;
use tracing::{debug, error, info, warn};

use crate::audit::{AuditEngine, AuditOptions, BrowserLauncher, DEFAULT_BROWSER_FLAGS};
use crate::config::CorpusLimits;
use crate::corpus::collect_corpus;
use crate::docs::{fetch_documentation, resolve_documentation_link, DocumentLoader};
use crate::error::AppError;
use crate::generate::RecommendationGenerator;
use crate::interact::{Choice, IssueChooser, Progress};
use crate::model::AuditReport;
use crate::rank::{rank_issues, RankedIssue};
use crate::render::render_recommendations;
use crate::score::{category_line, CATEGORY_LINES};

pub const SELECT_PROMPT: &str = "Select a part of the report to investigate:";
pub const NO_ISSUES_NOTICE: &str = "No issues to investigate: every applicable audit passed.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    ValidatingInput,
    RunningAudit,
    Scoring,
    Ranking,
    AwaitingSelection,
    ResolvingDocs,
    FetchingDocs,
    GatheringLocalCorpus,
    Generating,
    Rendering,
    Done,
    Error,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Idle => "idle",
            Stage::ValidatingInput => "validating-input",
            Stage::RunningAudit => "running-audit",
            Stage::Scoring => "scoring",
            Stage::Ranking => "ranking",
            Stage::AwaitingSelection => "awaiting-selection",
            Stage::ResolvingDocs => "resolving-docs",
            Stage::FetchingDocs => "fetching-docs",
            Stage::GatheringLocalCorpus => "gathering-local-corpus",
            Stage::Generating => "generating",
            Stage::Rendering => "rendering",
            Stage::Done => "done",
            Stage::Error => "error",
        };
        f.write_str(name)
    }
}

/// Where the local corpus comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CorpusSource {
    /// No corpus; the prompt gets an empty codebase.
    #[default]
    None,
    /// Walk this directory.
    Directory(PathBuf),
    /// Use an already built corpus string as is.
    Provided(String),
}

#[derive(Debug, Clone, Default)]
pub struct PipelineInput {
    pub url: Option<String>,
    pub corpus: CorpusSource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Recommendations for the chosen issue were written.
    Rendered { issue_id: String },
    /// The report had nothing below a perfect score.
    NoIssues,
}

/// External systems the pipeline drives.
pub struct Collaborators {
    pub audit: Box<dyn AuditEngine>,
    pub launcher: Box<dyn BrowserLauncher>,
    pub chooser: Box<dyn IssueChooser>,
    pub loader: Box<dyn DocumentLoader>,
    pub generator: RecommendationGenerator,
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub corpus_limits: CorpusLimits,
    pub progress: Progress,
    /// Clear the terminal once the input is accepted.
    pub clear_screen: bool,
    /// Render width in columns; the terminal width when `None`.
    pub render_width: Option<usize>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            corpus_limits: CorpusLimits::default(),
            progress: Progress::hidden(),
            clear_screen: false,
            render_width: None,
        }
    }
}

/// Check that `input` is an absolute http(s) URL with a dotted host name or IPv4 address.
pub fn is_valid_url(input: &str) -> bool {
    let pattern = Regex::new(concat!(
        r"(?i)^https?://",
        r"((([a-z\d]([a-z\d-]*[a-z\d])*)\.)+[a-z]{2,}|",
        r"((\d{1,3}\.){3}\d{1,3}))",
        r"(:\d+)?(/[-a-z\d%_.~+]*)*",
        r"(\?[;&a-z\d%_.~+=-]*)?",
        r"(#[-a-z\d_]*)?$",
    ))
    .expect("valid regex");
    pattern.is_match(input)
}

/// Validate the target URL argument.
pub fn validate_url(input: Option<&str>) -> Result<String, AppError> {
    let url = input
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::InvalidInput("no URL given".to_string()))?;
    if !is_valid_url(url) {
        return Err(AppError::InvalidInput(format!("not an http(s) URL: {url}")));
    }
    Ok(url.to_string())
}

pub struct Pipeline {
    collaborators: Collaborators,
    options: PipelineOptions,
    stage: Stage,
}

impl Pipeline {
    pub fn new(collaborators: Collaborators, options: PipelineOptions) -> Self {
        Self {
            collaborators,
            options,
            stage: Stage::Idle,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    fn enter(&mut self, stage: Stage) {
        debug!(from = %self.stage, to = %stage, "pipeline stage");
        self.stage = stage;
    }

    /// Run every stage, writing user-facing output to `out`.
    ///
    /// On failure the pipeline is left in `Stage::Error` and the error names the kind of
    /// failure; the stage it happened in is logged.
    pub async fn run<W: Write>(
        &mut self,
        input: PipelineInput,
        out: &mut W,
    ) -> Result<Outcome, AppError> {
        let result = self.run_stages(input, out).await;
        match &result {
            Ok(_) => self.enter(Stage::Done),
            Err(e) => {
                error!(stage = %self.stage, error = %e, "pipeline failed");
                self.stage = Stage::Error;
            }
        }
        result
    }

    async fn run_stages<W: Write>(
        &mut self,
        input: PipelineInput,
        out: &mut W,
    ) -> Result<Outcome, AppError> {
        self.enter(Stage::ValidatingInput);
        let url = validate_url(input.url.as_deref())?;
        if self.options.clear_screen {
            execute!(out, Clear(ClearType::All), MoveTo(0, 0))?;
        }

        self.enter(Stage::RunningAudit);
        let report = self.audit(&url).await?;

        self.enter(Stage::Scoring);
        print_scores(&report, out)?;

        self.enter(Stage::Ranking);
        let issues = rank_issues(&report);
        if issues.is_empty() {
            info!(url = %url, "no failing audits");
            writeln!(out, "{NO_ISSUES_NOTICE}")?;
            return Ok(Outcome::NoIssues);
        }

        self.enter(Stage::AwaitingSelection);
        let issue = self.select_issue(&issues).await?;
        writeln!(out)?;

        self.enter(Stage::ResolvingDocs);
        let link = resolve_documentation_link(&issue.description)?;
        info!(
            issue = %issue.id,
            title = %issue.title,
            link = %link,
            "documentation link resolved"
        );

        self.enter(Stage::FetchingDocs);
        let progress = self.options.progress;
        let fetched = progress
            .run(
                "Processing online documentation",
                "Online documentation processed",
                fetch_documentation(self.collaborators.loader.as_ref(), &link),
            )
            .await;
        let documentation = degrade(fetched)?;

        self.enter(Stage::GatheringLocalCorpus);
        let codebase = self.gather_corpus(input.corpus).await?;

        self.enter(Stage::Generating);
        let markdown = progress
            .run(
                "Crafting your report",
                "Report crafted",
                self.collaborators
                    .generator
                    .generate(&documentation, &issue.description, &codebase),
            )
            .await?;

        self.enter(Stage::Rendering);
        let rendered = render_recommendations(&markdown, self.options.render_width);
        writeln!(out, "{rendered}")?;
        out.flush()?;

        Ok(Outcome::Rendered { issue_id: issue.id })
    }

    /// Audit `url`, holding a browser only for the duration of the audit when the engine
    /// needs one.
    async fn audit(&self, url: &str) -> Result<AuditReport, AppError> {
        let progress = self.options.progress;
        let text = format!("Running Lighthouse scan on {url}");
        let mut options = AuditOptions::default();

        if !self.collaborators.audit.needs_browser() {
            return progress
                .run(&text, "Lighthouse scan completed", self.collaborators.audit.run(url, &options))
                .await;
        }

        let flags: Vec<String> = DEFAULT_BROWSER_FLAGS.iter().map(|f| f.to_string()).collect();
        let mut browser = progress
            .run(
                "Starting headless browser",
                "Headless browser started",
                self.collaborators.launcher.launch(&flags),
            )
            .await?;
        options.port = Some(browser.port());

        let report = progress
            .run(&text, "Lighthouse scan completed", self.collaborators.audit.run(url, &options))
            .await;
        browser.kill();
        report
    }

    async fn select_issue(&self, issues: &[RankedIssue]) -> Result<RankedIssue, AppError> {
        let choices: Vec<Choice> = issues
            .iter()
            .map(|issue| Choice {
                name: issue.label(),
                value: issue.id.clone(),
                description: issue.description.clone(),
            })
            .collect();

        let chosen = self
            .collaborators
            .chooser
            .select(SELECT_PROMPT, &choices)
            .await?;
        issues
            .iter()
            .find(|issue| issue.id == chosen)
            .cloned()
            .ok_or_else(|| AppError::Selection(format!("unknown issue: {chosen}")))
    }

    async fn gather_corpus(&self, source: CorpusSource) -> Result<String, AppError> {
        match source {
            CorpusSource::None => Ok(String::new()),
            CorpusSource::Provided(corpus) => {
                debug!(bytes = corpus.len(), "reusing provided corpus");
                Ok(corpus)
            }
            CorpusSource::Directory(path) if path.as_os_str().is_empty() => Ok(String::new()),
            CorpusSource::Directory(path) => {
                let collected = self
                    .options
                    .progress
                    .run(
                        "Processing local files",
                        "Local files processed",
                        collect_corpus(path, self.options.corpus_limits),
                    )
                    .await;
                degrade(collected)
            }
        }
    }
}

/// Replace a non-fatal failure with empty context.
fn degrade(result: Result<String, AppError>) -> Result<String, AppError> {
    match result {
        Err(e) if !e.is_fatal() => {
            warn!(error = %e, "continuing with empty context");
            Ok(String::new())
        }
        other => other,
    }
}

fn print_scores<W: Write>(report: &AuditReport, out: &mut W) -> Result<(), AppError> {
    writeln!(out)?;
    for (category, label) in CATEGORY_LINES {
        writeln!(out, "{}", category_line(label, report.category_score(category)))?;
    }
    writeln!(out)?;
    Ok(())
}
