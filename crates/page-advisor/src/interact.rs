use std::future::Future;
use std::io::Write;
use std::time::Duration;

use async_trait::async_trait;
use dialoguer::console::{style, Term};
use dialoguer::theme::ColorfulTheme;
use dialoguer::Select;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::warn;

use crate::error::AppError;

/// One selectable entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    pub name: String,
    pub value: String,
    pub description: String,
}

#[async_trait]
pub trait IssueChooser: Send + Sync {
    /// Present `choices` and return the chosen `value`. Waits for the operator indefinitely.
    async fn select(&self, prompt: &str, choices: &[Choice]) -> Result<String, AppError>;
}

/// Arrow-key selection on the terminal.
pub struct DialoguerChooser;

#[async_trait]
impl IssueChooser for DialoguerChooser {
    async fn select(&self, prompt: &str, choices: &[Choice]) -> Result<String, AppError> {
        if choices.is_empty() {
            return Err(AppError::Selection("nothing to choose from".to_string()));
        }

        let prompt = prompt.to_string();
        let choices = choices.to_vec();
        tokio::task::spawn_blocking(move || {
            let names: Vec<&str> = choices.iter().map(|c| c.name.as_str()).collect();
            let index = Select::with_theme(&ColorfulTheme::default())
                .with_prompt(&prompt)
                .items(&names)
                .default(0)
                .interact_on_opt(&Term::stdout())
                .map_err(|e| AppError::Selection(e.to_string()))?
                .ok_or_else(|| AppError::Selection("selection cancelled".to_string()))?;

            let chosen = &choices[index];
            if let Err(e) = write_description(&mut Term::stdout(), &chosen.description) {
                warn!(error = %e, "failed to print issue description");
            }
            Ok(chosen.value.clone())
        })
        .await
        .map_err(|e| AppError::Selection(format!("selection task failed: {e}")))?
    }
}

/// Print a chosen entry's description dimmed on its own line. Empty descriptions print nothing.
fn write_description<W: Write>(out: &mut W, description: &str) -> std::io::Result<()> {
    if description.is_empty() {
        return Ok(());
    }
    writeln!(out, "{}", style(description).dim())
}

/// Spinner shown while a pipeline stage is in flight.
#[derive(Debug, Clone, Copy)]
pub struct Progress {
    enabled: bool,
}

impl Progress {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn hidden() -> Self {
        Self { enabled: false }
    }

    fn spinner(&self, text: &str) -> ProgressBar {
        if !self.enabled {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            bar.set_style(style);
        }
        bar.set_message(text.to_string());
        bar.enable_steady_tick(Duration::from_millis(80));
        bar
    }

    /// Await `fut` behind a spinner showing `text`, then `success_text` if it succeeds.
    pub async fn run<T, E, F>(&self, text: &str, success_text: &str, fut: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
    {
        let bar = self.spinner(text);
        let result = fut.await;
        match &result {
            Ok(_) => bar.finish_with_message(success_text.to_string()),
            Err(_) => bar.abandon_with_message(format!("{text} (failed)")),
        }
        result
    }
}
