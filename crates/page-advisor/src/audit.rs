//! Audit engine and headless browser collaborators.
//!
//! The audit itself is delegated to the `lighthouse` executable, which attaches to a browser
//! started here on a free remote-debugging port. A browser session is killed when the
//! session is dropped, so every exit path releases the child process.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::model::AuditReport;

/// Flags passed to the browser on launch.
pub const DEFAULT_BROWSER_FLAGS: &[&str] = &["--headless"];

const BROWSER_READY_TIMEOUT: Duration = Duration::from_secs(15);
const BROWSER_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A running browser the audit engine can attach to.
pub trait BrowserSession: Send {
    fn port(&self) -> u16;
    /// Terminate the browser. Calling it more than once is harmless.
    fn kill(&mut self);
}

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, flags: &[String]) -> Result<Box<dyn BrowserSession>, AppError>;
}

/// Options forwarded to the audit engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditOptions {
    /// Remote-debugging port of an already running browser.
    pub port: Option<u16>,
    pub form_factor: String,
    pub locale: String,
    pub disable_screen_emulation: bool,
}

impl Default for AuditOptions {
    fn default() -> Self {
        Self {
            port: None,
            form_factor: "desktop".to_string(),
            locale: "en-US".to_string(),
            disable_screen_emulation: true,
        }
    }
}

#[async_trait]
pub trait AuditEngine: Send + Sync {
    /// Whether `run` needs a browser port in its options.
    fn needs_browser(&self) -> bool {
        true
    }

    async fn run(&self, url: &str, options: &AuditOptions) -> Result<AuditReport, AppError>;
}

/// Starts a local Chrome/Chromium with a throwaway profile.
pub struct ChromeLauncher {
    program: String,
}

impl ChromeLauncher {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

struct ChromeSession {
    child: Child,
    port: u16,
    _profile: TempDir,
}

impl BrowserSession for ChromeSession {
    fn port(&self) -> u16 {
        self.port
    }

    fn kill(&mut self) {
        match self.child.try_wait() {
            Ok(Some(_)) => {}
            _ => {
                if let Err(e) = self.child.start_kill() {
                    warn!(error = %e, "failed to kill browser");
                } else {
                    debug!(port = self.port, "browser killed");
                }
            }
        }
    }
}

fn free_port() -> Result<u16, AppError> {
    let listener = std::net::TcpListener::bind(("127.0.0.1", 0))
        .map_err(|e| AppError::Browser(format!("failed to reserve a debugging port: {e}")))?;
    let port = listener
        .local_addr()
        .map_err(|e| AppError::Browser(format!("failed to reserve a debugging port: {e}")))?
        .port();
    Ok(port)
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self, flags: &[String]) -> Result<Box<dyn BrowserSession>, AppError> {
        let port = free_port()?;
        let profile = tempfile::Builder::new()
            .prefix("page-advisor-profile")
            .tempdir()?;

        let child = Command::new(&self.program)
            .args(flags)
            .arg(format!("--remote-debugging-port={port}"))
            .arg(format!("--user-data-dir={}", profile.path().display()))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AppError::Browser(format!("failed to start {}: {e}", self.program)))?;

        let mut session = ChromeSession {
            child,
            port,
            _profile: profile,
        };

        let deadline = tokio::time::Instant::now() + BROWSER_READY_TIMEOUT;
        loop {
            if tokio::net::TcpStream::connect(("127.0.0.1", port)).await.is_ok() {
                break;
            }
            if let Ok(Some(status)) = session.child.try_wait() {
                return Err(AppError::Browser(format!(
                    "{} exited before accepting connections ({status})",
                    self.program
                )));
            }
            if tokio::time::Instant::now() >= deadline {
                session.kill();
                return Err(AppError::Browser(format!(
                    "{} did not open port {port} within {}s",
                    self.program,
                    BROWSER_READY_TIMEOUT.as_secs()
                )));
            }
            tokio::time::sleep(BROWSER_POLL_INTERVAL).await;
        }

        info!(port, "browser ready");
        Ok(Box::new(session))
    }
}

/// Runs the `lighthouse` CLI and parses its JSON report from stdout.
pub struct LighthouseCli {
    program: String,
}

impl LighthouseCli {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Command-line arguments for auditing `url`.
    pub fn args(url: &str, options: &AuditOptions) -> Vec<String> {
        let mut args = vec![
            url.to_string(),
            "--output=json".to_string(),
            "--output-path=stdout".to_string(),
            "--quiet".to_string(),
            format!("--form-factor={}", options.form_factor),
            format!("--locale={}", options.locale),
        ];
        if options.disable_screen_emulation {
            args.push("--screenEmulation.disabled".to_string());
        }
        if let Some(port) = options.port {
            args.push(format!("--port={port}"));
        }
        args
    }
}

#[async_trait]
impl AuditEngine for LighthouseCli {
    async fn run(&self, url: &str, options: &AuditOptions) -> Result<AuditReport, AppError> {
        let output = Command::new(&self.program)
            .args(Self::args(url, options))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| AppError::AuditFailure(format!("failed to run {}: {e}", self.program)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::AuditFailure(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        AuditReport::from_json(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Reads a previously saved JSON report instead of auditing live.
pub struct ReportFileAudit {
    path: PathBuf,
}

impl ReportFileAudit {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl AuditEngine for ReportFileAudit {
    fn needs_browser(&self) -> bool {
        false
    }

    async fn run(&self, url: &str, _options: &AuditOptions) -> Result<AuditReport, AppError> {
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            AppError::AuditFailure(format!("failed to read {}: {e}", self.path.display()))
        })?;
        let report = AuditReport::from_json(&raw)?;
        if let Some(requested) = report.requested_url.as_deref() {
            if requested.trim_end_matches('/') != url.trim_end_matches('/') {
                warn!(requested, url, "saved report was produced for a different URL");
            }
        }
        Ok(report)
    }
}
