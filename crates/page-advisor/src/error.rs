use std::path::PathBuf;

use advisor_common::error::CommonError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Please enter a valid link ({0})")]
    InvalidInput(String),

    #[error("audit failed: {0}")]
    AuditFailure(String),

    #[error("browser error: {0}")]
    Browser(String),

    #[error("selection failed: {0}")]
    Selection(String),

    #[error("issue description has no documentation link")]
    NoDocumentationLink,

    #[error("documentation fetch failed: {0}")]
    DocumentationFetch(String),

    #[error("documentation loader returned no pages for {0}")]
    DocumentationFetchEmpty(String),

    #[error("directory unreadable: {}", .0.display())]
    DirectoryUnreadable(PathBuf),

    #[error("completion backend returned no text")]
    GenerationFailed,

    #[error("completion backend error: {0}")]
    Backend(#[from] CommonError),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// Whether the pipeline must stop. Non-fatal kinds degrade to empty context.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            AppError::DirectoryUnreadable(_) | AppError::DocumentationFetchEmpty(_)
        )
    }
}
