//! Error types shared by the advisor binaries.
//!
//! These errors represent failures in infrastructure components (the completion backend and
//! its credentials). Application-specific errors are defined in each binary crate and wrap
//! `CommonError` via `#[from]`.

#[derive(Debug, thiserror::Error)]
pub enum CommonError {
    #[error(transparent)]
    Completion(#[from] crate::openai::OpenAiClientError),

    #[error("credential error: {0}")]
    Credentials(String),

    #[error("config error: {0}")]
    Config(String),
}
