use std::sync::Arc;

use advisor_common::completion::{CompletionBackend, FragmentStream};
use futures::TryStreamExt;
use tracing::{debug, info};

use crate::error::AppError;

/// Build the single-turn prompt for one audit issue.
pub fn build_prompt(documentation: &str, issue_description: &str, codebase: &str) -> String {
    format!(
        "Using only the Lighthouse report section provided below, generate actionable \
         recommendations for a web developer to fix the reported problem. Use the context and \
         the codebase provided as your only knowledge bases. Provide exactly three distinct, \
         concrete solutions, formatted in simple Markdown. Include specific code \
         recommendations when applicable.\n\
         \nLighthouse Problem Description: \n{issue_description}\
         \nContext: {documentation}\
         \nCodebase: {codebase}"
    )
}

/// Concatenate streamed fragments in arrival order.
///
/// A stream that yields no text at all is `GenerationFailed`; a transport error while
/// streaming is reported as a backend error instead.
pub async fn collect_fragments(stream: FragmentStream) -> Result<String, AppError> {
    let text: String = stream
        .try_fold(String::new(), |mut acc, fragment| async move {
            acc.push_str(&fragment);
            Ok(acc)
        })
        .await?;

    if text.trim().is_empty() {
        return Err(AppError::GenerationFailed);
    }
    Ok(text)
}

/// Produces markdown recommendations through an injected completion backend.
#[derive(Clone)]
pub struct RecommendationGenerator {
    backend: Arc<dyn CompletionBackend>,
}

impl RecommendationGenerator {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self { backend }
    }

    pub async fn generate(
        &self,
        documentation: &str,
        issue_description: &str,
        codebase: &str,
    ) -> Result<String, AppError> {
        let prompt = build_prompt(documentation, issue_description, codebase);
        debug!(prompt_bytes = prompt.len(), "sending completion request");

        let stream = self.backend.generate_stream(&prompt).await?;
        let text = collect_fragments(stream).await?;
        info!(bytes = text.len(), "recommendations generated");
        Ok(text)
    }
}
