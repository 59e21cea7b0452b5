//! Text-completion seam used by recommendation generation.
//!
//! A backend turns one prompt into a lazy, finite stream of text fragments. The stream is not
//! restartable; callers fold it exactly once.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::CommonError;

/// Incremental text fragments in arrival order.
pub type FragmentStream = BoxStream<'static, Result<String, CommonError>>;

#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Send `prompt` as a single-turn request and stream back the generated text.
    async fn generate_stream(&self, prompt: &str) -> Result<FragmentStream, CommonError>;
}
