use async_trait::async_trait;

use crate::errors::PilotResult;

/// Unified LLM provider trait. The decision engine only ever sends one
/// system prompt and one user prompt and reads back free text.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Returns the provider's identifier (matches config.toml key).
    fn name(&self) -> &str;

    /// Transport, auth and timeout failures are returned as errors; they
    /// cost the current decision attempt only.
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> PilotResult<String>;
}
