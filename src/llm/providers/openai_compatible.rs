use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;

use crate::config::{LlmConfig, ProviderEntry};
use crate::errors::{PilotError, PilotResult};
use crate::llm::provider::LlmProvider;
use crate::llm::sse_parser::SseAccumulator;
use crate::llm::types::{CallConfig, ChatMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Auth {
    Bearer,
    /// Azure OpenAI deployments take the key in an `api-key` header.
    ApiKeyHeader,
}

pub struct OpenAiCompatibleProvider {
    id: String,
    api_base: String,
    api_key: String,
    auth: Auth,
    call: CallConfig,
    timeout: Duration,
    client: reqwest::Client,
}

/// API key from `VMPILOT_<ID>_API_KEY`, else from config. Empty is missing.
fn resolve_api_key(
    id: &str,
    entry: &ProviderEntry,
    env: impl Fn(&str) -> Option<String>,
) -> PilotResult<String> {
    let var = format!("VMPILOT_{}_API_KEY", id.to_uppercase());
    env(&var)
        .or_else(|| entry.api_key.clone())
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| {
            PilotError::Config(format!(
                "no API key for provider '{id}': set {var} or llm.providers.{id}.api_key"
            ))
        })
}

impl OpenAiCompatibleProvider {
    /// Build the active provider. Missing credentials are a setup failure.
    pub fn from_config(llm: &LlmConfig) -> PilotResult<Self> {
        let (id, entry) = llm.active()?;
        let api_key = resolve_api_key(id, entry, |k| std::env::var(k).ok())?;
        Ok(Self::new(id, entry, api_key))
    }

    fn new(id: &str, entry: &ProviderEntry, api_key: String) -> Self {
        let auth = match entry.adapter.as_deref() {
            Some(a) if a.eq_ignore_ascii_case("azure") => Auth::ApiKeyHeader,
            _ => Auth::Bearer,
        };
        Self {
            id: id.to_string(),
            api_base: entry.api_base.clone(),
            api_key,
            auth,
            call: CallConfig {
                model: entry.model.clone(),
                temperature: entry.temperature,
                max_tokens: entry.max_tokens,
                stream: entry.stream,
            },
            timeout: Duration::from_secs(entry.timeout_secs),
            client: reqwest::Client::new(),
        }
    }

    fn request_body(&self, system_prompt: &str, user_prompt: &str) -> serde_json::Value {
        let messages = vec![ChatMessage::system(system_prompt), ChatMessage::user(user_prompt)];
        serde_json::json!({
            "model": self.call.model,
            "messages": messages,
            "temperature": self.call.temperature,
            "max_tokens": self.call.max_tokens,
            "stream": self.call.stream,
        })
    }

    async fn send(&self, body: serde_json::Value) -> PilotResult<String> {
        let request = self.client.post(&self.api_base).json(&body);
        let request = match self.auth {
            Auth::Bearer => request.bearer_auth(&self.api_key),
            Auth::ApiKeyHeader => request.header("api-key", &self.api_key),
        };
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let err_body = response.text().await.unwrap_or_default();
            return Err(PilotError::Model(format!("{status}: {err_body}")));
        }

        if self.call.stream {
            self.handle_stream(response).await
        } else {
            let json: serde_json::Value = response.json().await?;
            extract_content(&json)
        }
    }

    async fn handle_stream(&self, response: reqwest::Response) -> PilotResult<String> {
        let mut byte_stream = response.bytes_stream();
        let mut acc = SseAccumulator::default();
        while let Some(result) = byte_stream.next().await {
            let bytes = result?;
            if acc.feed(&bytes) {
                break;
            }
        }
        tracing::debug!(reasoning_len = acc.reasoning_len(), "LLM stream complete");
        Ok(acc.finish())
    }
}

fn extract_content(json: &serde_json::Value) -> PilotResult<String> {
    json["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| PilotError::Model(format!("response has no message content: {json}")))
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.id
    }

    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> PilotResult<String> {
        let body = self.request_body(system_prompt, user_prompt);
        tracing::debug!(
            provider = %self.id,
            model = %self.call.model,
            stream = self.call.stream,
            "sending LLM request"
        );
        tracing::debug!(context = %user_prompt, "LLM request context");

        let content = tokio::time::timeout(self.timeout, self.send(body))
            .await
            .map_err(|_| PilotError::ModelTimeout(self.timeout.as_secs()))??;

        tracing::info!(content_len = content.len(), "LLM response received");
        tracing::debug!(response = %content, "LLM response");
        Ok(content)
    }
}
