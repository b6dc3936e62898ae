//! Fallback generation backend for the OpenRouter chat-completions API.
//!
//! Holds an ordered list of candidate models and tries them left to right. A
//! candidate gets exactly one attempt; non-2xx responses, transport errors and
//! empty content all move on to the next model.

use crate::llm::provider::TextBackend;
use crate::llm::stream::{peek_first, prepend, sse_text_stream};
use crate::llm::types::{FallbackConfig, GenerationRequest, LlmError, TextStream};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, RequestBuilder};
use serde_json::json;
use std::time::Duration;
use tracing::{info, warn};

pub struct OpenRouterProvider {
    client: Client,
    config: FallbackConfig,
}

impl OpenRouterProvider {
    pub fn new(config: FallbackConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn models(&self) -> &[String] {
        &self.config.models
    }

    fn api_key(&self) -> Option<&str> {
        self.config.api_key.as_deref().filter(|key| !key.is_empty())
    }

    fn payload(model: &str, request: &GenerationRequest, stream: bool) -> serde_json::Value {
        json!({
            "model": model,
            "messages": [
                { "role": "system", "content": request.system_prompt },
                { "role": "user", "content": request.user_query }
            ],
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "stream": stream
        })
    }

    fn post(&self, api_key: &str, timeout: Duration) -> RequestBuilder {
        self.client
            .post(&self.config.base_url)
            .bearer_auth(api_key)
            .header("HTTP-Referer", &self.config.site_url)
            .header("X-Title", &self.config.app_title)
            .timeout(timeout)
    }

    /// `choices[0].message.content` of a blocking response
    pub fn extract_message(payload: &serde_json::Value) -> Option<String> {
        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
    }

    /// `choices[0].delta.content` of a streamed event
    pub fn extract_delta(payload: &serde_json::Value) -> Option<String> {
        payload["choices"][0]["delta"]["content"]
            .as_str()
            .map(str::to_string)
    }

    async fn complete_with(
        &self,
        api_key: &str,
        model: &str,
        request: &GenerationRequest,
    ) -> Result<String, LlmError> {
        let response = self
            .post(api_key, self.config.request_timeout())
            .json(&Self::payload(model, request, false))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|value| value["error"]["message"].as_str().map(str::to_string))
                .unwrap_or(body);
            return Err(LlmError::from_status(status.as_u16(), &message));
        }

        let payload: serde_json::Value = response.json().await?;
        match Self::extract_message(&payload) {
            Some(content) if !content.trim().is_empty() => Ok(content),
            _ => Err(LlmError::EmptyResponse(model.to_string())),
        }
    }

    async fn stream_with(
        &self,
        api_key: &str,
        model: &str,
        request: &GenerationRequest,
    ) -> Result<TextStream, LlmError> {
        let response = self
            .post(api_key, self.config.stream_timeout())
            .json(&Self::payload(model, request, true))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::from_status(status.as_u16(), &body));
        }

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(LlmError::from))
            .boxed();
        Ok(sse_text_stream(body, Self::extract_delta))
    }
}

#[async_trait]
impl TextBackend for OpenRouterProvider {
    fn provider_name(&self) -> &str {
        "openrouter"
    }

    fn is_configured(&self) -> bool {
        self.api_key().is_some() && !self.config.models.is_empty()
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, LlmError> {
        let api_key = self
            .api_key()
            .ok_or_else(|| LlmError::NotConfigured("fallback API key is not set".to_string()))?;

        let total = self.config.models.len();
        let mut last_error = None;

        for (index, model) in self.config.models.iter().enumerate() {
            info!("[OpenRouter] Attempt {}/{} with model: {}", index + 1, total, model);
            match self.complete_with(api_key, model, request).await {
                Ok(content) => {
                    info!("[OpenRouter] Success with model: {}", model);
                    return Ok(content);
                }
                Err(error) => {
                    warn!("[OpenRouter] Model {} failed: {}", model, error);
                    last_error = Some(error);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| LlmError::NotConfigured("no fallback models configured".to_string())))
    }

    async fn generate_stream(&self, request: &GenerationRequest) -> Result<TextStream, LlmError> {
        let api_key = self
            .api_key()
            .ok_or_else(|| LlmError::NotConfigured("fallback API key is not set".to_string()))?;

        let total = self.config.models.len();
        let mut last_error = None;

        for (index, model) in self.config.models.iter().enumerate() {
            info!(
                "[OpenRouter] Streaming attempt {}/{} with model: {}",
                index + 1,
                total,
                model
            );
            let opened = match self.stream_with(api_key, model, request).await {
                Ok(stream) => peek_first(stream).await,
                Err(error) => Err(error),
            };
            match opened {
                // Once a chunk is out, later failures surface as truncation downstream
                Ok(Some((first, rest))) => return Ok(prepend(first, rest)),
                Ok(None) => {
                    warn!("[OpenRouter] Model {} yielded no data, trying next", model);
                    last_error = Some(LlmError::EmptyResponse(model.clone()));
                }
                Err(error) => {
                    warn!("[OpenRouter] Error streaming {}: {}", model, error);
                    last_error = Some(error);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| LlmError::NotConfigured("no fallback models configured".to_string())))
    }
}
