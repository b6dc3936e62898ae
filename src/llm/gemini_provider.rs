//! Primary generation backend speaking the Gemini `generateContent` API.
//!
//! Blocking calls post to `models/{model}:generateContent`, streaming calls to
//! `models/{model}:streamGenerateContent?alt=sse`. Both carry the system prompt
//! as `systemInstruction` and the user query as the single user turn.

use crate::llm::provider::TextBackend;
use crate::llm::stream::sse_text_stream;
use crate::llm::types::{GenerationRequest, LlmError, PrimaryConfig, TextStream};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, RequestBuilder};
use serde_json::json;
use tracing::debug;

pub struct GeminiProvider {
    client: Client,
    config: PrimaryConfig,
}

impl GeminiProvider {
    pub fn new(config: PrimaryConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn endpoint(&self, method: &str) -> String {
        format!(
            "{}/models/{}:{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.model,
            method
        )
    }

    fn api_key(&self) -> Result<&str, LlmError> {
        self.config
            .api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| LlmError::NotConfigured("primary API key is not set".to_string()))
    }

    /// Blocking call, bounded by the per-request timeout.
    pub(crate) fn generate_request(
        &self,
        request: &GenerationRequest,
    ) -> Result<RequestBuilder, LlmError> {
        let api_key = self.api_key()?;
        Ok(self
            .client
            .post(self.endpoint("generateContent"))
            .query(&[("key", api_key)])
            .timeout(request.timeout)
            .json(&Self::request_body(request)))
    }

    /// Streaming call, bounded by the stream timeout so long answers are not
    /// cut at the blocking deadline.
    pub(crate) fn stream_request(
        &self,
        request: &GenerationRequest,
    ) -> Result<RequestBuilder, LlmError> {
        let api_key = self.api_key()?;
        Ok(self
            .client
            .post(self.endpoint("streamGenerateContent"))
            .query(&[("alt", "sse"), ("key", api_key)])
            .timeout(self.config.stream_timeout())
            .json(&Self::request_body(request)))
    }

    fn request_body(request: &GenerationRequest) -> serde_json::Value {
        json!({
            "systemInstruction": {
                "parts": [{ "text": request.system_prompt }]
            },
            "contents": [
                {
                    "role": "user",
                    "parts": [{ "text": request.user_query }]
                }
            ],
            "generationConfig": {
                "maxOutputTokens": request.max_tokens,
                "temperature": request.temperature,
                "topP": 0.95,
                "topK": 40
            }
        })
    }

    /// Concatenate the text parts of the first candidate.
    ///
    /// ```json
    /// { "candidates": [ { "content": { "parts": [ { "text": "..." } ] } } ] }
    /// ```
    pub fn extract_text(payload: &serde_json::Value) -> Option<String> {
        let parts = payload["candidates"][0]["content"]["parts"].as_array()?;
        let text: String = parts
            .iter()
            .filter_map(|part| part["text"].as_str())
            .collect();
        Some(text)
    }
}

#[async_trait]
impl TextBackend for GeminiProvider {
    fn provider_name(&self) -> &str {
        "gemini"
    }

    fn is_configured(&self) -> bool {
        self.api_key().is_ok()
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, LlmError> {
        let builder = self.generate_request(request)?;
        debug!("Gemini request with model {}", self.config.model);

        let response = builder.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::from_status(status.as_u16(), &body));
        }

        let payload: serde_json::Value = response.json().await?;
        match Self::extract_text(&payload) {
            Some(text) if !text.trim().is_empty() => Ok(text),
            Some(_) => Err(LlmError::EmptyResponse(self.config.model.clone())),
            None => Err(LlmError::InvalidResponse(
                "Failed to extract content from Gemini response".to_string(),
            )),
        }
    }

    async fn generate_stream(&self, request: &GenerationRequest) -> Result<TextStream, LlmError> {
        let builder = self.stream_request(request)?;
        debug!("Gemini streaming request with model {}", self.config.model);

        let response = builder.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::from_status(status.as_u16(), &body));
        }

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(LlmError::from))
            .boxed();
        Ok(sse_text_stream(body, Self::extract_text))
    }
}
