//! Text generation facade
//!
//! Composes the retrying primary client and the fallback client into one
//! "generate" capability. Blocking and streaming calls share the same
//! failover combinator:
//!
//! 1. Primary (with its own retry/backoff)
//! 2. Fallback, only if [`TextBackend::is_configured`]
//! 3. A user-facing message selected by error kind
//!
//! `try_*` methods return structured [`GenerationError`]s; `respond` and
//! `respond_stream` never fail and substitute the degraded-service text.

use crate::llm::gemini_provider::GeminiProvider;
use crate::llm::openrouter_provider::OpenRouterProvider;
use crate::llm::provider::TextBackend;
use crate::llm::retry::{RetryPolicy, RetryingClient};
use crate::llm::stream::{mark_truncation, peek_first, prepend};
use crate::llm::types::{
    FallbackConfig, GenerationError, GenerationRequest, GenerationSettings, LlmError,
    PrimaryConfig, RetryConfig, TextStream,
};
use futures::stream::{self, BoxStream};
use futures::{StreamExt, future};
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info, warn};

pub struct TextGenerator {
    primary: Arc<dyn TextBackend>,
    fallback: Option<Arc<dyn TextBackend>>,
    settings: GenerationSettings,
    request_timeout: std::time::Duration,
}

impl TextGenerator {
    /// `primary` is used as given; wrap it in a [`RetryingClient`] to get retries.
    pub fn new(
        primary: Arc<dyn TextBackend>,
        fallback: Option<Arc<dyn TextBackend>>,
        settings: GenerationSettings,
    ) -> Self {
        Self {
            primary,
            fallback,
            settings,
            request_timeout: crate::env::defaults::PRIMARY_REQUEST_TIMEOUT,
        }
    }

    /// Build the production chain: Gemini behind a retrying client, then OpenRouter.
    pub fn from_config(
        primary: &PrimaryConfig,
        fallback: &FallbackConfig,
        retry: &RetryConfig,
        settings: GenerationSettings,
    ) -> Self {
        let policy = RetryPolicy::new(retry, primary.request_timeout());
        let gemini: Arc<dyn TextBackend> = Arc::new(GeminiProvider::new(primary.clone()));
        let primary_client: Arc<dyn TextBackend> = Arc::new(RetryingClient::new(gemini, policy));
        let openrouter: Arc<dyn TextBackend> =
            Arc::new(OpenRouterProvider::new(fallback.clone()));

        let mut generator = Self::new(primary_client, Some(openrouter), settings);
        generator.request_timeout = primary.request_timeout();
        generator
    }

    pub fn primary_configured(&self) -> bool {
        self.primary.is_configured()
    }

    pub fn has_fallback(&self) -> bool {
        self.fallback
            .as_ref()
            .is_some_and(|fallback| fallback.is_configured())
    }

    fn request(&self, system_prompt: &str, user_query: &str) -> GenerationRequest {
        GenerationRequest::new(system_prompt, user_query)
            .with_max_tokens(self.settings.max_tokens)
            .with_temperature(self.settings.temperature)
            .with_timeout(self.request_timeout)
    }

    /// Primary first, then the fallback if it is configured.
    async fn with_failover<T, F, Fut>(&self, mut call: F) -> Result<T, GenerationError>
    where
        F: FnMut(Arc<dyn TextBackend>) -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        let primary_error = match call(Arc::clone(&self.primary)).await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        let Some(fallback) = self
            .fallback
            .as_ref()
            .filter(|fallback| fallback.is_configured())
        else {
            error!(
                "{} failed and no fallback is configured: {}",
                self.primary.provider_name(),
                primary_error
            );
            return Err(GenerationError::PrimaryFailed {
                primary: primary_error,
            });
        };

        warn!(
            "{} failed ({}), switching to {}",
            self.primary.provider_name(),
            primary_error,
            fallback.provider_name()
        );

        match call(Arc::clone(fallback)).await {
            Ok(value) => {
                info!("{} succeeded after primary failure", fallback.provider_name());
                Ok(value)
            }
            Err(fallback_error) => {
                error!(
                    "All providers failed. primary: {}; fallback: {}",
                    primary_error, fallback_error
                );
                Err(GenerationError::UpstreamExhausted {
                    primary: primary_error,
                    fallback: fallback_error,
                })
            }
        }
    }

    pub async fn try_respond(
        &self,
        system_prompt: &str,
        user_query: &str,
    ) -> Result<String, GenerationError> {
        let request = self.request(system_prompt, user_query);
        self.with_failover(|backend| {
            let request = request.clone();
            async move { backend.generate(&request).await }
        })
        .await
    }

    /// Opens a stream on the first provider that yields a chunk. Failures after
    /// that point end the stream with [`TRUNCATION_MARKER`](crate::llm::TRUNCATION_MARKER).
    pub async fn try_respond_stream(
        &self,
        system_prompt: &str,
        user_query: &str,
    ) -> Result<BoxStream<'static, String>, GenerationError> {
        let request = self.request(system_prompt, user_query);
        self.with_failover(|backend| {
            let request = request.clone();
            async move {
                let stream: TextStream = backend.generate_stream(&request).await?;
                match peek_first(stream).await? {
                    Some((first, rest)) => Ok(mark_truncation(
                        prepend(first, rest),
                        backend.provider_name().to_string(),
                    )),
                    None => Err(LlmError::EmptyResponse(backend.provider_name().to_string())),
                }
            }
        })
        .await
    }

    /// Never fails: provider failures become a user-facing message.
    pub async fn respond(&self, system_prompt: &str, user_query: &str) -> String {
        match self.try_respond(system_prompt, user_query).await {
            Ok(text) => text,
            Err(error) => error.user_message().to_string(),
        }
    }

    /// Never fails: when every provider fails, yields one terminal chunk with
    /// the degraded-service message.
    pub async fn respond_stream(
        &self,
        system_prompt: &str,
        user_query: &str,
    ) -> BoxStream<'static, String> {
        match self.try_respond_stream(system_prompt, user_query).await {
            Ok(stream) => stream,
            Err(error) => stream::once(future::ready(error.user_message().to_string())).boxed(),
        }
    }
}
