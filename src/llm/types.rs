use crate::env::defaults;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Lazily produced text chunks from a streaming generation call
pub type TextStream = BoxStream<'static, Result<String, LlmError>>;

/// Single generation call against any backend. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub system_prompt: String,
    pub user_query: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
}

impl GenerationRequest {
    pub fn new(system_prompt: impl Into<String>, user_query: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_query: user_query.into(),
            max_tokens: defaults::MAX_TOKENS,
            temperature: defaults::TEMPERATURE,
            timeout: defaults::PRIMARY_REQUEST_TIMEOUT,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Temperature is clamped to `[0, 1]`.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature.clamp(0.0, 1.0);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Classification used to decide retries and user-facing messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    RateLimited,
    Timeout,
    ServerError,
    ResourceExhausted,
    Other,
}

impl ErrorKind {
    /// Only these kinds are worth another attempt against the same backend
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            ErrorKind::RateLimited | ErrorKind::Timeout | ErrorKind::ServerError
        )
    }
}

/// Errors raised by a single generation backend
#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),
    #[error("Request timed out: {0}")]
    Timeout(String),
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),
    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("Provider not configured: {0}")]
    NotConfigured(String),
    #[error("Empty response from {0}")]
    EmptyResponse(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl LlmError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LlmError::RateLimit(_) => ErrorKind::RateLimited,
            LlmError::Timeout(_) => ErrorKind::Timeout,
            LlmError::Server { .. } => ErrorKind::ServerError,
            LlmError::ResourceExhausted(_) => ErrorKind::ResourceExhausted,
            LlmError::Rejected { .. }
            | LlmError::NotConfigured(_)
            | LlmError::EmptyResponse(_)
            | LlmError::Network(_)
            | LlmError::InvalidResponse(_) => ErrorKind::Other,
        }
    }

    /// Classify a non-success HTTP response.
    pub fn from_status(status: u16, body: &str) -> Self {
        let message: String = body.chars().take(200).collect();
        let lowered = body.to_lowercase();

        if lowered.contains("out of memory") || lowered.contains("oom-kill") || status == 507 {
            return LlmError::ResourceExhausted(message);
        }

        match status {
            429 => LlmError::RateLimit(message),
            408 | 504 => LlmError::Timeout(message),
            500..=599 => LlmError::Server { status, message },
            _ => LlmError::Rejected { status, message },
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            LlmError::Timeout(error.to_string())
        } else if let Some(status) = error.status() {
            LlmError::from_status(status.as_u16(), &error.to_string())
        } else if error.is_decode() {
            LlmError::InvalidResponse(error.to_string())
        } else {
            LlmError::Network(error.to_string())
        }
    }
}

pub const QUOTA_MESSAGE: &str =
    "The AI service quota has been exceeded. Please try again in a few minutes.";
pub const TIMEOUT_MESSAGE: &str =
    "The AI service took too long to respond. Please try again with a shorter request.";
pub const GENERIC_MESSAGE: &str =
    "The AI service is currently unavailable. Please try again later.";
pub const DEGRADED_MESSAGE: &str =
    "All AI providers are currently unavailable. Please try again later.";

/// Terminal failure of the primary/fallback chain
#[derive(Debug, Clone, thiserror::Error)]
pub enum GenerationError {
    #[error("primary provider failed and no fallback is configured: {primary}")]
    PrimaryFailed { primary: LlmError },
    #[error("all providers failed (primary: {primary}; fallback: {fallback})")]
    UpstreamExhausted { primary: LlmError, fallback: LlmError },
}

impl GenerationError {
    /// Kind of the last error seen in the chain
    pub fn kind(&self) -> ErrorKind {
        match self {
            GenerationError::PrimaryFailed { primary } => primary.kind(),
            GenerationError::UpstreamExhausted { fallback, .. } => fallback.kind(),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, GenerationError::UpstreamExhausted { .. })
    }

    /// Text safe to show an end user in place of generated content
    pub fn user_message(&self) -> &'static str {
        match self {
            GenerationError::UpstreamExhausted { .. } => DEGRADED_MESSAGE,
            GenerationError::PrimaryFailed { primary } => match primary.kind() {
                ErrorKind::RateLimited => QUOTA_MESSAGE,
                ErrorKind::Timeout => TIMEOUT_MESSAGE,
                _ => GENERIC_MESSAGE,
            },
        }
    }
}

/// Parameters applied to every request built by the text generator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            max_tokens: defaults::MAX_TOKENS,
            temperature: defaults::TEMPERATURE,
        }
    }
}

/// Primary provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrimaryConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub request_timeout_secs: u64,
    /// Bound on a whole streamed response, which outlives a blocking request
    pub stream_timeout_secs: u64,
}

impl PrimaryConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn stream_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_timeout_secs)
    }
}

impl Default for PrimaryConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: defaults::PRIMARY_BASE_URL.to_string(),
            model: defaults::PRIMARY_MODEL.to_string(),
            request_timeout_secs: defaults::PRIMARY_REQUEST_TIMEOUT.as_secs(),
            stream_timeout_secs: defaults::PRIMARY_STREAM_TIMEOUT.as_secs(),
        }
    }
}

/// Fallback provider configuration with its ordered model candidates
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub base_url: String,
    pub models: Vec<String>,
    pub site_url: String,
    pub app_title: String,
    pub request_timeout_secs: u64,
    pub stream_timeout_secs: u64,
}

impl FallbackConfig {
    /// Parse a comma-separated candidate list, dropping blanks.
    pub fn parse_models(value: &str) -> Vec<String> {
        value
            .split(',')
            .map(str::trim)
            .filter(|model| !model.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn stream_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_timeout_secs)
    }
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: defaults::FALLBACK_BASE_URL.to_string(),
            models: Self::parse_models(defaults::FALLBACK_MODELS),
            site_url: defaults::SITE_URL.to_string(),
            app_title: defaults::APP_TITLE.to_string(),
            request_timeout_secs: defaults::FALLBACK_REQUEST_TIMEOUT.as_secs(),
            stream_timeout_secs: defaults::FALLBACK_STREAM_TIMEOUT.as_secs(),
        }
    }
}

/// Retry behaviour of the primary client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub jitter: bool,
    /// Cap on all attempts plus backoff; no new attempt starts past it
    pub total_budget_ms: u64,
}

impl RetryConfig {
    pub fn total_budget(&self) -> Duration {
        Duration::from_millis(self.total_budget_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: defaults::MAX_ATTEMPTS,
            backoff_base_ms: defaults::BACKOFF_BASE.as_millis() as u64,
            backoff_max_ms: defaults::BACKOFF_MAX.as_millis() as u64,
            jitter: true,
            total_budget_ms: defaults::PRIMARY_RETRY_BUDGET.as_millis() as u64,
        }
    }
}

/// Running error statistics for one retrying client
#[derive(Debug, Clone, Default)]
pub struct RetryStatistics {
    pub total_attempts: u64,
    pub consecutive_failures: u32,
    pub total_errors: u64,
    pub last_error_time: Option<DateTime<Utc>>,
    pub error_kinds: HashMap<ErrorKind, u32>,
}

