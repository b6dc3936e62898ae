use crate::llm::provider::TextBackend;
use crate::llm::stream::{peek_first, prepend};
use crate::llm::types::{
    ErrorKind, GenerationRequest, LlmError, RetryConfig, RetryStatistics, TextStream,
};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

/// When and how long to wait between attempts against the primary backend
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub jitter: bool,
    /// Hard per-attempt deadline
    pub request_timeout: Duration,
    /// Deadline across all attempts and backoff, so the caller's fallback
    /// still runs inside its own budget
    pub total_budget: Duration,
}

impl RetryPolicy {
    pub fn new(config: &RetryConfig, request_timeout: Duration) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff_base: Duration::from_millis(config.backoff_base_ms.max(1)),
            backoff_max: Duration::from_millis(config.backoff_max_ms.max(1)),
            jitter: config.jitter,
            request_timeout,
            total_budget: config.total_budget().max(Duration::from_millis(1)),
        }
    }

    pub fn should_retry(&self, error: &LlmError, attempt: u32) -> bool {
        attempt < self.max_attempts && error.kind().is_transient()
    }

    /// Exponential backoff, bounded by `backoff_max` and never zero.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(10);
        let delay = self
            .backoff_base
            .saturating_mul(2u32.pow(exponent))
            .min(self.backoff_max);

        let delay = if self.jitter {
            // ±10%
            let jitter = (rand::random::<f64>() - 0.5) * 0.2;
            Duration::from_millis(((delay.as_millis() as f64) * (1.0 + jitter)) as u64)
                .min(self.backoff_max)
        } else {
            delay
        };

        delay.max(Duration::from_millis(1))
    }
}

/// Primary client: retries transient failures with backoff, each attempt under
/// the per-attempt deadline and all of them under the total budget.
/// Non-transient failures surface immediately so the fallback provider can
/// take over.
pub struct RetryingClient {
    backend: Arc<dyn TextBackend>,
    policy: RetryPolicy,
    stats: Arc<Mutex<RetryStatistics>>,
}

impl RetryingClient {
    pub fn new(backend: Arc<dyn TextBackend>, policy: RetryPolicy) -> Self {
        Self {
            backend,
            policy,
            stats: Arc::new(Mutex::new(RetryStatistics::default())),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn statistics(&self) -> RetryStatistics {
        self.stats.lock().await.clone()
    }

    fn bounded(&self, request: &GenerationRequest) -> GenerationRequest {
        let timeout = request.timeout.min(self.policy.request_timeout);
        request.clone().with_timeout(timeout)
    }

    fn deadline_error(&self, timeout: Duration) -> LlmError {
        LlmError::Timeout(format!(
            "{} did not respond within {:?}",
            self.backend.provider_name(),
            timeout
        ))
    }

    /// Time allowed for the next attempt: the per-attempt deadline clipped to
    /// what is left of the total budget.
    fn attempt_timeout(&self, deadline: Instant) -> Option<Duration> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        (!remaining.is_zero()).then(|| remaining.min(self.policy.request_timeout))
    }

    async fn attempt_generate(
        &self,
        request: &GenerationRequest,
        timeout: Duration,
    ) -> Result<String, LlmError> {
        match tokio::time::timeout(timeout, self.backend.generate(request)).await {
            Ok(result) => result,
            Err(_) => Err(self.deadline_error(timeout)),
        }
    }

    async fn attempt_stream(
        &self,
        request: &GenerationRequest,
        timeout: Duration,
    ) -> Result<TextStream, LlmError> {
        let opened = tokio::time::timeout(timeout, async {
            let stream = self.backend.generate_stream(request).await?;
            peek_first(stream).await
        })
        .await;

        match opened {
            Ok(Ok(Some((first, rest)))) => Ok(prepend(first, rest)),
            Ok(Ok(None)) => Err(LlmError::EmptyResponse(
                self.backend.provider_name().to_string(),
            )),
            Ok(Err(error)) => Err(error),
            Err(_) => Err(self.deadline_error(timeout)),
        }
    }

    async fn record_success(&self) {
        let mut stats = self.stats.lock().await;
        stats.total_attempts += 1;
        stats.consecutive_failures = 0;
    }

    async fn record_error(&self, error: &LlmError) {
        let mut stats = self.stats.lock().await;
        stats.total_attempts += 1;
        stats.consecutive_failures += 1;
        stats.total_errors += 1;
        stats.last_error_time = Some(Utc::now());
        *stats.error_kinds.entry(error.kind()).or_insert(0) += 1;
    }

    async fn after_failure(&self, error: &LlmError, attempt: u32, deadline: Instant) -> bool {
        self.record_error(error).await;

        if !self.policy.should_retry(error, attempt) {
            if error.kind() == ErrorKind::Other {
                debug!(
                    "{} failed with non-retryable error: {}",
                    self.backend.provider_name(),
                    error
                );
            }
            return false;
        }

        let delay = self.policy.backoff_delay(attempt);
        if Instant::now() + delay >= deadline {
            warn!(
                "{} retry budget of {:?} spent after {} attempts: {}",
                self.backend.provider_name(),
                self.policy.total_budget,
                attempt,
                error
            );
            return false;
        }

        warn!(
            "{} attempt {}/{} failed ({:?}): {}. Retrying in {:?}",
            self.backend.provider_name(),
            attempt,
            self.policy.max_attempts,
            error.kind(),
            error,
            delay
        );
        tokio::time::sleep(delay).await;
        true
    }
}

#[async_trait]
impl TextBackend for RetryingClient {
    fn provider_name(&self) -> &str {
        self.backend.provider_name()
    }

    fn is_configured(&self) -> bool {
        self.backend.is_configured()
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, LlmError> {
        let request = self.bounded(request);
        let deadline = Instant::now() + self.policy.total_budget;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let Some(timeout) = self.attempt_timeout(deadline) else {
                return Err(self.deadline_error(self.policy.total_budget));
            };
            match self.attempt_generate(&request, timeout).await {
                Ok(text) => {
                    self.record_success().await;
                    return Ok(text);
                }
                Err(error) => {
                    if !self.after_failure(&error, attempt, deadline).await {
                        return Err(error);
                    }
                }
            }
        }
    }

    async fn generate_stream(&self, request: &GenerationRequest) -> Result<TextStream, LlmError> {
        let request = self.bounded(request);
        let deadline = Instant::now() + self.policy.total_budget;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let Some(timeout) = self.attempt_timeout(deadline) else {
                return Err(self.deadline_error(self.policy.total_budget));
            };
            match self.attempt_stream(&request, timeout).await {
                Ok(stream) => {
                    self.record_success().await;
                    return Ok(stream);
                }
                Err(error) => {
                    if !self.after_failure(&error, attempt, deadline).await {
                        return Err(error);
                    }
                }
            }
        }
    }
}
