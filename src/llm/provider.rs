use crate::llm::types::{GenerationRequest, LlmError, TextStream};
use async_trait::async_trait;

/// Generation backend shared by the primary client, the fallback client and
/// the retrying wrapper, so both call shapes go through one failover path.
#[async_trait]
pub trait TextBackend: Send + Sync {
    /// Get provider name/identifier
    fn provider_name(&self) -> &str;

    /// Whether credentials and models are present. Unconfigured backends are
    /// skipped by the failover chain.
    fn is_configured(&self) -> bool {
        true
    }

    /// Generate the full completion text. Empty output is an error.
    async fn generate(&self, request: &GenerationRequest) -> Result<String, LlmError>;

    /// Open a streaming completion.
    ///
    /// Implementations that fail before producing the first chunk must return
    /// `Err` (or an empty stream) so the caller can still fail over.
    async fn generate_stream(&self, request: &GenerationRequest) -> Result<TextStream, LlmError>;
}
