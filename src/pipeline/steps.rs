use crate::llm::{GenerationError, TextGenerator};
use crate::pipeline::prompts;
use async_trait::async_trait;
use regex::Regex;
use std::sync::{Arc, LazyLock};

/// Exact reply the optimization prompt asks for when nothing can be improved
pub const NO_OPTIMIZATION_SENTINEL: &str = "NO_OPTIMIZATION";

/// Free-text refusals still recognised when a model ignores the sentinel
pub const REFUSAL_PHRASES: [&str; 2] = ["no significant optimization", "no optimization possible"];

static FENCE_OPEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^```[a-zA-Z]*\n?").expect("Failed to compile FENCE_OPEN regex pattern")
});
static FENCE_CLOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)\n?```$").expect("Failed to compile FENCE_CLOSE regex pattern"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptimizationProposal {
    Applicable(String),
    NotApplicable,
}

/// Inputs of the report step
#[derive(Debug, Clone)]
pub struct ReportInputs<'a> {
    pub topic: &'a str,
    pub theory: &'a str,
    /// Optimized code when applicable, otherwise the base code
    pub final_code: &'a str,
    /// Optimization explanation when applicable, otherwise the base explanation
    pub code_explanation: &'a str,
    pub optimization_notes: Option<&'a str>,
}

/// Independently invocable generation steps consumed by the coordinator
#[async_trait]
pub trait PracticalSteps: Send + Sync {
    async fn explain_theory(&self, topic: &str) -> Result<String, GenerationError>;

    /// `theory` is extra context when it is already available.
    async fn generate_base_code(
        &self,
        topic: &str,
        theory: Option<&str>,
    ) -> Result<String, GenerationError>;

    async fn explain_code(&self, topic: &str, code: &str) -> Result<String, GenerationError>;

    async fn propose_optimization(
        &self,
        topic: &str,
        code: &str,
    ) -> Result<OptimizationProposal, GenerationError>;

    async fn explain_optimizations(
        &self,
        topic: &str,
        base_code: &str,
        optimized_code: &str,
    ) -> Result<String, GenerationError>;

    async fn generate_report(&self, inputs: &ReportInputs<'_>) -> Result<String, GenerationError>;
}

/// Steps backed by the text generation facade
pub struct LlmSteps {
    generator: Arc<TextGenerator>,
}

impl LlmSteps {
    pub fn new(generator: Arc<TextGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl PracticalSteps for LlmSteps {
    async fn explain_theory(&self, topic: &str) -> Result<String, GenerationError> {
        self.generator
            .try_respond(prompts::THEORY_SYSTEM, &prompts::theory(topic))
            .await
    }

    async fn generate_base_code(
        &self,
        topic: &str,
        theory: Option<&str>,
    ) -> Result<String, GenerationError> {
        let raw = self
            .generator
            .try_respond(prompts::CODE_SYSTEM, &prompts::base_code(topic, theory))
            .await?;
        Ok(clean_code(&raw))
    }

    async fn explain_code(&self, topic: &str, code: &str) -> Result<String, GenerationError> {
        self.generator
            .try_respond(prompts::EXPLAIN_SYSTEM, &prompts::explain_code(topic, code))
            .await
    }

    async fn propose_optimization(
        &self,
        topic: &str,
        code: &str,
    ) -> Result<OptimizationProposal, GenerationError> {
        let raw = self
            .generator
            .try_respond(prompts::OPTIMIZE_SYSTEM, &prompts::optimization(topic, code))
            .await?;
        Ok(parse_optimization(&raw))
    }

    async fn explain_optimizations(
        &self,
        topic: &str,
        base_code: &str,
        optimized_code: &str,
    ) -> Result<String, GenerationError> {
        self.generator
            .try_respond(
                prompts::EXPLAIN_SYSTEM,
                &prompts::explain_optimizations(topic, base_code, optimized_code),
            )
            .await
    }

    async fn generate_report(&self, inputs: &ReportInputs<'_>) -> Result<String, GenerationError> {
        let prompt = prompts::report(
            inputs.topic,
            inputs.theory,
            inputs.final_code,
            inputs.code_explanation,
            inputs.optimization_notes.unwrap_or("N/A"),
        );
        self.generator
            .try_respond(prompts::REPORT_SYSTEM, &prompt)
            .await
    }
}

/// Strip markdown code fences and stray backticks from generated code.
pub fn clean_code(raw: &str) -> String {
    let cleaned = FENCE_OPEN.replace_all(raw.trim(), "");
    let cleaned = FENCE_CLOSE.replace_all(cleaned.trim(), "");
    cleaned.trim().trim_matches('`').trim().to_string()
}

/// Decide applicability from the optimization step's reply.
///
/// The sentinel is the primary signal; the refusal phrases are matched
/// case-insensitively for models that answer in prose instead.
pub fn parse_optimization(raw: &str) -> OptimizationProposal {
    let cleaned = clean_code(raw);
    if cleaned.is_empty() || cleaned.trim_matches('"') == NO_OPTIMIZATION_SENTINEL {
        return OptimizationProposal::NotApplicable;
    }

    let lowered = cleaned.to_lowercase();
    if lowered.starts_with(&NO_OPTIMIZATION_SENTINEL.to_lowercase())
        || REFUSAL_PHRASES.iter().any(|phrase| lowered.contains(phrase))
    {
        return OptimizationProposal::NotApplicable;
    }

    OptimizationProposal::Applicable(cleaned)
}
