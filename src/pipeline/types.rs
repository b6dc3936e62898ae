use crate::env::defaults;
use crate::llm::{ErrorKind, GenerationError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Topic as typed by the caller plus its normalized cache key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PracticalTopic {
    display: String,
    key: String,
}

impl PracticalTopic {
    pub fn new(raw: &str) -> Self {
        let display = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        let key = Self::normalize(&display);
        Self { display, key }
    }

    /// Trimmed, whitespace-collapsed and case-folded form. Idempotent.
    pub fn normalize(raw: &str) -> String {
        raw.split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn as_str(&self) -> &str {
        &self.display
    }

    pub fn is_empty(&self) -> bool {
        self.key.is_empty()
    }
}

impl fmt::Display for PracticalTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BundleStatus {
    Success,
    Error,
}

/// Everything generated for one topic. Built once per run and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PracticalBundle {
    pub topic: String,
    pub theory: Option<String>,
    pub brute_force_code: Option<String>,
    pub brute_force_explanation: Option<String>,
    pub efficient_code: Option<String>,
    pub efficient_explanation: Option<String>,
    pub optimization_applicable: bool,
    pub latex_report: Option<String>,
    pub status: BundleStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl PracticalBundle {
    /// Failed bundle carrying whatever partial output existed at the time.
    pub fn failed(
        topic: &str,
        error_message: impl Into<String>,
        theory: Option<String>,
        brute_force_code: Option<String>,
    ) -> Self {
        Self {
            topic: topic.to_string(),
            theory,
            brute_force_code,
            brute_force_explanation: None,
            efficient_code: None,
            efficient_explanation: None,
            optimization_applicable: false,
            latex_report: None,
            status: BundleStatus::Error,
            error_message: Some(error_message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == BundleStatus::Success
    }

    /// Optimized code when optimization applies, otherwise the base code
    pub fn final_code(&self) -> Option<&str> {
        if self.optimization_applicable {
            self.efficient_code.as_deref()
        } else {
            self.brute_force_code.as_deref()
        }
    }
}

/// Artifacts of a run that made it through every step
#[derive(Debug, Clone)]
pub struct PracticalArtifacts {
    pub theory: String,
    pub brute_force_code: String,
    pub brute_force_explanation: String,
    pub optimization: Option<(String, String)>,
    pub latex_report: String,
}

impl PracticalArtifacts {
    pub fn into_bundle(self, topic: &PracticalTopic) -> PracticalBundle {
        let optimization_applicable = self.optimization.is_some();
        let (efficient_code, efficient_explanation) = match self.optimization {
            Some((code, explanation)) => (Some(code), Some(explanation)),
            None => (None, None),
        };

        PracticalBundle {
            topic: topic.as_str().to_string(),
            theory: Some(self.theory),
            brute_force_code: Some(self.brute_force_code),
            brute_force_explanation: Some(self.brute_force_explanation),
            efficient_code,
            efficient_explanation,
            optimization_applicable,
            latex_report: Some(self.latex_report),
            status: BundleStatus::Success,
            error_message: None,
        }
    }
}

/// Named steps of a pipeline run, as reported in progress events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    Theory,
    BruteForceCode,
    BruteForceExplanation,
    EfficientCode,
    EfficientExplanation,
    LatexReport,
    Complete,
    Error,
}

impl PipelineStep {
    pub fn as_str(self) -> &'static str {
        match self {
            PipelineStep::Theory => "theory",
            PipelineStep::BruteForceCode => "brute_force_code",
            PipelineStep::BruteForceExplanation => "brute_force_explanation",
            PipelineStep::EfficientCode => "efficient_code",
            PipelineStep::EfficientExplanation => "efficient_explanation",
            PipelineStep::LatexReport => "latex_report",
            PipelineStep::Complete => "complete",
            PipelineStep::Error => "error",
        }
    }
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Processing,
    Complete,
    NotApplicable,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub topic: String,
    pub optimization_applicable: bool,
}

/// One step transition emitted by the streaming pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub step: PipelineStep,
    pub status: EventStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<RunSummary>,
}

impl ProgressEvent {
    fn new(step: PipelineStep, status: EventStatus) -> Self {
        Self {
            step,
            status,
            content: None,
            message: None,
            summary: None,
        }
    }

    pub fn processing(step: PipelineStep, message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::new(step, EventStatus::Processing)
        }
    }

    pub fn complete(step: PipelineStep, content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::new(step, EventStatus::Complete)
        }
    }

    pub fn not_applicable(step: PipelineStep, message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::new(step, EventStatus::NotApplicable)
        }
    }

    pub fn finished(summary: RunSummary) -> Self {
        Self {
            message: Some("All steps completed successfully!".to_string()),
            summary: Some(summary),
            ..Self::new(PipelineStep::Complete, EventStatus::Complete)
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::new(PipelineStep::Error, EventStatus::Error)
        }
    }

    /// True for the `complete` and `error` events that end a stream
    pub fn is_terminal(&self) -> bool {
        matches!(self.step, PipelineStep::Complete | PipelineStep::Error)
    }
}

/// Coordinator state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Queued,
    TheoryAndBaseCodeInFlight,
    Validating,
    ExplainingBase,
    DecidingOptimization,
    OptimizingAndExplaining,
    SkippingOptimization,
    BuildingReport,
    Done,
    Failed,
}

/// Per-run scratch space. Owned by a single `process` call.
#[derive(Debug)]
pub struct PipelineRunState {
    phase: RunPhase,
    pub theory: Option<String>,
    pub brute_force_code: Option<String>,
}

impl PipelineRunState {
    pub fn new() -> Self {
        Self {
            phase: RunPhase::Queued,
            theory: None,
            brute_force_code: None,
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn advance(&mut self, phase: RunPhase) {
        debug!("Pipeline phase {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }
}

impl Default for PipelineRunState {
    fn default() -> Self {
        Self::new()
    }
}

/// Validation thresholds and coordinator timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub join_timeout_secs: u64,
    pub min_theory_chars: usize,
    pub min_theory_words: usize,
    pub min_code_chars: usize,
    /// Re-run base code generation once with the theory as context
    pub refine_code_with_theory: bool,
}

impl PipelineConfig {
    pub fn join_timeout(&self) -> Duration {
        Duration::from_secs(self.join_timeout_secs)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            join_timeout_secs: defaults::JOIN_TIMEOUT.as_secs(),
            min_theory_chars: defaults::MIN_THEORY_CHARS,
            min_theory_words: defaults::MIN_THEORY_WORDS,
            min_code_chars: defaults::MIN_CODE_CHARS,
            refine_code_with_theory: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: defaults::CACHE_CAPACITY,
        }
    }
}

/// Failure taxonomy of a whole pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    RateLimited,
    Timeout,
    ServerError,
    ResourceExhausted,
    ValidationFailed,
    ThreadTimeout,
    UpstreamExhausted,
    Unknown,
}

/// Terminal errors of one pipeline run
#[derive(Debug, Clone, thiserror::Error)]
pub enum PipelineError {
    #[error("{step} failed validation: {reason}")]
    Validation { step: PipelineStep, reason: String },

    #[error("steps {steps:?} did not finish within {timeout:?}")]
    ThreadTimeout {
        steps: Vec<PipelineStep>,
        timeout: Duration,
    },

    #[error("{step} generation failed: {source}")]
    Upstream {
        step: PipelineStep,
        #[source]
        source: GenerationError,
    },

    #[error("{step} failed unexpectedly: {message}")]
    Unknown { step: PipelineStep, message: String },
}

pub const FAILURE_PREFIX: &str = "Failed to process practical. ";

impl PipelineError {
    pub fn upstream(step: PipelineStep) -> impl FnOnce(GenerationError) -> Self {
        move |source| PipelineError::Upstream { step, source }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            PipelineError::Validation { .. } => FailureKind::ValidationFailed,
            PipelineError::ThreadTimeout { .. } => FailureKind::ThreadTimeout,
            PipelineError::Unknown { .. } => FailureKind::Unknown,
            PipelineError::Upstream { source, .. } if source.is_exhausted() => {
                FailureKind::UpstreamExhausted
            }
            PipelineError::Upstream { source, .. } => match source.kind() {
                ErrorKind::RateLimited => FailureKind::RateLimited,
                ErrorKind::Timeout => FailureKind::Timeout,
                ErrorKind::ServerError => FailureKind::ServerError,
                ErrorKind::ResourceExhausted => FailureKind::ResourceExhausted,
                ErrorKind::Other => FailureKind::Unknown,
            },
        }
    }

    /// Sanitized text for the caller; raw error text is only logged.
    pub fn user_message(&self) -> String {
        let detail = match self.kind() {
            FailureKind::RateLimited => "API quota exceeded. Please try again later.",
            FailureKind::Timeout | FailureKind::ThreadTimeout => {
                "Request timed out. Please try again or use a simpler topic."
            }
            FailureKind::ValidationFailed => {
                "The generated content was incomplete. Please try again."
            }
            _ => "Please try again later.",
        };
        format!("{}{}", FAILURE_PREFIX, detail)
    }
}
