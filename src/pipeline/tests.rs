use super::*;
use crate::llm::{GenerationError, LlmError};
use crate::storage::{MemoryStore, PracticalStore};
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const BASE_CODE: &str = "x = [1 2 3];\nh = [1 1];\ny = zeros(1, 4);\ndisp(y);";
const REFINED_CODE: &str = "% uses theory\nx = [1 2 3];\ny = conv(x, [1 1]);";
const OPTIMIZED_CODE: &str = "y = conv([1 2 3], [1 1]);";

fn long_theory() -> String {
    (0..200)
        .map(|i| format!("word{}", i))
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Default)]
struct Calls {
    theory: AtomicUsize,
    code: AtomicUsize,
    code_with_theory: AtomicUsize,
    explain: AtomicUsize,
    optimize: AtomicUsize,
    explain_optimizations: AtomicUsize,
    report: AtomicUsize,
}

struct MockSteps {
    theory: String,
    code: String,
    optimization: &'static str,
    theory_error: Option<GenerationError>,
    theory_delay: Option<Duration>,
    calls: Calls,
    last_report: Mutex<Option<(String, String, Option<String>)>>,
}

impl MockSteps {
    fn new() -> Self {
        Self {
            theory: long_theory(),
            code: BASE_CODE.to_string(),
            optimization: "No significant optimization possible for this implementation.",
            theory_error: None,
            theory_delay: None,
            calls: Calls::default(),
            last_report: Mutex::new(None),
        }
    }

    fn with_theory(mut self, theory: &str) -> Self {
        self.theory = theory.to_string();
        self
    }

    fn with_code(mut self, code: &str) -> Self {
        self.code = code.to_string();
        self
    }

    fn with_optimization(mut self, reply: &'static str) -> Self {
        self.optimization = reply;
        self
    }

    fn with_theory_error(mut self, error: GenerationError) -> Self {
        self.theory_error = Some(error);
        self
    }

    fn with_theory_delay(mut self, delay: Duration) -> Self {
        self.theory_delay = Some(delay);
        self
    }

    fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PracticalSteps for MockSteps {
    async fn explain_theory(&self, _topic: &str) -> Result<String, GenerationError> {
        self.calls.theory.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.theory_delay {
            tokio::time::sleep(delay).await;
        }
        match &self.theory_error {
            Some(error) => Err(error.clone()),
            None => Ok(self.theory.clone()),
        }
    }

    async fn generate_base_code(
        &self,
        _topic: &str,
        theory: Option<&str>,
    ) -> Result<String, GenerationError> {
        self.calls.code.fetch_add(1, Ordering::SeqCst);
        if theory.is_some() {
            self.calls.code_with_theory.fetch_add(1, Ordering::SeqCst);
            if self.code == BASE_CODE {
                return Ok(REFINED_CODE.to_string());
            }
        }
        Ok(self.code.clone())
    }

    async fn explain_code(&self, _topic: &str, _code: &str) -> Result<String, GenerationError> {
        self.calls.explain.fetch_add(1, Ordering::SeqCst);
        Ok("Base explanation".to_string())
    }

    async fn propose_optimization(
        &self,
        _topic: &str,
        _code: &str,
    ) -> Result<OptimizationProposal, GenerationError> {
        self.calls.optimize.fetch_add(1, Ordering::SeqCst);
        Ok(parse_optimization(self.optimization))
    }

    async fn explain_optimizations(
        &self,
        _topic: &str,
        _base_code: &str,
        _optimized_code: &str,
    ) -> Result<String, GenerationError> {
        self.calls.explain_optimizations.fetch_add(1, Ordering::SeqCst);
        Ok("Optimization notes".to_string())
    }

    async fn generate_report(&self, inputs: &ReportInputs<'_>) -> Result<String, GenerationError> {
        self.calls.report.fetch_add(1, Ordering::SeqCst);
        *self.last_report.lock().unwrap() = Some((
            inputs.final_code.to_string(),
            inputs.code_explanation.to_string(),
            inputs.optimization_notes.map(str::to_string),
        ));
        Ok("\\documentclass{article}\\begin{document}Report\\end{document}".to_string())
    }
}

fn pipeline(steps: Arc<MockSteps>) -> PracticalPipeline {
    PracticalPipeline::new(steps, PipelineConfig::default())
}

fn bundle(topic: &str) -> PracticalBundle {
    PracticalArtifacts {
        theory: long_theory(),
        brute_force_code: BASE_CODE.to_string(),
        brute_force_explanation: "explanation".to_string(),
        optimization: None,
        latex_report: "report".to_string(),
    }
    .into_bundle(&PracticalTopic::new(topic))
}

#[test]
fn test_topic_normalization_is_idempotent() {
    assert_eq!(
        PracticalTopic::normalize(" Foo "),
        PracticalTopic::normalize("foo")
    );
    let once = PracticalTopic::normalize("  Linear\t  CONVOLUTION \n");
    assert_eq!(once, "linear convolution");
    assert_eq!(PracticalTopic::normalize(&once), once);

    let topic = PracticalTopic::new("  Linear   Convolution ");
    assert_eq!(topic.as_str(), "Linear Convolution");
    assert_eq!(topic.key(), "linear convolution");
    assert!(PracticalTopic::new(" \t ").is_empty());
}

#[tokio::test]
async fn test_cache_round_trip_and_independence() {
    let cache = ResultCache::new(3);
    cache.put("Sampling", bundle("Sampling")).await;
    cache.put("FFT", bundle("FFT")).await;

    assert_eq!(cache.get(" sampling ").await, Some(bundle("Sampling")));
    assert_eq!(cache.get("fft").await, Some(bundle("FFT")));
    assert_eq!(cache.get("Modulation").await, None);

    let stats = cache.stats().await;
    assert_eq!(stats.hits, 2);
    assert_eq!(stats.misses, 1);
}

#[tokio::test]
async fn test_cache_evicts_oldest_insertion_not_least_recent() {
    let cache = ResultCache::new(2);
    assert_eq!(cache.put("first", bundle("first")).await, None);
    assert_eq!(cache.put("second", bundle("second")).await, None);

    // Reading does not refresh position
    assert!(cache.get("first").await.is_some());

    assert_eq!(
        cache.put("third", bundle("third")).await,
        Some("first".to_string())
    );
    assert_eq!(cache.len().await, 2);
    assert!(!cache.contains("first").await);
    assert_eq!(cache.keys().await, vec!["second", "third"]);
}

#[tokio::test]
async fn test_cache_replace_keeps_position() {
    let cache = ResultCache::new(2);
    cache.put("a", bundle("a")).await;
    cache.put("b", bundle("b")).await;
    assert_eq!(cache.put("A", bundle("a2")).await, None);

    assert_eq!(cache.get("a").await.map(|b| b.topic), Some("a2".to_string()));
    assert_eq!(cache.put("c", bundle("c")).await, Some("a".to_string()));
}

#[tokio::test]
async fn test_cache_with_zero_capacity_stores_nothing() {
    let cache = ResultCache::new(0);
    assert_eq!(cache.put("a", bundle("a")).await, None);
    assert!(cache.is_empty().await);
}

#[tokio::test]
async fn test_concurrent_puts_never_exceed_capacity() {
    let cache = Arc::new(ResultCache::new(5));
    let mut handles = Vec::new();
    for i in 0..40 {
        let cache = Arc::clone(&cache);
        handles.push(tokio::spawn(async move {
            let topic = format!("topic {}", i);
            cache.put(&topic, bundle(&topic)).await;
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let stats = cache.stats().await;
    assert_eq!(stats.entries, 5);
    assert_eq!(stats.evictions, 35);
    assert_eq!(cache.keys().await.len(), 5);
}

#[test]
fn test_code_fence_cleaning() {
    assert_eq!(clean_code("```matlab\nx = 1;\n```"), "x = 1;");
    assert_eq!(clean_code("```\ny = 2;\n```\n"), "y = 2;");
    assert_eq!(clean_code("`z = 3;`"), "z = 3;");
    assert_eq!(clean_code("plain = 4;"), "plain = 4;");
}

#[test]
fn test_optimization_reply_parsing() {
    assert_eq!(
        parse_optimization(NO_OPTIMIZATION_SENTINEL),
        OptimizationProposal::NotApplicable
    );
    assert_eq!(
        parse_optimization("No significant optimization possible for this implementation."),
        OptimizationProposal::NotApplicable
    );
    assert_eq!(
        parse_optimization("Sadly NO OPTIMIZATION POSSIBLE here"),
        OptimizationProposal::NotApplicable
    );
    assert_eq!(
        parse_optimization("```matlab\ny = conv(x, h);\n```"),
        OptimizationProposal::Applicable("y = conv(x, h);".to_string())
    );
}

#[test]
fn test_validation_thresholds() {
    let config = PipelineConfig::default();

    assert!(validation::validate_theory(&long_theory(), &config).is_ok());
    assert!(validation::validate_theory("too short", &config).is_err());
    // Long enough in characters, too few words
    assert!(validation::validate_theory(&"a".repeat(80), &config).is_err());

    assert!(validation::validate_code(BASE_CODE, &config).is_ok());
    assert!(validation::validate_code("x=1", &config).is_err());
    assert!(validation::validate_code("this has no code markers at all", &config).is_err());
}

#[test]
fn test_user_messages_follow_failure_kind() {
    let quota = PipelineError::Upstream {
        step: PipelineStep::Theory,
        source: GenerationError::PrimaryFailed {
            primary: LlmError::RateLimit("429".to_string()),
        },
    };
    assert_eq!(quota.kind(), FailureKind::RateLimited);
    assert_eq!(
        quota.user_message(),
        "Failed to process practical. API quota exceeded. Please try again later."
    );

    let hung = PipelineError::ThreadTimeout {
        steps: vec![PipelineStep::Theory],
        timeout: Duration::from_secs(30),
    };
    assert!(hung.user_message().contains("Request timed out"));

    let exhausted = PipelineError::Upstream {
        step: PipelineStep::LatexReport,
        source: GenerationError::UpstreamExhausted {
            primary: LlmError::RateLimit("429".to_string()),
            fallback: LlmError::Network("reset".to_string()),
        },
    };
    assert_eq!(exhausted.kind(), FailureKind::UpstreamExhausted);
    assert_eq!(
        exhausted.user_message(),
        "Failed to process practical. Please try again later."
    );
}

#[tokio::test]
async fn test_short_theory_fails_before_explanation() {
    let steps = Arc::new(MockSteps::new().with_theory("0123456789"));
    let result = pipeline(steps.clone()).process("Sampling").await;

    assert_eq!(result.status, BundleStatus::Error);
    assert!(
        result
            .error_message
            .as_deref()
            .unwrap()
            .starts_with(FAILURE_PREFIX)
    );
    assert_eq!(result.theory.as_deref(), Some("0123456789"));
    assert_eq!(MockSteps::count(&steps.calls.explain), 0);
    assert_eq!(MockSteps::count(&steps.calls.report), 0);
}

#[tokio::test]
async fn test_code_without_markers_fails_validation() {
    let steps = Arc::new(MockSteps::new().with_code("just some prose, no code here at all"));
    let result = pipeline(steps.clone()).process("Sampling").await;

    assert_eq!(result.status, BundleStatus::Error);
    assert_eq!(MockSteps::count(&steps.calls.explain), 0);
}

#[tokio::test]
async fn test_refusal_skips_optimization_branch() {
    let steps = Arc::new(MockSteps::new());
    let result = pipeline(steps.clone()).process("Sampling").await;

    assert_eq!(result.status, BundleStatus::Success);
    assert!(!result.optimization_applicable);
    assert_eq!(result.efficient_code, None);
    assert_eq!(result.efficient_explanation, None);
    assert_eq!(MockSteps::count(&steps.calls.explain_optimizations), 0);

    let report = steps.last_report.lock().unwrap().clone().unwrap();
    assert_eq!(report.0, BASE_CODE);
    assert_eq!(report.1, "Base explanation");
    assert_eq!(report.2, None);
}

#[tokio::test]
async fn test_applicable_optimization_feeds_report() {
    let steps = Arc::new(MockSteps::new().with_optimization(OPTIMIZED_CODE));
    let result = pipeline(steps.clone()).process("Sampling").await;

    assert_eq!(result.status, BundleStatus::Success);
    assert!(result.optimization_applicable);
    assert_eq!(result.efficient_code.as_deref(), Some(OPTIMIZED_CODE));
    assert_eq!(
        result.efficient_explanation.as_deref(),
        Some("Optimization notes")
    );
    assert_eq!(result.final_code(), Some(OPTIMIZED_CODE));

    let report = steps.last_report.lock().unwrap().clone().unwrap();
    assert_eq!(report.0, OPTIMIZED_CODE);
    assert_eq!(report.1, "Optimization notes");
    assert_eq!(report.2.as_deref(), Some("Optimization notes"));
}

#[tokio::test]
async fn test_first_stage_runs_without_theory_context() {
    let steps = Arc::new(MockSteps::new());
    let result = pipeline(steps.clone()).process("Sampling").await;

    assert_eq!(result.brute_force_code.as_deref(), Some(BASE_CODE));
    assert_eq!(MockSteps::count(&steps.calls.code), 1);
    assert_eq!(MockSteps::count(&steps.calls.code_with_theory), 0);
}

#[tokio::test]
async fn test_refinement_reruns_code_with_theory() {
    let steps = Arc::new(MockSteps::new());
    let config = PipelineConfig {
        refine_code_with_theory: true,
        ..PipelineConfig::default()
    };
    let result = PracticalPipeline::new(steps.clone(), config)
        .process("Sampling")
        .await;

    assert_eq!(result.status, BundleStatus::Success);
    assert_eq!(result.brute_force_code.as_deref(), Some(REFINED_CODE));
    assert_eq!(MockSteps::count(&steps.calls.code), 2);
    assert_eq!(MockSteps::count(&steps.calls.code_with_theory), 1);
}

#[tokio::test]
async fn test_cache_hit_skips_every_step() {
    let steps = Arc::new(MockSteps::new());
    let cache = Arc::new(ResultCache::new(10));
    let pipeline = pipeline(steps.clone()).with_cache(cache.clone());

    let first = pipeline.process("Linear Convolution").await;
    let second = pipeline.process("  linear CONVOLUTION").await;

    assert_eq!(first, second);
    assert_eq!(MockSteps::count(&steps.calls.theory), 1);
    assert_eq!(cache.len().await, 1);
}

#[tokio::test]
async fn test_failed_runs_are_not_cached_or_stored() {
    let steps = Arc::new(MockSteps::new().with_theory_error(GenerationError::PrimaryFailed {
        primary: LlmError::RateLimit("quota".to_string()),
    }));
    let cache = Arc::new(ResultCache::new(10));
    let store = Arc::new(MemoryStore::new());
    let pipeline = pipeline(steps)
        .with_cache(cache.clone())
        .with_store(store.clone());

    let result = pipeline.process("Sampling").await;

    assert_eq!(result.status, BundleStatus::Error);
    assert_eq!(
        result.error_message.as_deref(),
        Some("Failed to process practical. API quota exceeded. Please try again later.")
    );
    assert_eq!(result.brute_force_code.as_deref(), Some(BASE_CODE));
    assert!(cache.is_empty().await);
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_successful_run_is_stored() {
    let steps = Arc::new(MockSteps::new());
    let store = Arc::new(MemoryStore::new());
    let pipeline = pipeline(steps).with_store(store.clone());

    pipeline.process("Sampling").await;

    let recent = store.find_recent(10).await.unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].topic, "Sampling");
}

#[tokio::test]
async fn test_empty_topic_is_rejected() {
    let steps = Arc::new(MockSteps::new());
    let result = pipeline(steps.clone()).process("   ").await;

    assert_eq!(result.status, BundleStatus::Error);
    assert_eq!(MockSteps::count(&steps.calls.theory), 0);
}

#[tokio::test]
async fn test_hung_step_reports_thread_timeout() {
    let steps = Arc::new(MockSteps::new().with_theory_delay(Duration::from_secs(5)));
    let config = PipelineConfig {
        join_timeout_secs: 1,
        ..PipelineConfig::default()
    };
    let started = std::time::Instant::now();
    let result = PracticalPipeline::new(steps.clone(), config)
        .process("Sampling")
        .await;

    assert!(started.elapsed() < Duration::from_secs(4));
    assert_eq!(result.status, BundleStatus::Error);
    assert!(
        result
            .error_message
            .as_deref()
            .unwrap()
            .contains("Request timed out")
    );
    // The code step finished in time and is kept for diagnostics
    assert_eq!(result.brute_force_code.as_deref(), Some(BASE_CODE));
    assert_eq!(result.theory, None);
    assert_eq!(MockSteps::count(&steps.calls.explain), 0);
}

fn sequence(events: &[ProgressEvent]) -> Vec<(PipelineStep, EventStatus)> {
    events.iter().map(|event| (event.step, event.status)).collect()
}

#[tokio::test]
async fn test_streaming_event_order_without_optimization() {
    let steps = Arc::new(MockSteps::new());
    let events: Vec<ProgressEvent> = pipeline(steps.clone())
        .process_streaming("Sampling")
        .collect()
        .await;

    use EventStatus as S;
    use PipelineStep as P;
    assert_eq!(
        sequence(&events),
        vec![
            (P::Theory, S::Processing),
            (P::Theory, S::Complete),
            (P::BruteForceCode, S::Processing),
            (P::BruteForceCode, S::Complete),
            (P::BruteForceExplanation, S::Processing),
            (P::BruteForceExplanation, S::Complete),
            (P::EfficientCode, S::Processing),
            (P::EfficientCode, S::NotApplicable),
            (P::LatexReport, S::Processing),
            (P::LatexReport, S::Complete),
            (P::Complete, S::Complete),
        ]
    );

    let last = events.last().unwrap();
    assert_eq!(
        last.summary,
        Some(RunSummary {
            topic: "Sampling".to_string(),
            optimization_applicable: false,
        })
    );
    // Sequential run passes the theory into code generation
    assert_eq!(MockSteps::count(&steps.calls.code_with_theory), 1);
}

#[tokio::test]
async fn test_streaming_event_order_with_optimization() {
    let steps = Arc::new(MockSteps::new().with_optimization(OPTIMIZED_CODE));
    let events: Vec<ProgressEvent> = pipeline(steps)
        .process_streaming("Sampling")
        .collect()
        .await;

    let steps_seen: Vec<PipelineStep> = events.iter().map(|event| event.step).collect();
    assert_eq!(
        steps_seen,
        vec![
            PipelineStep::Theory,
            PipelineStep::Theory,
            PipelineStep::BruteForceCode,
            PipelineStep::BruteForceCode,
            PipelineStep::BruteForceExplanation,
            PipelineStep::BruteForceExplanation,
            PipelineStep::EfficientCode,
            PipelineStep::EfficientCode,
            PipelineStep::EfficientExplanation,
            PipelineStep::EfficientExplanation,
            PipelineStep::LatexReport,
            PipelineStep::LatexReport,
            PipelineStep::Complete,
        ]
    );
    assert_eq!(events[7].status, EventStatus::Complete);
    assert_eq!(events[7].content.as_deref(), Some(OPTIMIZED_CODE));
}

#[tokio::test]
async fn test_streaming_failure_ends_with_error_event() {
    let steps = Arc::new(MockSteps::new().with_theory("short"));
    let events: Vec<ProgressEvent> = pipeline(steps.clone())
        .process_streaming("Sampling")
        .collect()
        .await;

    assert_eq!(
        sequence(&events),
        vec![
            (PipelineStep::Theory, EventStatus::Processing),
            (PipelineStep::Error, EventStatus::Error),
        ]
    );
    assert!(events[1].is_terminal());
    assert!(
        events[1]
            .message
            .as_deref()
            .unwrap()
            .starts_with(FAILURE_PREFIX)
    );
    assert_eq!(MockSteps::count(&steps.calls.code), 0);
}

#[tokio::test]
async fn test_streaming_producer_stops_when_consumer_leaves() {
    let steps = Arc::new(MockSteps::new());
    let mut stream = pipeline(steps.clone()).process_streaming("Sampling");

    let first = stream.next().await.unwrap();
    assert_eq!(first.step, PipelineStep::Theory);
    drop(stream);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(MockSteps::count(&steps.calls.code), 0);
    assert_eq!(MockSteps::count(&steps.calls.report), 0);
}

#[tokio::test]
async fn test_streaming_success_is_cached() {
    let steps = Arc::new(MockSteps::new());
    let cache = Arc::new(ResultCache::new(4));
    let pipeline = pipeline(steps.clone()).with_cache(cache.clone());

    let _events: Vec<ProgressEvent> = pipeline.process_streaming("FFT").collect().await;
    assert!(cache.contains("fft").await);

    pipeline.process("fft").await;
    assert_eq!(MockSteps::count(&steps.calls.theory), 1);
}
