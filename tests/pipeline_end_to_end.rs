//! End-to-end runs of the practical pipeline through `MatistSystem`, with
//! scripted providers standing in for the LLM services.

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;
use matist::env::test::SAMPLE_TOPIC;
use matist::llm::{
    GenerationRequest, GenerationSettings, LlmError, RetryConfig, RetryPolicy, RetryingClient,
    TextStream,
};
use matist::pipeline::{
    EventStatus, FAILURE_PREFIX, LlmSteps, PipelineStep, PracticalSteps, prompts,
};
use matist::storage::{MemoryStore, PracticalStore};
use matist::{
    CompileError, MatistConfig, MatistSystem, PdfCompiler, SystemError, TextBackend,
    TextGenerator,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const BASE_CODE: &str = "x = [1 2 3];\nh = [1 1];\ny = zeros(1, 4);\nfor n = 1:4\n  y(n) = 0;\nend";
const OPTIMIZED_CODE: &str = "x = [1 2 3];\nh = [1 1];\ny = conv(x, h);";

/// Answers each step according to the system prompt it receives
struct ScriptedProvider {
    optimization_reply: String,
    report_queries: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    fn new(optimization_reply: &str) -> Arc<Self> {
        Arc::new(Self {
            optimization_reply: optimization_reply.to_string(),
            report_queries: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        })
    }

    fn last_report_query(&self) -> String {
        self.report_queries.lock().unwrap().last().cloned().unwrap()
    }

    fn reply(&self, request: &GenerationRequest) -> String {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let system = request.system_prompt.as_str();

        if system == prompts::THEORY_SYSTEM {
            "Linear convolution combines an input signal with an impulse response. ".repeat(20)
        } else if system == prompts::CODE_SYSTEM {
            format!("```matlab\n{}\n```", BASE_CODE)
        } else if system == prompts::OPTIMIZE_SYSTEM {
            self.optimization_reply.clone()
        } else if system == prompts::EXPLAIN_SYSTEM {
            if request.user_query.starts_with("Compare") {
                "optimization explanation".to_string()
            } else {
                "base explanation".to_string()
            }
        } else if system == prompts::REPORT_SYSTEM {
            self.report_queries
                .lock()
                .unwrap()
                .push(request.user_query.clone());
            "\\documentclass[12pt]{article}\n\\begin{document}\nReport\n\\end{document}".to_string()
        } else {
            "tutor answer".to_string()
        }
    }
}

#[async_trait]
impl TextBackend for ScriptedProvider {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, LlmError> {
        Ok(self.reply(request))
    }

    async fn generate_stream(&self, request: &GenerationRequest) -> Result<TextStream, LlmError> {
        let text = self.reply(request);
        Ok(stream::iter(vec![Ok(text)]).boxed())
    }
}

struct DownProvider;

#[async_trait]
impl TextBackend for DownProvider {
    fn provider_name(&self) -> &str {
        "down"
    }

    async fn generate(&self, _request: &GenerationRequest) -> Result<String, LlmError> {
        Err(LlmError::Server {
            status: 503,
            message: "unavailable".to_string(),
        })
    }

    async fn generate_stream(&self, _request: &GenerationRequest) -> Result<TextStream, LlmError> {
        Err(LlmError::Server {
            status: 503,
            message: "unavailable".to_string(),
        })
    }
}

/// Accepts the request and never answers
struct HangingProvider;

#[async_trait]
impl TextBackend for HangingProvider {
    fn provider_name(&self) -> &str {
        "hanging"
    }

    async fn generate(&self, _request: &GenerationRequest) -> Result<String, LlmError> {
        futures::future::pending().await
    }

    async fn generate_stream(&self, _request: &GenerationRequest) -> Result<TextStream, LlmError> {
        futures::future::pending().await
    }
}

struct FakeCompiler;

#[async_trait]
impl PdfCompiler for FakeCompiler {
    async fn compile(&self, source: &str) -> Result<Vec<u8>, CompileError> {
        assert!(source.starts_with("\\documentclass"));
        Ok(b"%PDF-1.5 fake".to_vec())
    }
}

fn system(
    primary: Arc<dyn TextBackend>,
    fallback: Option<Arc<dyn TextBackend>>,
) -> (MatistSystem, Arc<MemoryStore>) {
    let generator = Arc::new(TextGenerator::new(
        primary,
        fallback,
        GenerationSettings::default(),
    ));
    let steps: Arc<dyn PracticalSteps> = Arc::new(LlmSteps::new(Arc::clone(&generator)));
    let store = Arc::new(MemoryStore::new());
    let system = MatistSystem::with_components(
        MatistConfig::default(),
        generator,
        steps,
        Some(store.clone() as Arc<dyn PracticalStore>),
        Arc::new(FakeCompiler),
    );
    (system, store)
}

#[tokio::test]
async fn test_practical_without_optimization() {
    let provider = ScriptedProvider::new("No significant optimization possible for this code.");
    let (system, _) = system(provider.clone(), None);

    let bundle = system.process(SAMPLE_TOPIC).await;

    assert!(bundle.is_success(), "{:?}", bundle.error_message);
    assert_eq!(bundle.topic, SAMPLE_TOPIC);
    assert_eq!(bundle.brute_force_code.as_deref(), Some(BASE_CODE));
    assert_eq!(bundle.brute_force_explanation.as_deref(), Some("base explanation"));
    assert!(!bundle.optimization_applicable);
    assert!(bundle.efficient_code.is_none());
    assert!(bundle.efficient_explanation.is_none());

    let report_query = provider.last_report_query();
    assert!(report_query.contains("Code Explanation: base explanation"));
    assert!(report_query.contains("Optimization Notes: N/A"));
    assert!(report_query.contains(BASE_CODE));
}

#[tokio::test]
async fn test_practical_with_optimization() {
    let provider = ScriptedProvider::new(&format!("```matlab\n{}\n```", OPTIMIZED_CODE));
    let (system, _) = system(provider.clone(), None);

    let bundle = system.process(SAMPLE_TOPIC).await;

    assert!(bundle.is_success());
    assert!(bundle.optimization_applicable);
    assert_eq!(bundle.efficient_code.as_deref(), Some(OPTIMIZED_CODE));
    assert_eq!(
        bundle.efficient_explanation.as_deref(),
        Some("optimization explanation")
    );
    assert_eq!(bundle.final_code(), Some(OPTIMIZED_CODE));

    let report_query = provider.last_report_query();
    assert!(report_query.contains(OPTIMIZED_CODE));
    assert!(report_query.contains("Code Explanation: optimization explanation"));
}

#[tokio::test]
async fn test_repeated_topic_is_served_from_cache() {
    let provider = ScriptedProvider::new("NO_OPTIMIZATION");
    let (system, store) = system(provider.clone(), None);

    let first = system.process(SAMPLE_TOPIC).await;
    let calls = provider.calls.load(Ordering::SeqCst);
    let second = system.process("  linear   CONVOLUTION ").await;

    assert_eq!(first, second);
    assert_eq!(provider.calls.load(Ordering::SeqCst), calls);
    assert_eq!(store.len(), 1);

    let status = system.status().await;
    let cache = status.cache.unwrap();
    assert_eq!(cache.hits, 1);
    assert!(status.store_enabled);
}

#[tokio::test]
async fn test_fallback_provider_serves_the_whole_run() {
    let fallback = ScriptedProvider::new("NO_OPTIMIZATION");
    let (system, _) = system(Arc::new(DownProvider), Some(fallback.clone()));

    let bundle = system.process(SAMPLE_TOPIC).await;

    assert!(bundle.is_success());
    assert!(fallback.calls.load(Ordering::SeqCst) >= 5);
}

#[tokio::test]
async fn test_all_providers_down_yields_error_bundle() {
    let (system, store) = system(Arc::new(DownProvider), Some(Arc::new(DownProvider)));

    let bundle = system.process(SAMPLE_TOPIC).await;

    assert!(!bundle.is_success());
    assert!(
        bundle
            .error_message
            .as_deref()
            .unwrap()
            .starts_with(FAILURE_PREFIX)
    );
    assert!(store.is_empty());
    assert!(system.recent(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_streaming_run_reports_every_step() {
    let provider = ScriptedProvider::new("NO_OPTIMIZATION");
    let (system, store) = system(provider, None);

    let events: Vec<_> = system.process_streaming(SAMPLE_TOPIC).collect().await;

    let completed: Vec<PipelineStep> = events
        .iter()
        .filter(|event| event.status == EventStatus::Complete)
        .map(|event| event.step)
        .collect();
    assert_eq!(
        completed,
        vec![
            PipelineStep::Theory,
            PipelineStep::BruteForceCode,
            PipelineStep::BruteForceExplanation,
            PipelineStep::LatexReport,
            PipelineStep::Complete,
        ]
    );
    assert!(events.iter().any(|event| {
        event.step == PipelineStep::EfficientCode && event.status == EventStatus::NotApplicable
    }));

    let summary = events.last().unwrap().summary.clone().unwrap();
    assert!(!summary.optimization_applicable);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_stored_practical_compiles_to_pdf() {
    let provider = ScriptedProvider::new("NO_OPTIMIZATION");
    let (system, _) = system(provider, None);
    system.process(SAMPLE_TOPIC).await;

    let recent = system.recent(5).await.unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].topic, SAMPLE_TOPIC);

    let pdf = system.compile_record(recent[0].id).await.unwrap();
    assert!(matist::report::is_pdf(&pdf));

    let missing = system.compile_record(uuid::Uuid::new_v4()).await;
    assert!(matches!(missing, Err(SystemError::RecordNotFound(_))));
}

#[tokio::test]
async fn test_tutor_chat_through_system() {
    let provider = ScriptedProvider::new("NO_OPTIMIZATION");
    let (system, _) = system(provider, None);

    let reply = system
        .chat(&[matist::ChatMessage::user("What is aliasing?")])
        .await;
    assert_eq!(reply.response, "tutor answer");
}

#[tokio::test]
async fn test_hanging_primary_falls_back_within_join_timeout() {
    let mut config = MatistConfig::default();
    config.pipeline.join_timeout_secs = 2;
    config.fallback.request_timeout_secs = 1;
    config.retry = RetryConfig {
        max_attempts: 3,
        backoff_base_ms: 10,
        backoff_max_ms: 20,
        jitter: false,
        total_budget_ms: 400,
    };
    config.validate().expect("Budgets fit the join timeout");

    let primary: Arc<dyn TextBackend> = Arc::new(RetryingClient::new(
        Arc::new(HangingProvider),
        RetryPolicy::new(&config.retry, Duration::from_millis(300)),
    ));
    let fallback = ScriptedProvider::new("NO_OPTIMIZATION");
    let generator = Arc::new(TextGenerator::new(
        primary,
        Some(fallback.clone() as Arc<dyn TextBackend>),
        GenerationSettings::default(),
    ));
    let steps: Arc<dyn PracticalSteps> = Arc::new(LlmSteps::new(Arc::clone(&generator)));
    let system = MatistSystem::with_components(
        config,
        generator,
        steps,
        None,
        Arc::new(FakeCompiler),
    );

    let bundle = system.process(SAMPLE_TOPIC).await;

    assert!(bundle.is_success(), "{:?}", bundle.error_message);
    assert_eq!(bundle.brute_force_code.as_deref(), Some(BASE_CODE));
    assert!(fallback.calls.load(Ordering::SeqCst) >= 5);
}
