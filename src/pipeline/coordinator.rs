//! Blocking pipeline coordinator.
//!
//! Theory and base code are generated concurrently under a shared join
//! deadline; everything after that runs in dependency order. Every failure is
//! converted into a `status = error` bundle so callers never see a raw error.

use crate::llm::GenerationError;
use crate::pipeline::cache::ResultCache;
use crate::pipeline::steps::{OptimizationProposal, PracticalSteps, ReportInputs};
use crate::pipeline::types::{
    PipelineConfig, PipelineError, PipelineRunState, PipelineStep, PracticalArtifacts,
    PracticalBundle, PracticalTopic, RunPhase,
};
use crate::pipeline::validation::{is_persistable, validate_code, validate_theory};
use crate::storage::PracticalStore;
use std::sync::Arc;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{Instant, timeout_at};
use tracing::{debug, error, info, warn};

pub const EMPTY_TOPIC_MESSAGE: &str = "Failed to process practical. Please provide a topic.";

#[derive(Clone)]
pub struct PracticalPipeline {
    steps: Arc<dyn PracticalSteps>,
    cache: Option<Arc<ResultCache>>,
    store: Option<Arc<dyn PracticalStore>>,
    config: PipelineConfig,
}

impl PracticalPipeline {
    pub fn new(steps: Arc<dyn PracticalSteps>, config: PipelineConfig) -> Self {
        Self {
            steps,
            cache: None,
            store: None,
            config,
        }
    }

    pub fn with_cache(mut self, cache: Arc<ResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn PracticalStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn cache(&self) -> Option<&Arc<ResultCache>> {
        self.cache.as_ref()
    }

    pub fn store(&self) -> Option<&Arc<dyn PracticalStore>> {
        self.store.as_ref()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub(crate) fn steps(&self) -> &Arc<dyn PracticalSteps> {
        &self.steps
    }

    /// Run every step for `topic` and return the resulting bundle.
    ///
    /// Never fails: errors come back as a bundle with `status = error`, a
    /// sanitized message and whatever theory or base code was produced.
    pub async fn process(&self, topic: &str) -> PracticalBundle {
        let topic = PracticalTopic::new(topic);
        if topic.is_empty() {
            warn!("Rejected empty topic");
            return PracticalBundle::failed("", EMPTY_TOPIC_MESSAGE, None, None);
        }

        if let Some(cache) = &self.cache
            && let Some(bundle) = cache.get(topic.key()).await
        {
            info!("Returning cached practical for '{}'", topic);
            return bundle;
        }

        info!("Starting processing for topic: {}", topic);
        let mut state = PipelineRunState::new();

        match self.run(&topic, &mut state).await {
            Ok(artifacts) => {
                state.advance(RunPhase::Done);
                let bundle = artifacts.into_bundle(&topic);
                self.remember(&topic, &bundle).await;
                info!("Processing completed for '{}'", topic);
                bundle
            }
            Err(error) => {
                let phase = state.phase();
                state.advance(RunPhase::Failed);
                error!(
                    "Processing '{}' failed during {:?} ({:?}): {}",
                    topic,
                    phase,
                    error.kind(),
                    error
                );
                PracticalBundle::failed(
                    topic.as_str(),
                    error.user_message(),
                    state.theory.take(),
                    state.brute_force_code.take(),
                )
            }
        }
    }

    async fn run(
        &self,
        topic: &PracticalTopic,
        state: &mut PipelineRunState,
    ) -> Result<PracticalArtifacts, PipelineError> {
        state.advance(RunPhase::TheoryAndBaseCodeInFlight);
        self.run_first_stage(topic, state).await?;

        state.advance(RunPhase::Validating);
        let theory = state.theory.clone().unwrap_or_default();
        let mut code = state.brute_force_code.clone().unwrap_or_default();
        validate_theory(&theory, &self.config)?;
        validate_code(&code, &self.config)?;

        if self.config.refine_code_with_theory {
            code = self.refine_code(topic, &theory, code).await;
            state.brute_force_code = Some(code.clone());
        }

        state.advance(RunPhase::ExplainingBase);
        let explanation = self
            .steps
            .explain_code(topic.as_str(), &code)
            .await
            .map_err(PipelineError::upstream(PipelineStep::BruteForceExplanation))?;

        state.advance(RunPhase::DecidingOptimization);
        let proposal = self
            .steps
            .propose_optimization(topic.as_str(), &code)
            .await
            .map_err(PipelineError::upstream(PipelineStep::EfficientCode))?;

        let optimization = match proposal {
            OptimizationProposal::Applicable(optimized) => {
                state.advance(RunPhase::OptimizingAndExplaining);
                info!("Optimization applicable for '{}'", topic);
                let notes = self
                    .steps
                    .explain_optimizations(topic.as_str(), &code, &optimized)
                    .await
                    .map_err(PipelineError::upstream(PipelineStep::EfficientExplanation))?;
                Some((optimized, notes))
            }
            OptimizationProposal::NotApplicable => {
                state.advance(RunPhase::SkippingOptimization);
                info!("No significant optimization possible for '{}'", topic);
                None
            }
        };

        state.advance(RunPhase::BuildingReport);
        let inputs = report_inputs(topic, &theory, &code, &explanation, optimization.as_ref());
        let latex_report = self
            .steps
            .generate_report(&inputs)
            .await
            .map_err(PipelineError::upstream(PipelineStep::LatexReport))?;

        Ok(PracticalArtifacts {
            theory,
            brute_force_code: code,
            brute_force_explanation: explanation,
            optimization,
            latex_report,
        })
    }

    /// Launch theory and base code concurrently and join both under one deadline.
    ///
    /// Successful outputs land in `state` even when the sibling step fails.
    async fn run_first_stage(
        &self,
        topic: &PracticalTopic,
        state: &mut PipelineRunState,
    ) -> Result<(), PipelineError> {
        let join_timeout = self.config.join_timeout();
        let deadline = Instant::now() + join_timeout;

        let steps = Arc::clone(&self.steps);
        let theory_topic = topic.as_str().to_string();
        let mut theory_task: JoinHandle<Result<String, GenerationError>> =
            tokio::spawn(async move { steps.explain_theory(&theory_topic).await });

        let steps = Arc::clone(&self.steps);
        let code_topic = topic.as_str().to_string();
        let mut code_task: JoinHandle<Result<String, GenerationError>> =
            tokio::spawn(async move { steps.generate_base_code(&code_topic, None).await });

        let (theory, code) = tokio::join!(
            timeout_at(deadline, &mut theory_task),
            timeout_at(deadline, &mut code_task),
        );

        let mut hung = Vec::new();
        let theory = match theory {
            Ok(joined) => Some(joined_output(PipelineStep::Theory, joined)),
            Err(_) => {
                theory_task.abort();
                hung.push(PipelineStep::Theory);
                None
            }
        };
        let code = match code {
            Ok(joined) => Some(joined_output(PipelineStep::BruteForceCode, joined)),
            Err(_) => {
                code_task.abort();
                hung.push(PipelineStep::BruteForceCode);
                None
            }
        };

        if let Some(Ok(theory)) = &theory {
            state.theory = Some(theory.clone());
        }
        if let Some(Ok(code)) = &code {
            state.brute_force_code = Some(code.clone());
        }

        if !hung.is_empty() {
            warn!("Steps {:?} exceeded the {:?} join timeout", hung, join_timeout);
            return Err(PipelineError::ThreadTimeout {
                steps: hung,
                timeout: join_timeout,
            });
        }

        if let Some(Err(error)) = theory {
            return Err(error);
        }
        if let Some(Err(error)) = code {
            return Err(error);
        }
        Ok(())
    }

    /// Regenerate base code with the theory as context. Keeps `current` on failure.
    async fn refine_code(&self, topic: &PracticalTopic, theory: &str, current: String) -> String {
        match self
            .steps
            .generate_base_code(topic.as_str(), Some(theory))
            .await
        {
            Ok(refined) if validate_code(&refined, &self.config).is_ok() => {
                debug!("Base code refined with theory context");
                refined
            }
            Ok(_) => {
                warn!("Refined code failed validation, keeping original");
                current
            }
            Err(error) => {
                warn!("Code refinement failed, keeping original: {}", error);
                current
            }
        }
    }

    /// Cache and persist a bundle that passed every quality gate.
    pub(crate) async fn remember(&self, topic: &PracticalTopic, bundle: &PracticalBundle) {
        if !is_persistable(bundle, &self.config) {
            warn!("Bundle for '{}' is incomplete, not caching", topic);
            return;
        }

        if let Some(cache) = &self.cache {
            cache.put(topic.key(), bundle.clone()).await;
        }

        if let Some(store) = &self.store {
            match store.create_record(bundle).await {
                Ok(id) => info!("Saved practical '{}' as {}", topic, id),
                Err(error) => warn!("Failed to save practical '{}': {}", topic, error),
            }
        }
    }
}

fn joined_output(
    step: PipelineStep,
    joined: Result<Result<String, GenerationError>, JoinError>,
) -> Result<String, PipelineError> {
    match joined {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(source)) => Err(PipelineError::Upstream { step, source }),
        Err(join_error) => Err(PipelineError::Unknown {
            step,
            message: join_error.to_string(),
        }),
    }
}

/// Report inputs: optimized code and its explanation when applicable,
/// otherwise the base code and base explanation.
pub(crate) fn report_inputs<'a>(
    topic: &'a PracticalTopic,
    theory: &'a str,
    base_code: &'a str,
    base_explanation: &'a str,
    optimization: Option<&'a (String, String)>,
) -> ReportInputs<'a> {
    match optimization {
        Some((optimized, notes)) => ReportInputs {
            topic: topic.as_str(),
            theory,
            final_code: optimized,
            code_explanation: notes,
            optimization_notes: Some(notes),
        },
        None => ReportInputs {
            topic: topic.as_str(),
            theory,
            final_code: base_code,
            code_explanation: base_explanation,
            optimization_notes: None,
        },
    }
}
