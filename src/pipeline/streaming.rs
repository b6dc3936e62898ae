//! Sequential pipeline variant that reports every step transition.
//!
//! Events go through a single-slot channel, so the producer runs at most one
//! event ahead of the consumer and stops as soon as the consumer drops the
//! stream. The last event is always `complete` or `error`.

use crate::pipeline::coordinator::{EMPTY_TOPIC_MESSAGE, PracticalPipeline, report_inputs};
use crate::pipeline::steps::OptimizationProposal;
use crate::pipeline::types::{
    PipelineError, PipelineStep, PracticalArtifacts, PracticalBundle, PracticalTopic,
    ProgressEvent, RunSummary,
};
use crate::pipeline::validation::{validate_code, validate_theory};
use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info};

enum Interrupt {
    /// The consumer went away
    Disconnected,
    Failed(PipelineError),
}

impl From<PipelineError> for Interrupt {
    fn from(error: PipelineError) -> Self {
        Interrupt::Failed(error)
    }
}

struct Emitter {
    tx: mpsc::Sender<ProgressEvent>,
}

impl Emitter {
    async fn emit(&self, event: ProgressEvent) -> Result<(), Interrupt> {
        self.tx
            .send(event)
            .await
            .map_err(|_| Interrupt::Disconnected)
    }
}

impl PracticalPipeline {
    /// Stream progress events for `topic`. Must be called within a Tokio runtime.
    pub fn process_streaming(&self, topic: &str) -> BoxStream<'static, ProgressEvent> {
        let (tx, rx) = mpsc::channel(1);
        let pipeline = self.clone();
        let topic = PracticalTopic::new(topic);

        tokio::spawn(async move {
            let emitter = Emitter { tx };

            if topic.is_empty() {
                let _ = emitter.emit(ProgressEvent::failed(EMPTY_TOPIC_MESSAGE)).await;
                return;
            }

            info!("Starting streaming run for topic: {}", topic);
            match pipeline.run_streaming(&topic, &emitter).await {
                Ok(bundle) => {
                    pipeline.remember(&topic, &bundle).await;
                    let summary = RunSummary {
                        topic: bundle.topic.clone(),
                        optimization_applicable: bundle.optimization_applicable,
                    };
                    if emitter.emit(ProgressEvent::finished(summary)).await.is_err() {
                        debug!("Consumer left before the final event for '{}'", topic);
                    }
                }
                Err(Interrupt::Disconnected) => {
                    info!("Consumer dropped the stream for '{}', stopping", topic);
                }
                Err(Interrupt::Failed(error)) => {
                    error!(
                        "Streaming run for '{}' failed ({:?}): {}",
                        topic,
                        error.kind(),
                        error
                    );
                    let _ = emitter.emit(ProgressEvent::failed(error.user_message())).await;
                }
            }
        });

        ReceiverStream::new(rx).boxed()
    }

    async fn run_streaming(
        &self,
        topic: &PracticalTopic,
        emitter: &Emitter,
    ) -> Result<PracticalBundle, Interrupt> {
        let steps = self.steps();
        let config = self.config();
        let name = topic.as_str();

        emitter
            .emit(ProgressEvent::processing(
                PipelineStep::Theory,
                "Generating theory explanation...",
            ))
            .await?;
        let theory = steps
            .explain_theory(name)
            .await
            .map_err(PipelineError::upstream(PipelineStep::Theory))?;
        validate_theory(&theory, config)?;
        emitter
            .emit(ProgressEvent::complete(PipelineStep::Theory, theory.clone()))
            .await?;

        emitter
            .emit(ProgressEvent::processing(
                PipelineStep::BruteForceCode,
                "Generating brute-force code...",
            ))
            .await?;
        let code = steps
            .generate_base_code(name, Some(&theory))
            .await
            .map_err(PipelineError::upstream(PipelineStep::BruteForceCode))?;
        validate_code(&code, config)?;
        emitter
            .emit(ProgressEvent::complete(PipelineStep::BruteForceCode, code.clone()))
            .await?;

        emitter
            .emit(ProgressEvent::processing(
                PipelineStep::BruteForceExplanation,
                "Explaining brute-force code...",
            ))
            .await?;
        let explanation = steps
            .explain_code(name, &code)
            .await
            .map_err(PipelineError::upstream(PipelineStep::BruteForceExplanation))?;
        emitter
            .emit(ProgressEvent::complete(
                PipelineStep::BruteForceExplanation,
                explanation.clone(),
            ))
            .await?;

        emitter
            .emit(ProgressEvent::processing(
                PipelineStep::EfficientCode,
                "Checking for optimization opportunities...",
            ))
            .await?;
        let proposal = steps
            .propose_optimization(name, &code)
            .await
            .map_err(PipelineError::upstream(PipelineStep::EfficientCode))?;

        let optimization = match proposal {
            OptimizationProposal::Applicable(optimized) => {
                emitter
                    .emit(ProgressEvent::complete(
                        PipelineStep::EfficientCode,
                        optimized.clone(),
                    ))
                    .await?;
                emitter
                    .emit(ProgressEvent::processing(
                        PipelineStep::EfficientExplanation,
                        "Explaining optimizations...",
                    ))
                    .await?;
                let notes = steps
                    .explain_optimizations(name, &code, &optimized)
                    .await
                    .map_err(PipelineError::upstream(PipelineStep::EfficientExplanation))?;
                emitter
                    .emit(ProgressEvent::complete(
                        PipelineStep::EfficientExplanation,
                        notes.clone(),
                    ))
                    .await?;
                Some((optimized, notes))
            }
            OptimizationProposal::NotApplicable => {
                emitter
                    .emit(ProgressEvent::not_applicable(
                        PipelineStep::EfficientCode,
                        "No significant optimization possible",
                    ))
                    .await?;
                None
            }
        };

        emitter
            .emit(ProgressEvent::processing(
                PipelineStep::LatexReport,
                "Generating LaTeX report...",
            ))
            .await?;
        let inputs = report_inputs(topic, &theory, &code, &explanation, optimization.as_ref());
        let latex_report = steps
            .generate_report(&inputs)
            .await
            .map_err(PipelineError::upstream(PipelineStep::LatexReport))?;
        emitter
            .emit(ProgressEvent::complete(
                PipelineStep::LatexReport,
                latex_report.clone(),
            ))
            .await?;

        Ok(PracticalArtifacts {
            theory,
            brute_force_code: code,
            brute_force_explanation: explanation,
            optimization,
            latex_report,
        }
        .into_bundle(topic))
    }
}
