//! Practical-generation pipeline
//!
//! Turns a topic into theory, base code, explanations, an optional optimized
//! implementation and a LaTeX report. [`PracticalPipeline::process`] returns a
//! finished [`PracticalBundle`]; [`PracticalPipeline::process_streaming`]
//! reports each step as a [`ProgressEvent`].

pub mod cache;
pub mod coordinator;
pub mod prompts;
pub mod steps;
pub mod streaming;
pub mod types;
pub mod validation;

#[cfg(test)]
mod tests;

pub use cache::{CacheStats, ResultCache};
pub use coordinator::PracticalPipeline;
pub use steps::{
    LlmSteps, NO_OPTIMIZATION_SENTINEL, OptimizationProposal, PracticalSteps, ReportInputs,
    clean_code, parse_optimization,
};
pub use types::*;
