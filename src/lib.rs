//! # MATist
//!
//! A multi-agent backend that turns an ECE practical topic (for example
//! "Linear Convolution") into a complete practical: a theory explanation,
//! brute-force MATLAB code with an explanation, an optional optimized
//! version, and a compilable LaTeX report.
//!
//! ## Architecture Overview
//!
//! - **[`llm`]**: Gemini client with retries and hard timeouts, an OpenRouter
//!   fallback walking a model chain, and the [`TextGenerator`] facade that
//!   hides both behind "always returns text"
//! - **[`pipeline`]**: The practical steps, the coordinator that runs theory
//!   and base code concurrently, validates, optionally optimizes and writes
//!   the report, plus a streaming variant and a FIFO result cache
//! - **[`storage`]**: Persistence of successful practicals
//! - **[`report`]**: LaTeX to PDF compilation through a remote service
//! - **[`tutor`]**: A conversational tutor over the same generator
//! - **[`integration`]**: Configuration and wiring of all of the above
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use matist::{MatistConfig, MatistSystem};
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut config = MatistConfig::default();
//!     config.apply_process_env();
//!     let system = MatistSystem::new(config)?;
//!
//!     let mut events = system.process_streaming("Linear Convolution");
//!     while let Some(event) = events.next().await {
//!         println!("{} {:?}", event.step, event.status);
//!     }
//!     Ok(())
//! }
//! ```

/// LLM providers, retry handling and the text generation facade.
pub mod llm;

/// Practical generation: steps, coordinator, streaming and caching.
pub mod pipeline;

/// Persistence of generated practicals.
pub mod storage;

/// PDF compilation of LaTeX reports.
pub mod report;

pub mod tutor;

/// High-level configuration and system wiring.
pub mod integration;

/// Environment constants and path utilities.
///
/// Centralizes variable names, directory names and defaults used
/// throughout the application.
pub mod env;

// CLI module for command-line interface
pub mod cli;

pub use integration::{ConfigError, MatistConfig, MatistSystem, SystemError, SystemStatus};
pub use llm::{GenerationError, LlmError, TextBackend, TextGenerator};
pub use pipeline::{
    PracticalBundle, PracticalPipeline, PracticalSteps, PracticalTopic, ProgressEvent,
    ResultCache,
};
pub use report::{CompileError, PdfCompiler, RemoteLatexCompiler};
pub use storage::{PracticalRecord, PracticalStore, StoreError};
pub use tutor::{ChatMessage, TutorAgent, TutorReply};
