//! # System wiring
//!
//! [`MatistSystem`] assembles the text generator, the practical pipeline with
//! its cache and record store, the tutor and the PDF compiler from a single
//! [`MatistConfig`].
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 MatistSystem                 │
//! │  ┌───────────┐  ┌──────────┐  ┌───────────┐  │
//! │  │ Practical │  │  Tutor   │  │    PDF    │  │
//! │  │ Pipeline  │  │  Agent   │  │ Compiler  │  │
//! │  └─────┬─────┘  └────┬─────┘  └───────────┘  │
//! │        └──── TextGenerator ────┘             │
//! │         (Gemini + retry → OpenRouter)        │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use matist::{MatistConfig, MatistSystem};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut config = MatistConfig::default();
//!     config.apply_process_env();
//!     let system = MatistSystem::new(config)?;
//!
//!     let bundle = system.process("Linear Convolution").await;
//!     println!("{:?}", bundle.status);
//!     Ok(())
//! }
//! ```

use crate::env::{self, vars};
use crate::llm::{FallbackConfig, GenerationSettings, PrimaryConfig, RetryConfig, TextGenerator};
use crate::pipeline::{
    CacheConfig, CacheStats, LlmSteps, PipelineConfig, PracticalBundle, PracticalPipeline,
    PracticalSteps, ProgressEvent, ResultCache,
};
use crate::report::{CompileError, CompilerConfig, PdfCompiler, RemoteLatexCompiler};
use crate::storage::{
    PracticalRecord, PracticalStore, PracticalSummary, RecordId, StorageConfig, StoreError,
};
use crate::tutor::{ChatMessage, TutorAgent, TutorReply};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse TOML configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Failed to serialize configuration to TOML: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error("Could not determine home directory")]
    NoHomeDir,
}

/// Complete application configuration, one TOML table per component
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MatistConfig {
    /// Root for `.matist/` data; the current directory when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_path: Option<PathBuf>,
    pub generation: GenerationSettings,
    pub primary: PrimaryConfig,
    pub fallback: FallbackConfig,
    pub retry: RetryConfig,
    pub pipeline: PipelineConfig,
    pub cache: CacheConfig,
    pub storage: StorageConfig,
    pub compiler: CompilerConfig,
}

impl MatistConfig {
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = self.to_toml_string()?;
        std::fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Override file values with environment variables resolved through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(key) = get(vars::GEMINI_API_KEY) {
            self.primary.api_key = Some(key);
        }
        if let Some(model) = get(vars::GEMINI_MODEL) {
            self.primary.model = model.trim().to_string();
        }
        if let Some(key) = get(vars::OPENROUTER_API_KEY) {
            self.fallback.api_key = Some(key);
        }
        if let Some(models) = get(vars::OPENROUTER_MODEL) {
            self.fallback.models = FallbackConfig::parse_models(&models);
        }
        if let Some(site_url) = get(vars::SITE_URL) {
            self.fallback.site_url = site_url;
        }
        if let Some(capacity) = get(vars::CACHE_CAPACITY) {
            match capacity.trim().parse::<usize>() {
                Ok(capacity) => self.cache.capacity = capacity,
                Err(_) => warn!(
                    "Ignoring {}={:?}: not a non-negative integer",
                    vars::CACHE_CAPACITY,
                    capacity
                ),
            }
        }
    }

    pub fn apply_process_env(&mut self) {
        self.apply_env_overrides(|name| std::env::var(name).ok());
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        let worst_case = self.worst_case_generation_time();
        if worst_case >= self.pipeline.join_timeout() {
            return Err(ConfigError::Invalid(format!(
                "retry.total_budget_ms ({}) plus {} fallback model(s) at \
                 fallback.request_timeout_secs ({}) takes {:?}, which must be below \
                 pipeline.join_timeout_secs ({})",
                self.retry.total_budget_ms,
                self.fallback.models.len(),
                self.fallback.request_timeout_secs,
                worst_case,
                self.pipeline.join_timeout_secs
            )));
        }
        Ok(())
    }

    /// Longest one generation step can take: the primary's whole retry budget
    /// followed by one attempt per fallback model.
    pub fn worst_case_generation_time(&self) -> Duration {
        let fallback_models = u32::try_from(self.fallback.models.len()).unwrap_or(u32::MAX);
        let fallback = self
            .fallback
            .request_timeout()
            .saturating_mul(fallback_models);
        self.retry.total_budget().saturating_add(fallback)
    }

    pub fn workspace_root(&self) -> PathBuf {
        self.workspace_path.clone().unwrap_or_else(|| {
            std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error("Record storage is disabled")]
    StoreDisabled,
    #[error("No record with id {0}")]
    RecordNotFound(RecordId),
    #[error("Record {0} has no report")]
    MissingReport(RecordId),
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    pub primary_configured: bool,
    pub fallback_configured: bool,
    pub store_enabled: bool,
    pub cache: Option<CacheStats>,
}

pub struct MatistSystem {
    config: MatistConfig,
    generator: Arc<TextGenerator>,
    pipeline: PracticalPipeline,
    tutor: TutorAgent,
    compiler: Arc<dyn PdfCompiler>,
}

impl MatistSystem {
    pub fn new(config: MatistConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let generator = Arc::new(TextGenerator::from_config(
            &config.primary,
            &config.fallback,
            &config.retry,
            config.generation.clone(),
        ));
        let steps: Arc<dyn PracticalSteps> = Arc::new(LlmSteps::new(Arc::clone(&generator)));
        let store = config.storage.open(&config.workspace_root());
        let compiler: Arc<dyn PdfCompiler> =
            Arc::new(RemoteLatexCompiler::new(config.compiler.clone()));

        if !generator.primary_configured() {
            warn!("{} is not set; primary provider calls will fail", vars::GEMINI_API_KEY);
        }
        if !generator.has_fallback() {
            info!("Fallback provider not configured");
        }

        Ok(Self::with_components(config, generator, steps, store, compiler))
    }

    /// Assemble from explicit parts, e.g. mock steps in tests.
    pub fn with_components(
        config: MatistConfig,
        generator: Arc<TextGenerator>,
        steps: Arc<dyn PracticalSteps>,
        store: Option<Arc<dyn PracticalStore>>,
        compiler: Arc<dyn PdfCompiler>,
    ) -> Self {
        let mut pipeline = PracticalPipeline::new(steps, config.pipeline.clone());
        if config.cache.enabled {
            pipeline = pipeline.with_cache(Arc::new(ResultCache::new(config.cache.capacity)));
        }
        if let Some(store) = store {
            pipeline = pipeline.with_store(store);
        }

        let tutor = TutorAgent::new(Arc::clone(&generator));

        Self {
            config,
            generator,
            pipeline,
            tutor,
            compiler,
        }
    }

    pub fn config(&self) -> &MatistConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &PracticalPipeline {
        &self.pipeline
    }

    pub async fn process(&self, topic: &str) -> PracticalBundle {
        self.pipeline.process(topic).await
    }

    pub fn process_streaming(&self, topic: &str) -> BoxStream<'static, ProgressEvent> {
        self.pipeline.process_streaming(topic)
    }

    pub async fn chat(&self, messages: &[ChatMessage]) -> TutorReply {
        self.tutor.reply(messages).await
    }

    pub async fn chat_stream(&self, messages: &[ChatMessage]) -> BoxStream<'static, String> {
        self.tutor.reply_stream(messages).await
    }

    /// Most recent stored practicals; empty when storage is disabled.
    pub async fn recent(&self, limit: usize) -> Result<Vec<PracticalSummary>, SystemError> {
        match self.pipeline.store() {
            Some(store) => Ok(store.find_recent(limit).await?),
            None => Ok(Vec::new()),
        }
    }

    pub async fn find(&self, id: RecordId) -> Result<Option<PracticalRecord>, SystemError> {
        let store = self.pipeline.store().ok_or(SystemError::StoreDisabled)?;
        Ok(store.find_by_id(id).await?)
    }

    pub async fn compile_record(&self, id: RecordId) -> Result<Vec<u8>, SystemError> {
        let record = self.find(id).await?.ok_or(SystemError::RecordNotFound(id))?;
        let report = record
            .bundle
            .latex_report
            .as_deref()
            .ok_or(SystemError::MissingReport(id))?;
        Ok(self.compiler.compile(report).await?)
    }

    pub async fn status(&self) -> SystemStatus {
        let cache = match self.pipeline.cache() {
            Some(cache) => Some(cache.stats().await),
            None => None,
        };
        SystemStatus {
            primary_configured: self.generator.primary_configured(),
            fallback_configured: self.generator.has_fallback(),
            store_enabled: self.pipeline.store().is_some(),
            cache,
        }
    }
}

/// Default location of `.matist/records` for a workspace
pub fn default_records_dir(config: &MatistConfig) -> PathBuf {
    config
        .storage
        .path
        .clone()
        .unwrap_or_else(|| env::records_dir_path(&config.workspace_root()))
}
