//! PDF compilation of generated LaTeX reports through a remote compiler service.

use crate::env::defaults;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

const PDF_MAGIC: &[u8] = b"%PDF";

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("compiler rejected the document ({status}): {log}")]
    Rejected { status: u16, log: String },
    #[error("compilation did not finish within {0:?}")]
    Timeout(Duration),
    #[error("could not reach the compiler: {0}")]
    Transport(String),
    #[error("compiler returned something other than a PDF")]
    InvalidOutput,
    #[error("invalid compiler endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),
    #[error("nothing to compile")]
    EmptySource,
}

/// Turns a LaTeX document into PDF bytes
#[async_trait]
pub trait PdfCompiler: Send + Sync {
    async fn compile(&self, source: &str) -> Result<Vec<u8>, CompileError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    pub endpoint: String,
    pub timeout_secs: u64,
}

impl CompilerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            endpoint: defaults::COMPILER_URL.to_string(),
            timeout_secs: defaults::COMPILE_TIMEOUT.as_secs(),
        }
    }
}

/// Client for a latexonline-style service: `GET {endpoint}?text=<source>`
pub struct RemoteLatexCompiler {
    client: Client,
    config: CompilerConfig,
}

impl RemoteLatexCompiler {
    pub fn new(config: CompilerConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn request_url(&self, source: &str) -> Result<Url, CompileError> {
        Ok(Url::parse_with_params(
            &self.config.endpoint,
            [("text", source)],
        )?)
    }
}

pub fn is_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(PDF_MAGIC)
}

#[async_trait]
impl PdfCompiler for RemoteLatexCompiler {
    async fn compile(&self, source: &str) -> Result<Vec<u8>, CompileError> {
        if source.trim().is_empty() {
            return Err(CompileError::EmptySource);
        }

        let url = self.request_url(source)?;
        let timeout = self.config.timeout();
        debug!("Compiling {} bytes of LaTeX", source.len());

        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|error| {
                if error.is_timeout() {
                    CompileError::Timeout(timeout)
                } else {
                    CompileError::Transport(error.to_string())
                }
            })?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|error| CompileError::Transport(error.to_string()))?;

        if !status.is_success() {
            let log = String::from_utf8_lossy(&body).into_owned();
            warn!("LaTeX compilation failed with status {}", status);
            return Err(CompileError::Rejected {
                status: status.as_u16(),
                log,
            });
        }

        if !is_pdf(&body) {
            return Err(CompileError::InvalidOutput);
        }

        Ok(body.to_vec())
    }
}
