//! Record store for successfully processed practicals.
//!
//! The pipeline only writes bundles that passed validation; readers list recent
//! summaries or fetch a full record by id.

pub mod file;
pub mod memory;


pub use file::JsonFileStore;
pub use memory::MemoryStore;

use crate::pipeline::PracticalBundle;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

pub type RecordId = Uuid;

/// A persisted bundle with its id and creation time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PracticalRecord {
    pub id: RecordId,
    pub created_at: DateTime<Utc>,
    pub bundle: PracticalBundle,
}

impl PracticalRecord {
    pub fn new(bundle: PracticalBundle) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            bundle,
        }
    }

    pub fn summary(&self) -> PracticalSummary {
        PracticalSummary {
            id: self.id,
            topic: self.bundle.topic.clone(),
            optimization_applicable: self.bundle.optimization_applicable,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PracticalSummary {
    pub id: RecordId,
    pub topic: String,
    pub optimization_applicable: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Corrupt record {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[async_trait]
pub trait PracticalStore: Send + Sync {
    async fn create_record(&self, bundle: &PracticalBundle) -> Result<RecordId, StoreError>;

    /// Newest first, at most `limit` entries.
    async fn find_recent(&self, limit: usize) -> Result<Vec<PracticalSummary>, StoreError>;

    async fn find_by_id(&self, id: RecordId) -> Result<Option<PracticalRecord>, StoreError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    None,
    /// Process-local; records vanish when the process exits
    Memory,
    /// One JSON file per record under `.matist/records`, shared across runs
    #[default]
    Json,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Records directory for the `json` backend; defaults to `.matist/records`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl StorageConfig {
    /// Open the configured store. `workspace_root` anchors the default path.
    pub fn open(&self, workspace_root: &std::path::Path) -> Option<Arc<dyn PracticalStore>> {
        match self.backend {
            StorageBackend::None => None,
            StorageBackend::Memory => Some(Arc::new(MemoryStore::new())),
            StorageBackend::Json => {
                let path = self
                    .path
                    .clone()
                    .unwrap_or_else(|| crate::env::records_dir_path(workspace_root));
                Some(Arc::new(JsonFileStore::new(path)))
            }
        }
    }
}
