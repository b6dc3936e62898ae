use crate::env;
use crate::pipeline::PracticalBundle;
use crate::storage::{PracticalRecord, PracticalStore, PracticalSummary, RecordId, StoreError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs as async_fs;
use tracing::{debug, warn};

/// One pretty-printed JSON file per record inside a directory
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
        move |source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    async fn read_record(path: &Path) -> Result<PracticalRecord, StoreError> {
        let content = async_fs::read(path).await.map_err(Self::io_error(path))?;
        serde_json::from_slice(&content).map_err(|source| StoreError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
    }

    async fn load_all(&self) -> Result<Vec<PracticalRecord>, StoreError> {
        let mut records = Vec::new();
        if !self.dir.exists() {
            return Ok(records);
        }

        let mut entries = async_fs::read_dir(&self.dir)
            .await
            .map_err(Self::io_error(&self.dir))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(Self::io_error(&self.dir))?
        {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            match Self::read_record(&path).await {
                Ok(record) => records.push(record),
                Err(error) => warn!("Skipping unreadable record: {}", error),
            }
        }

        Ok(records)
    }
}

#[async_trait]
impl PracticalStore for JsonFileStore {
    async fn create_record(&self, bundle: &PracticalBundle) -> Result<RecordId, StoreError> {
        async_fs::create_dir_all(&self.dir)
            .await
            .map_err(Self::io_error(&self.dir))?;

        let record = PracticalRecord::new(bundle.clone());
        let final_path = env::record_file_path(&self.dir, &record.id.to_string());
        let temp_path = final_path.with_extension("json.tmp");
        let serialized = serde_json::to_vec_pretty(&record)?;

        // Write then rename so readers never see a half-written record
        async_fs::write(&temp_path, &serialized)
            .await
            .map_err(Self::io_error(&temp_path))?;
        async_fs::rename(&temp_path, &final_path)
            .await
            .map_err(Self::io_error(&final_path))?;

        debug!("Stored record {} at {}", record.id, final_path.display());
        Ok(record.id)
    }

    async fn find_recent(&self, limit: usize) -> Result<Vec<PracticalSummary>, StoreError> {
        let mut records = self.load_all().await?;
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records
            .iter()
            .take(limit)
            .map(PracticalRecord::summary)
            .collect())
    }

    async fn find_by_id(&self, id: RecordId) -> Result<Option<PracticalRecord>, StoreError> {
        let path = env::record_file_path(&self.dir, &id.to_string());
        if !path.exists() {
            return Ok(None);
        }
        Self::read_record(&path).await.map(Some)
    }
}
