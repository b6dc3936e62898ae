use crate::pipeline::PracticalBundle;
use crate::storage::{PracticalRecord, PracticalStore, PracticalSummary, RecordId, StoreError};
use async_trait::async_trait;
use dashmap::DashMap;

/// Process-local store, lost on exit
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: DashMap<RecordId, PracticalRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl PracticalStore for MemoryStore {
    async fn create_record(&self, bundle: &PracticalBundle) -> Result<RecordId, StoreError> {
        let record = PracticalRecord::new(bundle.clone());
        let id = record.id;
        self.records.insert(id, record);
        Ok(id)
    }

    async fn find_recent(&self, limit: usize) -> Result<Vec<PracticalSummary>, StoreError> {
        let mut summaries: Vec<PracticalSummary> = self
            .records
            .iter()
            .map(|entry| entry.value().summary())
            .collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        summaries.truncate(limit);
        Ok(summaries)
    }

    async fn find_by_id(&self, id: RecordId) -> Result<Option<PracticalRecord>, StoreError> {
        Ok(self.records.get(&id).map(|entry| entry.value().clone()))
    }
}
