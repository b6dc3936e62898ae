//! Bounded result cache keyed by normalized topic.
//!
//! Eviction is FIFO by insertion: reads never refresh an entry's position.
//! Check, evict and insert happen under one lock so concurrent runs cannot
//! double-evict or lose an update.

use crate::pipeline::types::{PracticalBundle, PracticalTopic};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, PracticalBundle>,
    order: VecDeque<String>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

#[derive(Debug)]
pub struct ResultCache {
    capacity: usize,
    state: Mutex<CacheState>,
}

impl ResultCache {
    /// A capacity of zero disables storage entirely.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn get(&self, topic: &str) -> Option<PracticalBundle> {
        let key = PracticalTopic::normalize(topic);
        let mut state = self.state.lock().await;
        match state.entries.get(&key).cloned() {
            Some(bundle) => {
                state.hits += 1;
                debug!("Cache hit for '{}'", key);
                Some(bundle)
            }
            None => {
                state.misses += 1;
                None
            }
        }
    }

    /// Insert or replace. Returns the key evicted to make room, if any.
    pub async fn put(&self, topic: &str, bundle: PracticalBundle) -> Option<String> {
        if self.capacity == 0 {
            return None;
        }

        let key = PracticalTopic::normalize(topic);
        let mut state = self.state.lock().await;

        if let Some(existing) = state.entries.get_mut(&key) {
            *existing = bundle;
            return None;
        }

        let mut evicted = None;
        if state.entries.len() >= self.capacity
            && let Some(oldest) = state.order.pop_front()
        {
            state.entries.remove(&oldest);
            state.evictions += 1;
            info!("Cache full ({}), evicted '{}'", self.capacity, oldest);
            evicted = Some(oldest);
        }

        state.order.push_back(key.clone());
        state.entries.insert(key, bundle);
        evicted
    }

    pub async fn contains(&self, topic: &str) -> bool {
        let key = PracticalTopic::normalize(topic);
        self.state.lock().await.entries.contains_key(&key)
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Keys from oldest to newest insertion
    pub async fn keys(&self) -> Vec<String> {
        self.state.lock().await.order.iter().cloned().collect()
    }

    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.entries.clear();
        state.order.clear();
    }

    pub async fn stats(&self) -> CacheStats {
        let state = self.state.lock().await;
        CacheStats {
            entries: state.entries.len(),
            capacity: self.capacity,
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
        }
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(crate::env::defaults::CACHE_CAPACITY)
    }
}
