use std::collections::{BTreeMap, HashMap};

use tokio::sync::RwLock;

use crate::{error::AppResult, models::RecommendationRecord};

/// Access contract for the recommendation store
///
/// `put` is an insert-or-overwrite keyed by `(user_id, model_id)` and always
/// carries the full record. `get_latest` returns the record with the highest
/// `model_id` still held by the store, expired or not; reclaiming stale
/// records is the store's job. `Ok(None)` means no record, which is an
/// expected outcome and not an error.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait RecommendationCache: Send + Sync {
    async fn put(&self, record: &RecommendationRecord) -> AppResult<()>;

    async fn get_latest(&self, user_id: &str) -> AppResult<Option<RecommendationRecord>>;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}

/// Process-local store with the same semantics as the Redis store, minus reclamation
#[derive(Default)]
pub struct InMemoryRecommendationCache {
    records: RwLock<HashMap<String, BTreeMap<i64, RecommendationRecord>>>,
}

impl InMemoryRecommendationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of versions held for a user
    pub async fn version_count(&self, user_id: &str) -> usize {
        self.records
            .read()
            .await
            .get(user_id)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl RecommendationCache for InMemoryRecommendationCache {
    async fn put(&self, record: &RecommendationRecord) -> AppResult<()> {
        let mut records = self.records.write().await;
        records
            .entry(record.user_id.clone())
            .or_default()
            .insert(record.model_id, record.clone());
        Ok(())
    }

    async fn get_latest(&self, user_id: &str) -> AppResult<Option<RecommendationRecord>> {
        let records = self.records.read().await;
        Ok(records
            .get(user_id)
            .and_then(|versions| versions.values().next_back())
            .cloned())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
