use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::rate_limit::RateLimitRecord;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("rate limit store unavailable: {0}")]
    Unavailable(String),
}

// Outcome of one read-modify-write on a record
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    // Write this record back
    Admit(RateLimitRecord),
    // Leave the stored record as it was
    Reject { in_window: usize },
}

// `transact` runs `apply` and its write as one atomic step per key.
// `apply` is pure and may be re-run by stores that retry on contention.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<RateLimitRecord>, StoreError>;

    async fn transact(
        &self,
        key: &str,
        apply: &(dyn for<'r> Fn(Option<&'r RateLimitRecord>) -> Decision + Send + Sync),
    ) -> Result<Decision, StoreError>;

    // Keys whose record was last touched before `before_ms`, at most `limit` of them
    async fn find_stale(&self, before_ms: i64, limit: usize) -> Result<Vec<String>, StoreError>;

    // Delete the given keys, skipping any that were touched at or after `before_ms`
    async fn delete_batch(&self, keys: &[String], before_ms: i64) -> Result<usize, StoreError>;
}

// In-process store. The DashMap entry lock serializes writers of one key.
#[derive(Default)]
pub struct MemoryStore {
    records: DashMap<String, RateLimitRecord>,
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

    pub fn insert(&self, key: &str, record: RateLimitRecord) {
        self.records.insert(key.to_string(), record);
    }
}

#[async_trait]
impl RateLimitStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<RateLimitRecord>, StoreError> {
        Ok(self.records.get(key).map(|r| r.value().clone()))
    }

    async fn transact(
        &self,
        key: &str,
        apply: &(dyn for<'r> Fn(Option<&'r RateLimitRecord>) -> Decision + Send + Sync),
    ) -> Result<Decision, StoreError> {
        let decision = match self.records.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                let decision = apply(Some(entry.get()));
                if let Decision::Admit(record) = &decision {
                    *entry.get_mut() = record.clone();
                }
                decision
            }
            Entry::Vacant(entry) => {
                let decision = apply(None);
                if let Decision::Admit(record) = &decision {
                    entry.insert(record.clone());
                }
                decision
            }
        };
        Ok(decision)
    }

    async fn find_stale(&self, before_ms: i64, limit: usize) -> Result<Vec<String>, StoreError> {
        Ok(self
            .records
            .iter()
            .filter(|r| r.last_cleanup_at < before_ms)
            .take(limit)
            .map(|r| r.key().clone())
            .collect())
    }

    async fn delete_batch(&self, keys: &[String], before_ms: i64) -> Result<usize, StoreError> {
        let removed = keys
            .iter()
            .filter(|key| {
                self.records
                    .remove_if(key.as_str(), |_, r| r.last_cleanup_at < before_ms)
                    .is_some()
            })
            .count();
        Ok(removed)
    }
}
