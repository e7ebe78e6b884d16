//! Local key-value cache.
//!
//! The cache is an optimisation layer only: values are advisory projections of
//! backend state and may be dropped at any time. A failing cache is logged and
//! treated as a miss, never surfaced to the caller.

pub mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Cache errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Storage backend could not be reached
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Stored value could not be encoded or decoded
    #[error("Corrupt cache entry: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// String key-value storage
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Write a value, replacing any previous one
    async fn put(&self, key: &str, value: String) -> StoreResult<()>;

    /// Delete a value; missing keys are not an error
    async fn remove(&self, key: &str) -> StoreResult<()>;
}

/// JSON envelope stored under every key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedEntry<T> {
    pub value: T,
    pub cached_at: DateTime<Utc>,
}

/// Cache key of a student's one-time code
pub fn otc_key(student_id: i64) -> String {
    format!("otc:{student_id}")
}

/// Cache key of a student's QR token
pub fn qr_key(student_id: i64) -> String {
    format!("qr:{student_id}")
}

/// Cache key of a biometric enrollment marker
pub fn biometric_key(student_id: i64, kind: impl std::fmt::Display) -> String {
    format!("biometric:{student_id}:{kind}")
}

/// Read and decode an entry; any failure is logged and reported as a miss
pub async fn load<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Option<CachedEntry<T>> {
    let raw = match store.get(key).await {
        Ok(raw) => raw?,
        Err(e) => {
            log::warn!("Cache read failed for {}: {}", key, e);
            return None;
        }
    };

    match serde_json::from_str(&raw) {
        Ok(entry) => Some(entry),
        Err(e) => {
            log::warn!("Discarding undecodable cache entry {}: {}", key, e);
            discard(store, key).await;
            None
        }
    }
}

/// Encode and write an entry; failures are logged only
pub async fn save<T: Serialize>(
    store: &dyn KeyValueStore,
    key: &str,
    value: T,
    cached_at: DateTime<Utc>,
) {
    let entry = CachedEntry { value, cached_at };
    let raw = match serde_json::to_string(&entry) {
        Ok(raw) => raw,
        Err(e) => {
            log::warn!("Cache encode failed for {}: {}", key, e);
            return;
        }
    };

    if let Err(e) = store.put(key, raw).await {
        log::warn!("Cache write failed for {}: {}", key, e);
    }
}

/// Delete an entry; failures are logged only
pub async fn discard(store: &dyn KeyValueStore, key: &str) {
    if let Err(e) = store.remove(key).await {
        log::warn!("Cache delete failed for {}: {}", key, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_save_then_load() {
        let store = MemoryStore::new();
        let at = Utc.with_ymd_and_hms(2025, 3, 10, 7, 0, 0).unwrap();
        save(&store, "otc:1", "123456".to_string(), at).await;

        let entry: CachedEntry<String> = load(&store, "otc:1").await.unwrap();
        assert_eq!(entry.value, "123456");
        assert_eq!(entry.cached_at, at);
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_a_miss_and_evicted() {
        let store = MemoryStore::new();
        store.put("qr:1", "not json".to_string()).await.unwrap();

        let entry: Option<CachedEntry<String>> = load(&store, "qr:1").await;
        assert!(entry.is_none());
        assert!(store.get("qr:1").await.unwrap().is_none());
    }

    #[test]
    fn test_key_owners_are_distinct() {
        assert_eq!(otc_key(42), "otc:42");
        assert_eq!(qr_key(42), "qr:42");
        assert_eq!(biometric_key(42, "face"), "biometric:42:face");
    }
}
