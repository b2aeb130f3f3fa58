use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::kv::{CacheStore, CoordinationStore, KvError};

struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Key-value store with Redis-like expiry semantics.
#[derive(Default)]
pub struct MemoryKvStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> Result<MutexGuard<'_, HashMap<String, Entry>>, KvError> {
        self.entries
            .lock()
            .map_err(|_| KvError::Unavailable("kv mutex poisoned".into()))
    }

    /// Live (unexpired) keys only.
    pub fn contains(&self, key: &str) -> bool {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(key).is_some_and(|e| e.is_live(Instant::now()))
    }

    fn live_value<'a>(entries: &'a HashMap<String, Entry>, key: &str) -> Option<&'a str> {
        entries
            .get(key)
            .filter(|e| e.is_live(Instant::now()))
            .map(|e| e.value.as_str())
    }
}

#[async_trait]
impl CoordinationStore for MemoryKvStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, KvError> {
        let mut entries = self.entries()?;
        if Self::live_value(&entries, key).is_some() {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(true)
    }

    async fn delete_if_equals(&self, key: &str, value: &str) -> Result<bool, KvError> {
        let mut entries = self.entries()?;
        if Self::live_value(&entries, key) != Some(value) {
            return Ok(false);
        }
        entries.remove(key);
        Ok(true)
    }

    async fn expire_if_equals(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, KvError> {
        let mut entries = self.entries()?;
        if Self::live_value(&entries, key) != Some(value) {
            return Ok(false);
        }
        if let Some(entry) = entries.get_mut(key) {
            entry.expires_at = Instant::now() + ttl;
        }
        Ok(true)
    }
}

#[async_trait]
impl CacheStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let entries = self.entries()?;
        Ok(Self::live_value(&entries, key).map(str::to_string))
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), KvError> {
        let mut entries = self.entries()?;
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        self.entries()?.remove(key);
        Ok(())
    }
}

/// Every call fails, standing in for an unreachable Redis.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableKvStore;

fn unavailable<T>() -> Result<T, KvError> {
    Err(KvError::Unavailable("connection refused".into()))
}

#[async_trait]
impl CoordinationStore for UnavailableKvStore {
    async fn set_if_absent(&self, _: &str, _: &str, _: Duration) -> Result<bool, KvError> {
        unavailable()
    }

    async fn delete_if_equals(&self, _: &str, _: &str) -> Result<bool, KvError> {
        unavailable()
    }

    async fn expire_if_equals(&self, _: &str, _: &str, _: Duration) -> Result<bool, KvError> {
        unavailable()
    }
}

#[async_trait]
impl CacheStore for UnavailableKvStore {
    async fn get(&self, _: &str) -> Result<Option<String>, KvError> {
        unavailable()
    }

    async fn set_with_ttl(&self, _: &str, _: &str, _: Duration) -> Result<(), KvError> {
        unavailable()
    }

    async fn delete(&self, _: &str) -> Result<(), KvError> {
        unavailable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn entries_expire() {
        let store = MemoryKvStore::new();
        store.set_with_ttl("a", "1", Duration::from_millis(20)).await.unwrap();
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("1"));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.get("a").await.unwrap(), None);
        assert!(store.set_if_absent("a", "2", Duration::from_secs(1)).await.unwrap());
    }

    #[tokio::test]
    async fn compare_operations_check_value() {
        let store = MemoryKvStore::new();
        store.set_if_absent("k", "mine", Duration::from_secs(1)).await.unwrap();

        assert!(!store.delete_if_equals("k", "theirs").await.unwrap());
        assert!(!store.expire_if_equals("k", "theirs", Duration::from_secs(5)).await.unwrap());
        assert!(store.delete_if_equals("k", "mine").await.unwrap());
        assert!(!store.contains("k"));
    }
}
