//! Key-value contracts used by the lock manager and the availability cache.
//!
//! Both are advisory: callers treat every [`KvError`] as "store unavailable"
//! and carry on against the durable store.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KvError {
    #[error(transparent)]
    Redis(#[from] redis::RedisError),

    #[error("key-value store unavailable: {0}")]
    Unavailable(String),
}

/// Atomic primitives a cross-process lock needs.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Sets `key` to `value` with expiry only if the key is absent.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, KvError>;

    /// Deletes `key` only if it still holds `value`.
    async fn delete_if_equals(&self, key: &str, value: &str) -> Result<bool, KvError>;

    /// Resets the expiry of `key` only if it still holds `value`.
    async fn expire_if_equals(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, KvError>;
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), KvError>;

    async fn delete(&self, key: &str) -> Result<(), KvError>;
}
