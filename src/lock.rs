//! Advisory cross-process locks on top of a [`CoordinationStore`].
//!
//! A lock is the key `lock:{name}` holding a random token. Acquisition is a
//! single set-if-absent with expiry; release and extend only touch the key
//! while it still holds our token, so a holder whose TTL already lapsed can
//! never remove the lock of whoever took it over.
//!
//! Locks here only cut down wasted work. Correctness of seat claims comes
//! from the conditional updates in the durable store.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::kv::{CoordinationStore, KvError};

#[derive(Debug, Error)]
pub enum LockError {
    /// Someone else holds the key.
    #[error("lock is held by another owner")]
    NotAcquired,

    /// Our token is gone: the TTL expired and the key was dropped or reassigned.
    #[error("lock is no longer owned by this holder")]
    NotOwned,

    #[error(transparent)]
    Store(#[from] KvError),
}

/// Retry settings for [`LockManager::acquire_with_retry`].
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub ttl: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

#[derive(Clone)]
pub struct LockManager {
    store: Arc<dyn CoordinationStore>,
}

impl LockManager {
    pub fn new(store: Arc<dyn CoordinationStore>) -> Self {
        Self { store }
    }

    fn lock_key(key: &str) -> String {
        format!("lock:{key}")
    }

    pub async fn acquire(&self, key: &str, ttl: Duration) -> Result<DistributedLock, LockError> {
        let lock_key = Self::lock_key(key);
        let token = Uuid::new_v4().to_string();

        if !self.store.set_if_absent(&lock_key, &token, ttl).await? {
            return Err(LockError::NotAcquired);
        }

        debug!(key = %lock_key, ttl_ms = ttl.as_millis() as u64, "Lock acquired");
        Ok(DistributedLock {
            store: self.store.clone(),
            key: lock_key,
            token,
            ttl,
        })
    }

    /// Retries only while the key is held by someone else; store errors
    /// abort at once. The sleep between attempts is an await point, so
    /// dropping this future (timeout, `select!`) stops further attempts.
    pub async fn acquire_with_retry(
        &self,
        key: &str,
        policy: RetryPolicy,
    ) -> Result<DistributedLock, LockError> {
        let attempts = policy.max_retries.max(1);

        for attempt in 1..=attempts {
            match self.acquire(key, policy.ttl).await {
                Ok(lock) => return Ok(lock),
                Err(LockError::NotAcquired) if attempt < attempts => {
                    debug!(key, attempt, "Lock busy, retrying");
                    tokio::time::sleep(policy.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }

        Err(LockError::NotAcquired)
    }
}

/// A held lock. Dropping it without [`release`](Self::release) leaves the
/// key to expire on its TTL.
pub struct DistributedLock {
    store: Arc<dyn CoordinationStore>,
    key: String,
    token: String,
    ttl: Duration,
}

impl std::fmt::Debug for DistributedLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributedLock")
            .field("key", &self.key)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl DistributedLock {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn release(self) -> Result<(), LockError> {
        if self.store.delete_if_equals(&self.key, &self.token).await? {
            debug!(key = %self.key, "Lock released");
            Ok(())
        } else {
            Err(LockError::NotOwned)
        }
    }

    pub async fn extend(&mut self, ttl: Duration) -> Result<(), LockError> {
        if !self.store.expire_if_equals(&self.key, &self.token, ttl).await? {
            return Err(LockError::NotOwned);
        }
        self.ttl = ttl;
        Ok(())
    }
}
