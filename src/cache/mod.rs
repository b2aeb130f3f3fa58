//! Short-lived cached projections. The cache is never the source of truth:
//! every value here can be dropped and rebuilt from the repository.

use std::sync::Arc;
use thiserror::Error;

use crate::kv::{CacheStore, KvError};

pub mod availability;

#[derive(Debug, Error)]
pub enum CacheError {
    /// Nothing cached under the key. Distinct from a cached zero.
    #[error("cache miss")]
    Miss,

    #[error(transparent)]
    Store(#[from] KvError),

    #[error("cached value is malformed: {0}")]
    Parse(String),
}

#[derive(Clone)]
pub struct CacheService {
    store: Arc<dyn CacheStore>,
}

impl CacheService {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }
}
