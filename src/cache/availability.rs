use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use crate::cache::{CacheError, CacheService};

/// Default lifetime of a cached count.
pub const AVAILABILITY_TTL: Duration = Duration::from_secs(30);

fn availability_key(event_id: Uuid) -> String {
    format!("seats:available:{event_id}")
}

impl CacheService {
    pub async fn get_available_count(&self, event_id: Uuid) -> Result<i64, CacheError> {
        let key = availability_key(event_id);
        let raw = self.store.get(&key).await?.ok_or(CacheError::Miss)?;
        let count = raw
            .parse::<i64>()
            .map_err(|_| CacheError::Parse(raw.clone()))?;
        debug!(%event_id, count, "Availability cache hit");
        Ok(count)
    }

    pub async fn set_available_count(
        &self,
        event_id: Uuid,
        count: i64,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        self.store
            .set_with_ttl(&availability_key(event_id), &count.to_string(), ttl)
            .await?;
        Ok(())
    }

    // Unconditional delete: the next read goes to the repository.
    pub async fn invalidate(&self, event_id: Uuid) -> Result<(), CacheError> {
        self.store.delete(&availability_key(event_id)).await?;
        debug!(%event_id, "Availability cache invalidated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::CacheStore;
    use crate::mocks::{MemoryKvStore, UnavailableKvStore};
    use std::sync::Arc;

    #[tokio::test]
    async fn miss_is_not_zero() {
        let cache = CacheService::new(Arc::new(MemoryKvStore::new()));
        let event_id = Uuid::new_v4();

        assert!(matches!(cache.get_available_count(event_id).await, Err(CacheError::Miss)));

        cache.set_available_count(event_id, 0, AVAILABILITY_TTL).await.unwrap();
        assert_eq!(cache.get_available_count(event_id).await.unwrap(), 0);

        cache.invalidate(event_id).await.unwrap();
        assert!(matches!(cache.get_available_count(event_id).await, Err(CacheError::Miss)));
    }

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let cache = CacheService::new(Arc::new(MemoryKvStore::new()));
        let event_id = Uuid::new_v4();

        cache
            .set_available_count(event_id, 12, Duration::from_millis(20))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(matches!(cache.get_available_count(event_id).await, Err(CacheError::Miss)));
    }

    #[tokio::test]
    async fn garbage_values_are_reported() {
        let store = Arc::new(MemoryKvStore::new());
        let cache = CacheService::new(store.clone());
        let event_id = Uuid::new_v4();

        store
            .set_with_ttl(&availability_key(event_id), "lots", AVAILABILITY_TTL)
            .await
            .unwrap();
        assert!(matches!(cache.get_available_count(event_id).await, Err(CacheError::Parse(_))));
    }

    #[tokio::test]
    async fn store_failures_surface_as_store_errors() {
        let cache = CacheService::new(Arc::new(UnavailableKvStore));
        assert!(matches!(
            cache.get_available_count(Uuid::new_v4()).await,
            Err(CacheError::Store(_))
        ));
    }
}
