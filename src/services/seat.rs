use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache::availability::AVAILABILITY_TTL;
use crate::cache::{CacheError, CacheService};
use crate::error::ReservationError;
use crate::models::Seat;
use crate::repository::ReservationRepository;

/// Read side for seats. Counts go through the availability cache when one
/// is configured; cache trouble only costs a repository read.
#[derive(Clone)]
pub struct SeatService {
    repo: Arc<dyn ReservationRepository>,
    cache: Option<CacheService>,
    cache_ttl: Duration,
}

impl SeatService {
    pub fn new(repo: Arc<dyn ReservationRepository>) -> Self {
        Self {
            repo,
            cache: None,
            cache_ttl: AVAILABILITY_TTL,
        }
    }

    pub fn with_cache(mut self, cache: CacheService, ttl: Duration) -> Self {
        self.cache = Some(cache);
        self.cache_ttl = ttl;
        self
    }

    async fn ensure_event(&self, event_id: Uuid) -> Result<(), ReservationError> {
        match self.repo.get_event(event_id).await? {
            Some(_) => Ok(()),
            None => Err(ReservationError::EventNotFound(event_id)),
        }
    }

    pub async fn list_seats(&self, event_id: Uuid) -> Result<Vec<Seat>, ReservationError> {
        self.ensure_event(event_id).await?;
        Ok(self.repo.get_seats_by_event(event_id).await?)
    }

    pub async fn list_available_seats(&self, event_id: Uuid) -> Result<Vec<Seat>, ReservationError> {
        self.ensure_event(event_id).await?;
        Ok(self.repo.get_available_seats_by_event(event_id).await?)
    }

    pub async fn count_available_seats(&self, event_id: Uuid) -> Result<i64, ReservationError> {
        if let Some(cache) = &self.cache {
            match cache.get_available_count(event_id).await {
                Ok(count) => return Ok(count),
                Err(CacheError::Miss) => debug!(%event_id, "Availability cache miss"),
                Err(e) => warn!(%event_id, error = %e, "Availability cache read failed"),
            }
        }

        self.ensure_event(event_id).await?;
        let count = self.repo.count_available_seats(event_id).await?;

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.set_available_count(event_id, count, self.cache_ttl).await {
                warn!(%event_id, error = %e, "Availability cache write failed");
            }
        }
        Ok(count)
    }
}
