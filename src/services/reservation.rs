//! Reservation lifecycle: create, confirm, cancel and the expiry sweep.
//!
//! Creation runs idempotency check, seat lock, advisory validation, then the
//! transactional claim. The lock and the availability cache are both
//! optional; without them the conditional claim in the repository still
//! keeps seats from being handed out twice.

use chrono::{Duration as ChronoDuration, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::cache::CacheService;
use crate::error::ReservationError;
use crate::lock::{DistributedLock, LockError, LockManager, RetryPolicy};
use crate::models::{Reservation, ReservationStateError, HOLD_DURATION_MINUTES};
use crate::repository::{ReservationRepository, StoreError};

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone)]
pub struct CreateReservation {
    pub event_id: Uuid,
    pub user_id: String,
    pub seat_ids: Vec<Uuid>,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, Copy)]
pub struct ReservationSettings {
    pub hold: ChronoDuration,
    pub lock: RetryPolicy,
    /// Upper bound on the whole lock acquisition, retries included.
    pub lock_timeout: Duration,
}

impl Default for ReservationSettings {
    fn default() -> Self {
        Self {
            hold: ChronoDuration::minutes(HOLD_DURATION_MINUTES),
            lock: RetryPolicy {
                ttl: Duration::from_secs(10),
                max_retries: 3,
                retry_delay: Duration::from_millis(100),
            },
            lock_timeout: Duration::from_secs(5),
        }
    }
}

/// `seats:{sha256}` over the sorted ids, so every ordering of one seat set
/// contends on the same key.
pub fn seat_lock_key(seat_ids: &[Uuid]) -> String {
    let mut ids: Vec<String> = seat_ids.iter().map(Uuid::to_string).collect();
    ids.sort();
    let digest = Sha256::digest(ids.join(",").as_bytes());
    format!("seats:{digest:x}")
}

#[derive(Clone)]
pub struct ReservationService {
    repo: Arc<dyn ReservationRepository>,
    locks: Option<LockManager>,
    cache: Option<CacheService>,
    settings: ReservationSettings,
}

impl ReservationService {
    pub fn new(repo: Arc<dyn ReservationRepository>, settings: ReservationSettings) -> Self {
        Self {
            repo,
            locks: None,
            cache: None,
            settings,
        }
    }

    pub fn with_lock_manager(mut self, locks: LockManager) -> Self {
        self.locks = Some(locks);
        self
    }

    pub fn with_cache(mut self, cache: CacheService) -> Self {
        self.cache = Some(cache);
        self
    }

    pub async fn create_reservation(
        &self,
        req: CreateReservation,
    ) -> Result<Reservation, ReservationError> {
        validate_request(&req)?;

        if let Some(existing) = self.find_by_key(&req).await? {
            debug!(reservation_id = %existing.id, "Idempotent replay");
            return Ok(existing);
        }

        let lock = match self.lock_seats(&req.seat_ids).await {
            Ok(lock) => lock,
            // an identical request may be the one holding the lock
            Err(ReservationError::ResourceBusy) => {
                return self.replay_or(&req, ReservationError::ResourceBusy).await;
            }
            Err(e) => return Err(e),
        };

        let result = match self.create_locked(&req).await {
            // a concurrent duplicate of this request may have claimed the seats
            Err(ReservationError::SeatAlreadyReserved) => {
                self.replay_or(&req, ReservationError::SeatAlreadyReserved).await
            }
            other => other,
        };

        if let Some(lock) = lock {
            if let Err(e) = lock.release().await {
                warn!(error = %e, "Failed to release seat lock");
            }
        }

        result
    }

    async fn create_locked(&self, req: &CreateReservation) -> Result<Reservation, ReservationError> {
        // a duplicate may have committed while we waited for the lock
        if let Some(existing) = self.find_by_key(req).await? {
            return Ok(existing);
        }

        let now = Utc::now();
        let event = self
            .repo
            .get_event(req.event_id)
            .await?
            .ok_or(ReservationError::EventNotFound(req.event_id))?;
        if !event.is_booking_open(now) {
            return Err(ReservationError::EventNotOpen(event.id));
        }

        // Advisory: the seats may change before the claim below.
        let seats: HashMap<Uuid, _> = self
            .repo
            .get_seats_by_event(req.event_id)
            .await?
            .into_iter()
            .map(|s| (s.id, s))
            .collect();
        let mut total_amount = 0;
        for seat_id in &req.seat_ids {
            let seat = seats
                .get(seat_id)
                .ok_or(ReservationError::SeatNotFound(*seat_id))?;
            if !seat.is_available() {
                return Err(ReservationError::SeatAlreadyReserved);
            }
            seat.validate()?;
            total_amount += seat.price;
        }

        let reservation = Reservation::new(
            req.event_id,
            req.user_id.clone(),
            req.idempotency_key.clone(),
            req.seat_ids.clone(),
            total_amount,
            self.settings.hold,
            now,
        );
        reservation.validate()?;

        match self.repo.insert_and_claim(&reservation).await {
            Ok(()) => {}
            Err(e @ StoreError::DuplicateIdempotencyKey(_)) => {
                return self.replay_or(req, e.into()).await;
            }
            Err(StoreError::SeatsUnavailable { requested, claimed }) => {
                info!(event_id = %req.event_id, requested, claimed, "Seat claim lost a race");
                return Err(ReservationError::SeatAlreadyReserved);
            }
            Err(e) => return Err(e.into()),
        }

        self.invalidate_availability(reservation.event_id).await;
        info!(
            reservation_id = %reservation.id,
            event_id = %reservation.event_id,
            user_id = %reservation.user_id,
            seats = reservation.seat_ids.len(),
            total_amount = reservation.total_amount,
            "Reservation created"
        );
        Ok(reservation)
    }

    /// Lookup failures abort the request; proceeding could claim seats twice
    /// for one key.
    async fn find_by_key(
        &self,
        req: &CreateReservation,
    ) -> Result<Option<Reservation>, ReservationError> {
        match self.repo.get_by_idempotency_key(&req.idempotency_key).await? {
            Some(existing) if existing.user_id == req.user_id => Ok(Some(existing)),
            Some(_) => Err(ReservationError::IdempotencyKeyConflict),
            None => Ok(None),
        }
    }

    async fn replay_or(
        &self,
        req: &CreateReservation,
        err: ReservationError,
    ) -> Result<Reservation, ReservationError> {
        match self.find_by_key(req).await? {
            Some(existing) => Ok(existing),
            None => Err(err),
        }
    }

    async fn lock_seats(
        &self,
        seat_ids: &[Uuid],
    ) -> Result<Option<DistributedLock>, ReservationError> {
        let Some(locks) = &self.locks else {
            warn!("No lock manager configured, relying on conditional claim");
            return Ok(None);
        };

        let key = seat_lock_key(seat_ids);
        let attempt = locks.acquire_with_retry(&key, self.settings.lock);
        match tokio::time::timeout(self.settings.lock_timeout, attempt).await {
            Ok(Ok(lock)) => Ok(Some(lock)),
            Ok(Err(LockError::NotAcquired)) => Err(ReservationError::ResourceBusy),
            Ok(Err(e)) => {
                warn!(error = %e, key = %key, "Lock store unavailable, proceeding without lock");
                Ok(None)
            }
            Err(_) => {
                warn!(key = %key, "Timed out waiting for seat lock");
                Err(ReservationError::ResourceBusy)
            }
        }
    }

    async fn invalidate_availability(&self, event_id: Uuid) {
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.invalidate(event_id).await {
                warn!(%event_id, error = %e, "Failed to invalidate availability cache");
            }
        }
    }

    pub async fn get_reservation(&self, id: Uuid) -> Result<Reservation, ReservationError> {
        self.repo
            .get_reservation(id)
            .await?
            .ok_or(ReservationError::ReservationNotFound(id))
    }

    pub async fn get_user_reservations(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Reservation>, ReservationError> {
        let limit = match limit {
            l if l <= 0 => DEFAULT_PAGE_SIZE,
            l => l.min(MAX_PAGE_SIZE),
        };
        Ok(self.repo.list_by_user(user_id, limit, offset.max(0)).await?)
    }

    pub async fn confirm_reservation(&self, id: Uuid) -> Result<Reservation, ReservationError> {
        let mut reservation = self.get_reservation(id).await?;
        reservation.confirm(Utc::now())?;

        self.repo
            .confirm_and_persist(&reservation)
            .await
            .map_err(|e| match e {
                StoreError::SeatsNotReserved { .. } => ReservationError::SeatNotReserved,
                StoreError::ReservationNotPending(_) => ReservationStateError::NotPending.into(),
                other => other.into(),
            })?;

        self.invalidate_availability(reservation.event_id).await;
        info!(reservation_id = %id, "Reservation confirmed");
        Ok(reservation)
    }

    pub async fn cancel_reservation(&self, id: Uuid) -> Result<Reservation, ReservationError> {
        let reservation = self.get_reservation(id).await?;
        self.cancel_loaded(reservation).await
    }

    async fn cancel_loaded(
        &self,
        mut reservation: Reservation,
    ) -> Result<Reservation, ReservationError> {
        reservation.cancel(Utc::now())?;

        self.repo
            .release_and_persist(&reservation)
            .await
            .map_err(|e| match e {
                StoreError::ReservationNotPending(_) => ReservationStateError::NotPending.into(),
                other => ReservationError::from(other),
            })?;

        self.invalidate_availability(reservation.event_id).await;
        info!(reservation_id = %reservation.id, "Reservation cancelled");
        Ok(reservation)
    }

    /// Cancels pending reservations whose hold ran out, or that are older
    /// than `expire_after`. Each one is cancelled on its own; a failure is
    /// logged and the rest continue. Returns how many were cancelled.
    pub async fn cancel_expired_reservations(
        &self,
        expire_after: ChronoDuration,
    ) -> Result<usize, ReservationError> {
        let now = Utc::now();
        let expired = self
            .repo
            .list_expired_pending(now, now - expire_after)
            .await?;

        let mut cancelled = 0;
        for reservation in expired {
            let id = reservation.id;
            match self.cancel_loaded(reservation).await {
                Ok(_) => cancelled += 1,
                Err(e) => error!(reservation_id = %id, error = %e, "Failed to cancel expired reservation"),
            }
        }
        Ok(cancelled)
    }
}

fn validate_request(req: &CreateReservation) -> Result<(), ReservationError> {
    if req.user_id.trim().is_empty() {
        return Err(ReservationStateError::UserIdRequired.into());
    }
    if req.idempotency_key.trim().is_empty() {
        return Err(ReservationStateError::IdempotencyKeyRequired.into());
    }
    if req.seat_ids.is_empty() {
        return Err(ReservationStateError::SeatIdsRequired.into());
    }
    let mut ids = req.seat_ids.clone();
    ids.sort();
    ids.dedup();
    if ids.len() != req.seat_ids.len() {
        return Err(ReservationStateError::DuplicateSeatIds.into());
    }
    Ok(())
}
