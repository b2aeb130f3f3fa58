//! Durable store contract for events, seats and reservations.
//!
//! The store is the single arbiter of conflicting writes. Every method that
//! changes seat state runs as one transaction and relies on conditional
//! updates plus affected-row counts, so callers never need the advisory lock
//! for correctness.

pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Event, Reservation, Seat, UnknownStatus};

pub use postgres::PgReservationRepository;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("idempotency key already exists: {0}")]
    DuplicateIdempotencyKey(String),

    #[error("only {claimed} of {requested} seats could be claimed")]
    SeatsUnavailable { requested: usize, claimed: usize },

    #[error("only {matched} of {requested} seats are held by the reservation")]
    SeatsNotReserved { requested: usize, matched: usize },

    #[error("reservation {0} is no longer pending")]
    ReservationNotPending(Uuid),

    #[error("corrupt row: {0}")]
    Decode(#[from] UnknownStatus),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait ReservationRepository: Send + Sync {
    async fn get_event(&self, event_id: Uuid) -> Result<Option<Event>, StoreError>;

    async fn get_seats_by_event(&self, event_id: Uuid) -> Result<Vec<Seat>, StoreError>;

    async fn get_available_seats_by_event(&self, event_id: Uuid) -> Result<Vec<Seat>, StoreError>;

    async fn count_available_seats(&self, event_id: Uuid) -> Result<i64, StoreError>;

    async fn get_reservation(&self, id: Uuid) -> Result<Option<Reservation>, StoreError>;

    async fn get_by_idempotency_key(&self, key: &str) -> Result<Option<Reservation>, StoreError>;

    /// Newest first.
    async fn list_by_user(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Reservation>, StoreError>;

    /// Pending reservations whose hold ran out at `now`, or that were
    /// created before `created_before`.
    async fn list_expired_pending(
        &self,
        now: DateTime<Utc>,
        created_before: DateTime<Utc>,
    ) -> Result<Vec<Reservation>, StoreError>;

    /// Inserts the reservation and flips exactly its seats from `available`
    /// to `reserved`. All or nothing: if any seat is not available the
    /// transaction is rolled back with [`StoreError::SeatsUnavailable`].
    async fn insert_and_claim(&self, reservation: &Reservation) -> Result<(), StoreError>;

    /// Flips the reservation's seats `reserved -> confirmed` and persists the
    /// confirmed reservation, conditional on it still being pending.
    async fn confirm_and_persist(&self, reservation: &Reservation) -> Result<(), StoreError>;

    /// Returns the reservation's seats to `available` and persists the
    /// cancelled reservation, conditional on it still being pending.
    async fn release_and_persist(&self, reservation: &Reservation) -> Result<(), StoreError>;
}
