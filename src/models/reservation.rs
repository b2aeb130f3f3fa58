use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use super::UnknownStatus;

/// Default hold length for a pending reservation.
pub const HOLD_DURATION_MINUTES: i64 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Confirmed => "confirmed",
            ReservationStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReservationStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReservationStatus::Pending),
            "confirmed" => Ok(ReservationStatus::Confirmed),
            "cancelled" => Ok(ReservationStatus::Cancelled),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReservationStateError {
    #[error("reservation is not pending")]
    NotPending,
    #[error("reservation has expired")]
    Expired,
    #[error("reservation is already cancelled")]
    AlreadyCancelled,
    #[error("reservation is already confirmed")]
    AlreadyConfirmed,
    #[error("user id is required")]
    UserIdRequired,
    #[error("at least one seat is required")]
    SeatIdsRequired,
    #[error("seat ids must be unique")]
    DuplicateSeatIds,
    #[error("idempotency key is required")]
    IdempotencyKeyRequired,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Uuid,
    pub event_id: Uuid,
    pub user_id: String,
    pub seat_ids: Vec<Uuid>,
    pub status: ReservationStatus,
    pub idempotency_key: String,
    /// Sum of seat prices at creation, minor currency units.
    pub total_amount: i64,
    pub expires_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    pub fn new(
        event_id: Uuid,
        user_id: impl Into<String>,
        idempotency_key: impl Into<String>,
        seat_ids: Vec<Uuid>,
        total_amount: i64,
        hold: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_id,
            user_id: user_id.into(),
            seat_ids,
            status: ReservationStatus::Pending,
            idempotency_key: idempotency_key.into(),
            total_amount,
            expires_at: now + hold,
            confirmed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn validate(&self) -> Result<(), ReservationStateError> {
        if self.user_id.trim().is_empty() {
            return Err(ReservationStateError::UserIdRequired);
        }
        if self.seat_ids.is_empty() {
            return Err(ReservationStateError::SeatIdsRequired);
        }
        let unique: HashSet<&Uuid> = self.seat_ids.iter().collect();
        if unique.len() != self.seat_ids.len() {
            return Err(ReservationStateError::DuplicateSeatIds);
        }
        if self.idempotency_key.trim().is_empty() {
            return Err(ReservationStateError::IdempotencyKeyRequired);
        }
        Ok(())
    }

    pub fn is_pending(&self) -> bool {
        self.status == ReservationStatus::Pending
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn confirm(&mut self, now: DateTime<Utc>) -> Result<(), ReservationStateError> {
        if self.status != ReservationStatus::Pending {
            return Err(ReservationStateError::NotPending);
        }
        if self.is_expired(now) {
            return Err(ReservationStateError::Expired);
        }
        self.status = ReservationStatus::Confirmed;
        self.confirmed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Confirmed reservations are never cancelled here; refunds live elsewhere.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), ReservationStateError> {
        match self.status {
            ReservationStatus::Cancelled => Err(ReservationStateError::AlreadyCancelled),
            ReservationStatus::Confirmed => Err(ReservationStateError::AlreadyConfirmed),
            ReservationStatus::Pending => {
                self.status = ReservationStatus::Cancelled;
                self.updated_at = now;
                Ok(())
            }
        }
    }
}
