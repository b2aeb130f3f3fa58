use thiserror::Error;
use uuid::Uuid;

use crate::models::{ReservationStateError, SeatStateError};
use crate::repository::StoreError;

/// Coarse classification callers branch on (and the HTTP layer maps to
/// status codes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    InvalidState,
    ResourceBusy,
    ValidationFailed,
    Infrastructure,
}

#[derive(Debug, Error)]
pub enum ReservationError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("event {0} not found")]
    EventNotFound(Uuid),

    #[error("seat {0} not found for this event")]
    SeatNotFound(Uuid),

    #[error("reservation {0} not found")]
    ReservationNotFound(Uuid),

    #[error("one or more seats are already reserved")]
    SeatAlreadyReserved,

    #[error("idempotency key is already used by another user")]
    IdempotencyKeyConflict,

    #[error("event {0} is no longer open for booking")]
    EventNotOpen(Uuid),

    #[error("seats are no longer held by this reservation")]
    SeatNotReserved,

    #[error(transparent)]
    State(ReservationStateError),

    #[error("seats are being reserved by another request, try again")]
    ResourceBusy,

    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

impl ReservationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::ValidationFailed,
            Self::EventNotFound(_) | Self::SeatNotFound(_) | Self::ReservationNotFound(_) => {
                ErrorKind::NotFound
            }
            Self::SeatAlreadyReserved | Self::IdempotencyKeyConflict => ErrorKind::Conflict,
            Self::EventNotOpen(_) | Self::SeatNotReserved => ErrorKind::InvalidState,
            Self::State(e) => match e {
                ReservationStateError::UserIdRequired
                | ReservationStateError::SeatIdsRequired
                | ReservationStateError::DuplicateSeatIds
                | ReservationStateError::IdempotencyKeyRequired => ErrorKind::ValidationFailed,
                _ => ErrorKind::InvalidState,
            },
            Self::ResourceBusy => ErrorKind::ResourceBusy,
            Self::Store(_) => ErrorKind::Infrastructure,
        }
    }
}

impl From<ReservationStateError> for ReservationError {
    fn from(e: ReservationStateError) -> Self {
        Self::State(e)
    }
}

impl From<SeatStateError> for ReservationError {
    fn from(e: SeatStateError) -> Self {
        match e {
            SeatStateError::NotAvailable => Self::SeatAlreadyReserved,
            SeatStateError::NotReserved => Self::SeatNotReserved,
            SeatStateError::SeatNumberRequired | SeatStateError::InvalidPrice => {
                Self::Validation(e.to_string())
            }
        }
    }
}

impl From<validator::ValidationErrors> for ReservationError {
    fn from(e: validator::ValidationErrors) -> Self {
        Self::Validation(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_split_between_validation_and_state() {
        assert_eq!(
            ReservationError::from(ReservationStateError::DuplicateSeatIds).kind(),
            ErrorKind::ValidationFailed
        );
        assert_eq!(
            ReservationError::from(ReservationStateError::Expired).kind(),
            ErrorKind::InvalidState
        );
        assert_eq!(
            ReservationError::from(ReservationStateError::AlreadyConfirmed).kind(),
            ErrorKind::InvalidState
        );
    }

    #[test]
    fn seat_errors_keep_their_kind() {
        assert_eq!(
            ReservationError::from(SeatStateError::InvalidPrice).kind(),
            ErrorKind::ValidationFailed
        );
        assert_eq!(
            ReservationError::from(SeatStateError::NotAvailable).kind(),
            ErrorKind::Conflict
        );
    }

    #[test]
    fn store_errors_are_infrastructure() {
        let err = ReservationError::from(StoreError::Unavailable("down".into()));
        assert_eq!(err.kind(), ErrorKind::Infrastructure);
    }
}
