pub mod event;
pub mod reservation;
pub mod seat;

pub use event::Event;
pub use reservation::{Reservation, ReservationStateError, ReservationStatus, HOLD_DURATION_MINUTES};
pub use seat::{Seat, SeatStateError, SeatStatus};

/// Raised when a status column holds a value outside the known set.
#[derive(Debug, thiserror::Error)]
#[error("unknown status value: {0}")]
pub struct UnknownStatus(pub String);
