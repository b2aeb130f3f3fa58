pub mod cleanup;
pub mod reservation;
pub mod seat;

pub use cleanup::{ExpirationSweeper, SweeperHandle};
pub use reservation::{CreateReservation, ReservationService, ReservationSettings};
pub use seat::SeatService;
