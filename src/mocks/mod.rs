//! In-memory collaborators for tests and local runs without Redis/Postgres.
//!
//! They honor the same atomicity contracts as the real stores: every
//! conditional operation happens under one mutex, so racing callers observe
//! exactly one winner.

mod kv;
mod repository;

pub use kv::{MemoryKvStore, UnavailableKvStore};
pub use repository::MemoryReservationRepository;
