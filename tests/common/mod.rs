#![allow(dead_code)]

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use seat_reservation::cache::CacheService;
use seat_reservation::lock::{LockManager, RetryPolicy};
use seat_reservation::mocks::{MemoryKvStore, MemoryReservationRepository};
use seat_reservation::models::{Event, Seat};
use seat_reservation::services::{
    CreateReservation, ReservationService, ReservationSettings, SeatService,
};

pub const SEAT_PRICE: i64 = 10_000;

pub struct Fixture {
    pub repo: Arc<MemoryReservationRepository>,
    pub kv: Arc<MemoryKvStore>,
    pub event: Event,
    pub seats: Vec<Seat>,
}

/// Lock retries sized so that a handful of contenders always gets through.
pub fn settings() -> ReservationSettings {
    ReservationSettings {
        hold: ChronoDuration::minutes(15),
        lock: RetryPolicy {
            ttl: Duration::from_secs(5),
            max_retries: 200,
            retry_delay: Duration::from_millis(5),
        },
        lock_timeout: Duration::from_secs(5),
    }
}

pub fn fixture(seat_count: usize) -> Fixture {
    let repo = Arc::new(MemoryReservationRepository::new());
    let start = Utc::now() + ChronoDuration::days(7);
    let event = Event::new(
        "Concert",
        "Main Hall",
        start,
        start + ChronoDuration::hours(3),
        seat_count as i32,
    );
    repo.insert_event(event.clone());

    let seats: Vec<Seat> = (1..=seat_count)
        .map(|n| Seat::new(event.id, format!("A-{n}"), SEAT_PRICE))
        .collect();
    for seat in &seats {
        repo.insert_seat(seat.clone());
    }

    Fixture {
        repo,
        kv: Arc::new(MemoryKvStore::new()),
        event,
        seats,
    }
}

impl Fixture {
    pub fn cache(&self) -> CacheService {
        CacheService::new(self.kv.clone())
    }

    /// Service with seat locks and the availability cache.
    pub fn service(&self) -> ReservationService {
        ReservationService::new(self.repo.clone(), settings())
            .with_lock_manager(LockManager::new(self.kv.clone()))
            .with_cache(self.cache())
    }

    /// Service relying on the repository's conditional claim alone.
    pub fn bare_service(&self) -> ReservationService {
        ReservationService::new(self.repo.clone(), settings())
    }

    pub fn seat_service(&self) -> SeatService {
        SeatService::new(self.repo.clone()).with_cache(self.cache(), Duration::from_secs(30))
    }

    pub fn seat_ids(&self, range: std::ops::Range<usize>) -> Vec<Uuid> {
        self.seats[range].iter().map(|s| s.id).collect()
    }

    pub fn request(&self, user: &str, key: &str, seat_ids: Vec<Uuid>) -> CreateReservation {
        CreateReservation {
            event_id: self.event.id,
            user_id: user.to_string(),
            seat_ids,
            idempotency_key: key.to_string(),
        }
    }
}
