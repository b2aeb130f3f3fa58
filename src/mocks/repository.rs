use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::models::{Event, Reservation, ReservationStatus, Seat, SeatStatus};
use crate::repository::{ReservationRepository, StoreError};

#[derive(Default)]
struct Tables {
    events: HashMap<Uuid, Event>,
    seats: HashMap<Uuid, Seat>,
    reservations: HashMap<Uuid, Reservation>,
    by_key: HashMap<String, Uuid>,
}

#[derive(Default)]
struct Faults {
    idempotency_lookups: bool,
    listing: bool,
    stale_seat_reads: bool,
    release_for: HashSet<Uuid>,
}

/// Repository backed by hash maps. Each write method runs entirely under one
/// lock, which gives it the same all-or-nothing behavior as a transaction.
#[derive(Default)]
pub struct MemoryReservationRepository {
    tables: Mutex<Tables>,
    faults: Mutex<Faults>,
}

impl MemoryReservationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Unavailable("repository mutex poisoned".into()))
    }

    fn locked(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn faults(&self) -> MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn insert_event(&self, event: Event) {
        self.locked().events.insert(event.id, event);
    }

    pub fn insert_seat(&self, seat: Seat) {
        self.locked().seats.insert(seat.id, seat);
    }

    /// Stores a reservation as-is and points its seats at it, bypassing
    /// availability checks. Meant for fixtures such as already-expired holds.
    pub fn insert_reservation(&self, reservation: Reservation) {
        let mut tables = self.locked();
        let now = Utc::now();
        for seat_id in &reservation.seat_ids {
            if let Some(seat) = tables.seats.get_mut(seat_id) {
                seat.release(now);
                match reservation.status {
                    ReservationStatus::Cancelled => {}
                    ReservationStatus::Pending => {
                        let _ = seat.reserve(reservation.id, reservation.created_at);
                    }
                    ReservationStatus::Confirmed => {
                        let _ = seat.reserve(reservation.id, reservation.created_at);
                        let _ = seat.confirm(now);
                    }
                }
            }
        }
        tables
            .by_key
            .insert(reservation.idempotency_key.clone(), reservation.id);
        tables.reservations.insert(reservation.id, reservation);
    }

    pub fn seat(&self, id: Uuid) -> Option<Seat> {
        self.locked().seats.get(&id).cloned()
    }

    pub fn reservation(&self, id: Uuid) -> Option<Reservation> {
        self.locked().reservations.get(&id).cloned()
    }

    pub fn reservation_count(&self) -> usize {
        self.locked().reservations.len()
    }

    /// Makes idempotency-key lookups fail as if the database were down.
    pub fn fail_idempotency_lookups(&self, fail: bool) {
        self.faults().idempotency_lookups = fail;
    }

    pub fn fail_listing(&self, fail: bool) {
        self.faults().listing = fail;
    }

    /// Seat reads report every seat as available, like a read that raced
    /// with a concurrent claim. The claim itself still sees the truth.
    pub fn serve_stale_seat_reads(&self, stale: bool) {
        self.faults().stale_seat_reads = stale;
    }

    pub fn fail_release_for(&self, reservation_id: Uuid) {
        self.faults().release_for.insert(reservation_id);
    }

    fn unavailable() -> StoreError {
        StoreError::Unavailable("injected failure".into())
    }
}

#[async_trait]
impl ReservationRepository for MemoryReservationRepository {
    async fn get_event(&self, event_id: Uuid) -> Result<Option<Event>, StoreError> {
        Ok(self.tables()?.events.get(&event_id).cloned())
    }

    async fn get_seats_by_event(&self, event_id: Uuid) -> Result<Vec<Seat>, StoreError> {
        let stale = self.faults().stale_seat_reads;
        let mut seats: Vec<Seat> = self
            .tables()?
            .seats
            .values()
            .filter(|s| s.event_id == event_id)
            .cloned()
            .collect();
        if stale {
            for seat in &mut seats {
                seat.status = SeatStatus::Available;
                seat.reserved_by = None;
                seat.reserved_at = None;
            }
        }
        seats.sort_by(|a, b| a.seat_number.cmp(&b.seat_number));
        Ok(seats)
    }

    async fn get_available_seats_by_event(&self, event_id: Uuid) -> Result<Vec<Seat>, StoreError> {
        let mut seats = self.get_seats_by_event(event_id).await?;
        seats.retain(Seat::is_available);
        Ok(seats)
    }

    async fn count_available_seats(&self, event_id: Uuid) -> Result<i64, StoreError> {
        let count = self
            .tables()?
            .seats
            .values()
            .filter(|s| s.event_id == event_id && s.is_available())
            .count();
        Ok(count as i64)
    }

    async fn get_reservation(&self, id: Uuid) -> Result<Option<Reservation>, StoreError> {
        Ok(self.tables()?.reservations.get(&id).cloned())
    }

    async fn get_by_idempotency_key(&self, key: &str) -> Result<Option<Reservation>, StoreError> {
        if self.faults().idempotency_lookups {
            return Err(Self::unavailable());
        }
        let tables = self.tables()?;
        Ok(tables
            .by_key
            .get(key)
            .and_then(|id| tables.reservations.get(id))
            .cloned())
    }

    async fn list_by_user(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Reservation>, StoreError> {
        let mut found: Vec<Reservation> = self
            .tables()?
            .reservations
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn list_expired_pending(
        &self,
        now: DateTime<Utc>,
        created_before: DateTime<Utc>,
    ) -> Result<Vec<Reservation>, StoreError> {
        if self.faults().listing {
            return Err(Self::unavailable());
        }
        let mut found: Vec<Reservation> = self
            .tables()?
            .reservations
            .values()
            .filter(|r| r.is_pending() && (r.expires_at <= now || r.created_at < created_before))
            .cloned()
            .collect();
        found.sort_by_key(|r| r.expires_at);
        Ok(found)
    }

    async fn insert_and_claim(&self, reservation: &Reservation) -> Result<(), StoreError> {
        let mut tables = self.tables()?;

        if tables.by_key.contains_key(&reservation.idempotency_key) {
            return Err(StoreError::DuplicateIdempotencyKey(
                reservation.idempotency_key.clone(),
            ));
        }

        let requested = reservation.seat_ids.len();
        let claimable = reservation
            .seat_ids
            .iter()
            .filter_map(|id| tables.seats.get(id))
            .filter(|s| s.event_id == reservation.event_id && s.is_available())
            .count();
        if claimable < requested {
            return Err(StoreError::SeatsUnavailable {
                requested,
                claimed: claimable,
            });
        }

        for id in &reservation.seat_ids {
            if let Some(seat) = tables.seats.get_mut(id) {
                seat.reserve(reservation.id, reservation.created_at)
                    .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            }
        }
        tables
            .by_key
            .insert(reservation.idempotency_key.clone(), reservation.id);
        tables.reservations.insert(reservation.id, reservation.clone());
        Ok(())
    }

    async fn confirm_and_persist(&self, reservation: &Reservation) -> Result<(), StoreError> {
        let mut tables = self.tables()?;

        let still_pending = tables
            .reservations
            .get(&reservation.id)
            .is_some_and(Reservation::is_pending);
        if !still_pending {
            return Err(StoreError::ReservationNotPending(reservation.id));
        }

        let requested = reservation.seat_ids.len();
        let matched = reservation
            .seat_ids
            .iter()
            .filter_map(|id| tables.seats.get(id))
            .filter(|s| s.status == SeatStatus::Reserved && s.reserved_by == Some(reservation.id))
            .count();
        if matched < requested {
            return Err(StoreError::SeatsNotReserved { requested, matched });
        }

        let now = reservation.confirmed_at.unwrap_or(reservation.updated_at);
        for id in &reservation.seat_ids {
            if let Some(seat) = tables.seats.get_mut(id) {
                seat.confirm(now)
                    .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            }
        }
        tables.reservations.insert(reservation.id, reservation.clone());
        Ok(())
    }

    async fn release_and_persist(&self, reservation: &Reservation) -> Result<(), StoreError> {
        if self.faults().release_for.contains(&reservation.id) {
            return Err(Self::unavailable());
        }
        let mut tables = self.tables()?;

        let still_pending = tables
            .reservations
            .get(&reservation.id)
            .is_some_and(Reservation::is_pending);
        if !still_pending {
            return Err(StoreError::ReservationNotPending(reservation.id));
        }

        for seat in tables.seats.values_mut() {
            if seat.reserved_by == Some(reservation.id) {
                seat.release(reservation.updated_at);
            }
        }
        tables.reservations.insert(reservation.id, reservation.clone());
        Ok(())
    }
}
