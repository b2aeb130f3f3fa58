mod common;

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;

use common::{fixture, settings, Fixture, SEAT_PRICE};
use seat_reservation::cache::CacheService;
use seat_reservation::error::{ErrorKind, ReservationError};
use seat_reservation::lock::{LockManager, RetryPolicy};
use seat_reservation::mocks::UnavailableKvStore;
use seat_reservation::models::{
    Event, Reservation, ReservationStateError, ReservationStatus, Seat, SeatStatus,
};
use seat_reservation::services::reservation::seat_lock_key;
use seat_reservation::services::{ExpirationSweeper, ReservationService, ReservationSettings};

fn expired_hold(fx: &Fixture, seat: &Seat, user: &str, key: &str) -> Reservation {
    let reservation = Reservation::new(
        fx.event.id,
        user,
        key,
        vec![seat.id],
        seat.price,
        ChronoDuration::minutes(15),
        Utc::now() - ChronoDuration::minutes(20),
    );
    fx.repo.insert_reservation(reservation.clone());
    reservation
}

async fn race_for_one_seat(fx: &Fixture, service: ReservationService, contenders: usize) {
    let seat_id = fx.seats[0].id;
    let mut tasks = Vec::new();
    for i in 0..contenders {
        let service = service.clone();
        let req = fx.request(&format!("user-{i}"), &format!("key-{i}"), vec![seat_id]);
        tasks.push(tokio::spawn(async move { service.create_reservation(req).await }));
    }

    let mut winners = Vec::new();
    for task in tasks {
        match task.await.unwrap() {
            Ok(reservation) => winners.push(reservation),
            Err(e) => assert_eq!(e.kind(), ErrorKind::Conflict, "unexpected error: {e}"),
        }
    }

    assert_eq!(winners.len(), 1);
    let seat = fx.repo.seat(seat_id).unwrap();
    assert_eq!(seat.status, SeatStatus::Reserved);
    assert_eq!(seat.reserved_by, Some(winners[0].id));
    assert_eq!(fx.repo.reservation_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn one_winner_per_seat_with_locks() {
    let fx = fixture(1);
    race_for_one_seat(&fx, fx.service(), 10).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn one_winner_per_seat_without_locks() {
    let fx = fixture(1);
    race_for_one_seat(&fx, fx.bare_service(), 10).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_duplicates_share_one_reservation() {
    let fx = fixture(3);
    let service = fx.service();
    let seat_ids = fx.seat_ids(0..2);

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let service = service.clone();
        let req = fx.request("alice", "same-key", seat_ids.clone());
        tasks.push(tokio::spawn(async move { service.create_reservation(req).await }));
    }

    let mut ids = Vec::new();
    for task in tasks {
        ids.push(task.await.unwrap().unwrap().id);
    }
    ids.dedup();
    assert_eq!(ids.len(), 1);
    assert_eq!(fx.repo.reservation_count(), 1);
    assert_eq!(fx.seat_service().count_available_seats(fx.event.id).await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_duplicates_without_locks() {
    let fx = fixture(2);
    let service = fx.bare_service();
    let seat_ids = fx.seat_ids(0..1);

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let service = service.clone();
        let req = fx.request("alice", "k", seat_ids.clone());
        tasks.push(tokio::spawn(async move { service.create_reservation(req).await }));
    }

    let mut ids = Vec::new();
    for task in tasks {
        ids.push(task.await.unwrap().unwrap().id);
    }
    ids.dedup();
    assert_eq!(ids.len(), 1);
    assert_eq!(fx.repo.reservation_count(), 1);
}

#[tokio::test]
async fn replay_returns_the_stored_reservation() {
    let fx = fixture(2);
    let service = fx.service();

    let first = service
        .create_reservation(fx.request("alice", "k1", fx.seat_ids(0..1)))
        .await
        .unwrap();

    // the replay names different seats; the stored reservation wins
    let again = service
        .create_reservation(fx.request("alice", "k1", fx.seat_ids(1..2)))
        .await
        .unwrap();
    assert_eq!(again, first);
    assert!(fx.repo.seat(fx.seats[1].id).unwrap().is_available());

    let err = service
        .create_reservation(fx.request("mallory", "k1", fx.seat_ids(0..1)))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(matches!(err, ReservationError::IdempotencyKeyConflict));
}

#[tokio::test]
async fn multi_seat_claim_is_all_or_nothing() {
    let fx = fixture(3);
    let service = fx.service();

    service
        .create_reservation(fx.request("bob", "bob-1", fx.seat_ids(1..2)))
        .await
        .unwrap();

    let err = service
        .create_reservation(fx.request("alice", "alice-1", fx.seat_ids(0..3)))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    assert!(fx.repo.seat(fx.seats[0].id).unwrap().is_available());
    assert!(fx.repo.seat(fx.seats[2].id).unwrap().is_available());
    assert_eq!(fx.repo.reservation_count(), 1);
}

#[tokio::test]
async fn stale_read_is_caught_by_the_claim() {
    let fx = fixture(2);
    let service = fx.bare_service();

    let winner = service
        .create_reservation(fx.request("alice", "a", fx.seat_ids(0..2)))
        .await
        .unwrap();

    fx.repo.serve_stale_seat_reads(true);
    let err = service
        .create_reservation(fx.request("bob", "b", fx.seat_ids(1..2)))
        .await
        .unwrap_err();
    assert!(matches!(err, ReservationError::SeatAlreadyReserved));

    assert_eq!(fx.repo.reservation_count(), 1);
    for seat in &fx.seats {
        assert_eq!(fx.repo.seat(seat.id).unwrap().reserved_by, Some(winner.id));
    }
}

#[tokio::test]
async fn kv_outage_degrades_to_store_only() {
    let fx = fixture(2);
    let kv = Arc::new(UnavailableKvStore);
    let service = ReservationService::new(fx.repo.clone(), settings())
        .with_lock_manager(LockManager::new(kv.clone()))
        .with_cache(CacheService::new(kv));

    let reservation = service
        .create_reservation(fx.request("alice", "k", fx.seat_ids(0..1)))
        .await
        .unwrap();
    assert_eq!(reservation.status, ReservationStatus::Pending);

    service.cancel_reservation(reservation.id).await.unwrap();
    assert!(fx.repo.seat(fx.seats[0].id).unwrap().is_available());
}

#[tokio::test]
async fn held_lock_makes_the_request_busy() {
    let fx = fixture(1);
    let seat_ids = fx.seat_ids(0..1);

    let other_process = LockManager::new(fx.kv.clone());
    let _held = other_process
        .acquire(&seat_lock_key(&seat_ids), Duration::from_secs(30))
        .await
        .unwrap();

    let impatient = ReservationSettings {
        lock: RetryPolicy {
            ttl: Duration::from_secs(5),
            max_retries: 3,
            retry_delay: Duration::from_millis(5),
        },
        ..settings()
    };
    let service = ReservationService::new(fx.repo.clone(), impatient)
        .with_lock_manager(LockManager::new(fx.kv.clone()));

    let err = service
        .create_reservation(fx.request("alice", "k", seat_ids))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ResourceBusy);
    assert!(fx.repo.seat(fx.seats[0].id).unwrap().is_available());
}

#[tokio::test]
async fn lock_wait_is_bounded_by_timeout() {
    let fx = fixture(1);
    let seat_ids = fx.seat_ids(0..1);
    let _held = LockManager::new(fx.kv.clone())
        .acquire(&seat_lock_key(&seat_ids), Duration::from_secs(30))
        .await
        .unwrap();

    let settings = ReservationSettings {
        lock: RetryPolicy {
            ttl: Duration::from_secs(5),
            max_retries: 10_000,
            retry_delay: Duration::from_millis(10),
        },
        lock_timeout: Duration::from_millis(100),
        ..settings()
    };
    let service = ReservationService::new(fx.repo.clone(), settings)
        .with_lock_manager(LockManager::new(fx.kv.clone()));

    let started = std::time::Instant::now();
    let err = service
        .create_reservation(fx.request("alice", "k", seat_ids))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ResourceBusy);
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn idempotency_lookup_failure_aborts() {
    let fx = fixture(1);
    fx.repo.fail_idempotency_lookups(true);

    let err = fx
        .service()
        .create_reservation(fx.request("alice", "k", fx.seat_ids(0..1)))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Infrastructure);
    assert_eq!(fx.repo.reservation_count(), 0);
    assert!(fx.repo.seat(fx.seats[0].id).unwrap().is_available());
}

#[tokio::test]
async fn lock_is_released_after_each_request() {
    let fx = fixture(2);
    let service = fx.service();
    let seat_ids = fx.seat_ids(0..1);

    service
        .create_reservation(fx.request("alice", "a", seat_ids.clone()))
        .await
        .unwrap();
    let _ = service
        .create_reservation(fx.request("bob", "b", seat_ids.clone()))
        .await
        .unwrap_err();

    assert!(!fx.kv.contains(&format!("lock:{}", seat_lock_key(&seat_ids))));
}

#[tokio::test]
async fn sweeper_frees_expired_holds_for_others() {
    let fx = fixture(1);
    let seat = fx.seats[0].clone();
    let stale = expired_hold(&fx, &seat, "alice", "old-key");
    let service = fx.service();

    let err = service
        .create_reservation(fx.request("bob", "bob-key", vec![seat.id]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let sweeper = ExpirationSweeper::new(
        service.clone(),
        Duration::from_secs(60),
        ChronoDuration::minutes(30),
    );
    assert_eq!(sweeper.sweep_once().await, 1);

    let cancelled = service.get_reservation(stale.id).await.unwrap();
    assert_eq!(cancelled.status, ReservationStatus::Cancelled);
    assert!(fx.repo.seat(seat.id).unwrap().is_available());

    let fresh = service
        .create_reservation(fx.request("bob", "bob-key", vec![seat.id]))
        .await
        .unwrap();
    assert_eq!(fx.repo.seat(seat.id).unwrap().reserved_by, Some(fresh.id));
}

#[tokio::test]
async fn sweep_skips_failures_and_cancels_the_rest() {
    let fx = fixture(3);
    let broken = expired_hold(&fx, &fx.seats[0], "a", "k-a");
    let ok_one = expired_hold(&fx, &fx.seats[1], "b", "k-b");
    fx.repo.fail_release_for(broken.id);

    let cancelled = fx
        .service()
        .cancel_expired_reservations(ChronoDuration::minutes(30))
        .await
        .unwrap();
    assert_eq!(cancelled, 1);
    assert!(fx.repo.reservation(broken.id).unwrap().is_pending());
    assert!(!fx.repo.reservation(ok_one.id).unwrap().is_pending());
}

#[tokio::test]
async fn old_pending_reservations_are_swept_by_age() {
    let fx = fixture(1);
    let service = fx.service();
    let fresh = service
        .create_reservation(fx.request("alice", "k", fx.seat_ids(0..1)))
        .await
        .unwrap();

    // still inside its hold, but older than a zero expire_after window
    tokio::time::sleep(Duration::from_millis(5)).await;
    let cancelled = service
        .cancel_expired_reservations(ChronoDuration::zero())
        .await
        .unwrap();
    assert_eq!(cancelled, 1);
    assert!(!fx.repo.reservation(fresh.id).unwrap().is_pending());
}

#[tokio::test]
async fn terminal_states_reject_further_transitions() {
    let fx = fixture(3);
    let service = fx.service();

    let cancelled = service
        .create_reservation(fx.request("alice", "c", fx.seat_ids(0..1)))
        .await
        .unwrap();
    service.cancel_reservation(cancelled.id).await.unwrap();
    let err = service.confirm_reservation(cancelled.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    let err = service.cancel_reservation(cancelled.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    let confirmed = service
        .create_reservation(fx.request("alice", "d", fx.seat_ids(1..2)))
        .await
        .unwrap();
    service.confirm_reservation(confirmed.id).await.unwrap();
    let err = service.cancel_reservation(confirmed.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert_eq!(fx.repo.seat(fx.seats[1].id).unwrap().status, SeatStatus::Confirmed);

    let expired = expired_hold(&fx, &fx.seats[2], "alice", "e");
    let err = service.confirm_reservation(expired.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert!(matches!(err, ReservationError::State(ReservationStateError::Expired)));
    assert_eq!(fx.repo.seat(fx.seats[2].id).unwrap().status, SeatStatus::Reserved);
}

#[tokio::test]
async fn availability_count_tracks_changes_within_ttl() {
    let fx = fixture(3);
    let service = fx.service();
    let seats = fx.seat_service();

    assert_eq!(seats.count_available_seats(fx.event.id).await.unwrap(), 3);

    let reservation = service
        .create_reservation(fx.request("alice", "k", fx.seat_ids(0..2)))
        .await
        .unwrap();
    assert_eq!(seats.count_available_seats(fx.event.id).await.unwrap(), 1);

    service.cancel_reservation(reservation.id).await.unwrap();
    assert_eq!(seats.count_available_seats(fx.event.id).await.unwrap(), 3);
}

#[tokio::test]
async fn reserve_confirm_then_cancel_scenario() {
    let fx = fixture(1);
    let service = fx.service();

    let a = service
        .create_reservation(fx.request("user-a", "a-1", fx.seat_ids(0..1)))
        .await
        .unwrap();
    assert_eq!(a.status, ReservationStatus::Pending);
    assert_eq!(a.total_amount, SEAT_PRICE);

    let err = service
        .create_reservation(fx.request("user-b", "b-1", fx.seat_ids(0..1)))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let confirmed = service.confirm_reservation(a.id).await.unwrap();
    assert_eq!(confirmed.status, ReservationStatus::Confirmed);
    assert!(confirmed.confirmed_at.is_some());

    let err = service.cancel_reservation(a.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert_eq!(fx.repo.seat(fx.seats[0].id).unwrap().status, SeatStatus::Confirmed);
}

#[tokio::test]
async fn lookups_validate_event_and_seats() {
    let fx = fixture(1);
    let service = fx.service();

    let started = Event::new(
        "Yesterday",
        "Hall",
        Utc::now() - ChronoDuration::hours(1),
        Utc::now() + ChronoDuration::hours(1),
        1,
    );
    let late_seat = Seat::new(started.id, "Z-1", 100);
    fx.repo.insert_event(started.clone());
    fx.repo.insert_seat(late_seat.clone());

    let mut req = fx.request("alice", "late", vec![late_seat.id]);
    req.event_id = started.id;
    let err = service.create_reservation(req).await.unwrap_err();
    assert!(matches!(err, ReservationError::EventNotOpen(_)));
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    let mut req = fx.request("alice", "ghost", fx.seat_ids(0..1));
    req.event_id = uuid::Uuid::new_v4();
    let err = service.create_reservation(req).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    // seat exists, but for another event
    let err = service
        .create_reservation(fx.request("alice", "wrong", vec![late_seat.id]))
        .await
        .unwrap_err();
    assert!(matches!(err, ReservationError::SeatNotFound(_)));

    let err = service.get_reservation(uuid::Uuid::new_v4()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = service
        .create_reservation(fx.request("alice", "", fx.seat_ids(0..1)))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationFailed);
}

#[tokio::test]
async fn user_reservations_are_paged() {
    let fx = fixture(4);
    let service = fx.service();
    for i in 0..3 {
        service
            .create_reservation(fx.request("alice", &format!("k{i}"), fx.seat_ids(i..i + 1)))
            .await
            .unwrap();
    }
    service
        .create_reservation(fx.request("bob", "kb", fx.seat_ids(3..4)))
        .await
        .unwrap();

    assert_eq!(service.get_user_reservations("alice", 0, 0).await.unwrap().len(), 3);
    assert_eq!(service.get_user_reservations("alice", 2, 0).await.unwrap().len(), 2);
    assert_eq!(service.get_user_reservations("alice", 2, 2).await.unwrap().len(), 1);
    assert_eq!(service.get_user_reservations("alice", -5, -1).await.unwrap().len(), 3);
    assert!(service.get_user_reservations("carol", 10, 0).await.unwrap().is_empty());
}

#[tokio::test]
async fn unpriced_seat_cannot_be_reserved() {
    let fx = fixture(1);
    let free = Seat::new(fx.event.id, "F-1", 0);
    fx.repo.insert_seat(free.clone());

    let err = fx
        .service()
        .create_reservation(fx.request("alice", "free", vec![fx.seats[0].id, free.id]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationFailed);
    assert_eq!(fx.repo.reservation_count(), 0);
    assert!(fx.repo.seat(fx.seats[0].id).unwrap().is_available());
}
