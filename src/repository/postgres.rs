use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{ReservationRepository, StoreError};
use crate::database::Database;
use crate::models::{Event, Reservation, Seat};

const SEAT_COLUMNS: &str = "id, event_id, seat_number, status, price, reserved_by, reserved_at, \
                            created_at, updated_at, version";

// seat ids come back in request order through the link table
const RESERVATION_SELECT: &str = r#"
    SELECT r.id, r.event_id, r.user_id, r.status, r.idempotency_key, r.total_amount,
           r.expires_at, r.confirmed_at, r.created_at, r.updated_at,
           ARRAY(
               SELECT rs.seat_id FROM reservation_seats rs
               WHERE rs.reservation_id = r.id
               ORDER BY rs.position
           ) AS seat_ids
    FROM reservations r
"#;

#[derive(FromRow)]
struct SeatRow {
    id: Uuid,
    event_id: Uuid,
    seat_number: String,
    status: String,
    price: i64,
    reserved_by: Option<Uuid>,
    reserved_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i32,
}

impl TryFrom<SeatRow> for Seat {
    type Error = StoreError;

    fn try_from(row: SeatRow) -> Result<Self, Self::Error> {
        Ok(Seat {
            id: row.id,
            event_id: row.event_id,
            seat_number: row.seat_number,
            status: row.status.parse()?,
            price: row.price,
            reserved_by: row.reserved_by,
            reserved_at: row.reserved_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
            version: row.version,
        })
    }
}

#[derive(FromRow)]
struct ReservationRow {
    id: Uuid,
    event_id: Uuid,
    user_id: String,
    status: String,
    idempotency_key: String,
    total_amount: i64,
    expires_at: DateTime<Utc>,
    confirmed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    seat_ids: Vec<Uuid>,
}

impl TryFrom<ReservationRow> for Reservation {
    type Error = StoreError;

    fn try_from(row: ReservationRow) -> Result<Self, Self::Error> {
        Ok(Reservation {
            id: row.id,
            event_id: row.event_id,
            user_id: row.user_id,
            seat_ids: row.seat_ids,
            status: row.status.parse()?,
            idempotency_key: row.idempotency_key,
            total_amount: row.total_amount,
            expires_at: row.expires_at,
            confirmed_at: row.confirmed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_seats(rows: Vec<SeatRow>) -> Result<Vec<Seat>, StoreError> {
    rows.into_iter().map(Seat::try_from).collect()
}

fn into_reservations(rows: Vec<ReservationRow>) -> Result<Vec<Reservation>, StoreError> {
    rows.into_iter().map(Reservation::try_from).collect()
}

#[derive(Clone)]
pub struct PgReservationRepository {
    db: Database,
}

impl PgReservationRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ReservationRepository for PgReservationRepository {
    async fn get_event(&self, event_id: Uuid) -> Result<Option<Event>, StoreError> {
        let event = sqlx::query_as::<_, Event>(
            "SELECT id, name, description, venue, start_at, end_at, total_seats,
                    created_at, updated_at, version
             FROM events WHERE id = $1",
        )
        .bind(event_id)
        .fetch_optional(&self.db.pool)
        .await?;
        Ok(event)
    }

    async fn get_seats_by_event(&self, event_id: Uuid) -> Result<Vec<Seat>, StoreError> {
        let rows = sqlx::query_as::<_, SeatRow>(&format!(
            "SELECT {SEAT_COLUMNS} FROM seats WHERE event_id = $1 ORDER BY seat_number"
        ))
        .bind(event_id)
        .fetch_all(&self.db.pool)
        .await?;
        into_seats(rows)
    }

    async fn get_available_seats_by_event(&self, event_id: Uuid) -> Result<Vec<Seat>, StoreError> {
        let rows = sqlx::query_as::<_, SeatRow>(&format!(
            "SELECT {SEAT_COLUMNS} FROM seats
             WHERE event_id = $1 AND status = 'available'
             ORDER BY seat_number"
        ))
        .bind(event_id)
        .fetch_all(&self.db.pool)
        .await?;
        into_seats(rows)
    }

    async fn count_available_seats(&self, event_id: Uuid) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM seats WHERE event_id = $1 AND status = 'available'",
        )
        .bind(event_id)
        .fetch_one(&self.db.pool)
        .await?;
        Ok(count)
    }

    async fn get_reservation(&self, id: Uuid) -> Result<Option<Reservation>, StoreError> {
        let row = sqlx::query_as::<_, ReservationRow>(&format!("{RESERVATION_SELECT} WHERE r.id = $1"))
            .bind(id)
            .fetch_optional(&self.db.pool)
            .await?;
        row.map(Reservation::try_from).transpose()
    }

    async fn get_by_idempotency_key(&self, key: &str) -> Result<Option<Reservation>, StoreError> {
        let row = sqlx::query_as::<_, ReservationRow>(&format!(
            "{RESERVATION_SELECT} WHERE r.idempotency_key = $1"
        ))
        .bind(key)
        .fetch_optional(&self.db.pool)
        .await?;
        row.map(Reservation::try_from).transpose()
    }

    async fn list_by_user(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Reservation>, StoreError> {
        let rows = sqlx::query_as::<_, ReservationRow>(&format!(
            "{RESERVATION_SELECT} WHERE r.user_id = $1 ORDER BY r.created_at DESC LIMIT $2 OFFSET $3"
        ))
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db.pool)
        .await?;
        into_reservations(rows)
    }

    async fn list_expired_pending(
        &self,
        now: DateTime<Utc>,
        created_before: DateTime<Utc>,
    ) -> Result<Vec<Reservation>, StoreError> {
        let rows = sqlx::query_as::<_, ReservationRow>(&format!(
            "{RESERVATION_SELECT}
             WHERE r.status = 'pending' AND (r.expires_at <= $1 OR r.created_at < $2)
             ORDER BY r.expires_at"
        ))
        .bind(now)
        .bind(created_before)
        .fetch_all(&self.db.pool)
        .await?;
        into_reservations(rows)
    }

    async fn insert_and_claim(&self, reservation: &Reservation) -> Result<(), StoreError> {
        let mut tx = self.db.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO reservations
                (id, event_id, user_id, status, idempotency_key, total_amount,
                 expires_at, confirmed_at, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(reservation.id)
        .bind(reservation.event_id)
        .bind(&reservation.user_id)
        .bind(reservation.status.as_str())
        .bind(&reservation.idempotency_key)
        .bind(reservation.total_amount)
        .bind(reservation.expires_at)
        .bind(reservation.confirmed_at)
        .bind(reservation.created_at)
        .bind(reservation.updated_at)
        .execute(&mut *tx)
        .await;

        if let Err(e) = inserted {
            let duplicate = matches!(&e, sqlx::Error::Database(db) if db.is_unique_violation());
            if let Err(rollback) = tx.rollback().await {
                warn!(error = %rollback, "Rollback after failed insert failed");
            }
            if duplicate {
                return Err(StoreError::DuplicateIdempotencyKey(reservation.idempotency_key.clone()));
            }
            return Err(e.into());
        }

        sqlx::query(
            "INSERT INTO reservation_seats (reservation_id, seat_id, position)
             SELECT $1, t.seat_id, t.ord::INT
             FROM UNNEST($2::UUID[]) WITH ORDINALITY AS t(seat_id, ord)",
        )
        .bind(reservation.id)
        .bind(&reservation.seat_ids)
        .execute(&mut *tx)
        .await?;

        // The conditional update is the real claim: only rows still available flip.
        let claimed = sqlx::query(
            "UPDATE seats
             SET status = 'reserved', reserved_by = $1, reserved_at = $2,
                 updated_at = $2, version = version + 1
             WHERE id = ANY($3) AND event_id = $4 AND status = 'available'",
        )
        .bind(reservation.id)
        .bind(reservation.created_at)
        .bind(&reservation.seat_ids)
        .bind(reservation.event_id)
        .execute(&mut *tx)
        .await?
        .rows_affected() as usize;

        let requested = reservation.seat_ids.len();
        if claimed < requested {
            tx.rollback().await?;
            warn!(
                reservation_id = %reservation.id,
                requested,
                claimed,
                "Seat claim lost the race, rolled back"
            );
            return Err(StoreError::SeatsUnavailable { requested, claimed });
        }

        tx.commit().await?;
        debug!(reservation_id = %reservation.id, seats = requested, "Seats claimed");
        Ok(())
    }

    async fn confirm_and_persist(&self, reservation: &Reservation) -> Result<(), StoreError> {
        let mut tx = self.db.pool.begin().await?;

        // Reservation row before its seats, same order as release_and_persist.
        let updated = sqlx::query(
            "UPDATE reservations
             SET status = $1, confirmed_at = $2, updated_at = $3
             WHERE id = $4 AND status = 'pending'",
        )
        .bind(reservation.status.as_str())
        .bind(reservation.confirmed_at)
        .bind(reservation.updated_at)
        .bind(reservation.id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            tx.rollback().await?;
            return Err(StoreError::ReservationNotPending(reservation.id));
        }

        let matched = sqlx::query(
            "UPDATE seats
             SET status = 'confirmed', updated_at = $2, version = version + 1
             WHERE id = ANY($1) AND reserved_by = $3 AND status = 'reserved'",
        )
        .bind(&reservation.seat_ids)
        .bind(reservation.updated_at)
        .bind(reservation.id)
        .execute(&mut *tx)
        .await?
        .rows_affected() as usize;

        let requested = reservation.seat_ids.len();
        if matched < requested {
            tx.rollback().await?;
            return Err(StoreError::SeatsNotReserved { requested, matched });
        }

        tx.commit().await?;
        Ok(())
    }

    async fn release_and_persist(&self, reservation: &Reservation) -> Result<(), StoreError> {
        let mut tx = self.db.pool.begin().await?;

        // Persist first so a concurrent confirm cannot slip in between.
        let updated = sqlx::query(
            "UPDATE reservations
             SET status = $1, updated_at = $2
             WHERE id = $3 AND status = 'pending'",
        )
        .bind(reservation.status.as_str())
        .bind(reservation.updated_at)
        .bind(reservation.id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            tx.rollback().await?;
            return Err(StoreError::ReservationNotPending(reservation.id));
        }

        let released = sqlx::query(
            "UPDATE seats
             SET status = 'available', reserved_by = NULL, reserved_at = NULL,
                 updated_at = $2, version = version + 1
             WHERE id = ANY($1) AND reserved_by = $3",
        )
        .bind(&reservation.seat_ids)
        .bind(reservation.updated_at)
        .bind(reservation.id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;
        debug!(reservation_id = %reservation.id, released, "Seats released");
        Ok(())
    }
}
