use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::controllers::ApiError;
use crate::middleware::UserId;
use crate::models::Reservation;
use crate::services::CreateReservation;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/reservations", post(create_reservation).get(list_reservations))
        .route("/reservations/{id}", get(get_reservation))
        .route("/reservations/{id}/confirm", post(confirm_reservation))
        .route("/reservations/{id}/cancel", post(cancel_reservation))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateReservationRequest {
    pub event_id: Uuid,
    #[validate(length(min = 1, max = 100, message = "between 1 and 100 seats"))]
    pub seat_ids: Vec<Uuid>,
    #[validate(length(min = 1, max = 255))]
    pub idempotency_key: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct Pagination {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

async fn create_reservation(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
    Json(body): Json<CreateReservationRequest>,
) -> Result<(StatusCode, Json<Reservation>), ApiError> {
    body.validate()?;

    let reservation = state
        .reservations
        .create_reservation(CreateReservation {
            event_id: body.event_id,
            user_id,
            seat_ids: body.seat_ids,
            idempotency_key: body.idempotency_key,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(reservation)))
}

async fn list_reservations(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
    Query(page): Query<Pagination>,
) -> Result<Json<Vec<Reservation>>, ApiError> {
    let reservations = state
        .reservations
        .get_user_reservations(&user_id, page.limit.unwrap_or(0), page.offset.unwrap_or(0))
        .await?;
    Ok(Json(reservations))
}

async fn get_reservation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Reservation>, ApiError> {
    Ok(Json(state.reservations.get_reservation(id).await?))
}

async fn confirm_reservation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Reservation>, ApiError> {
    Ok(Json(state.reservations.confirm_reservation(id).await?))
}

async fn cancel_reservation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Reservation>, ApiError> {
    Ok(Json(state.reservations.cancel_reservation(id).await?))
}
