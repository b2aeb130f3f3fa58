use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::controllers::ApiError;
use crate::models::Seat;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/events/{id}/seats", get(list_seats))
        .route("/events/{id}/seats/available", get(list_available_seats))
        .route("/events/{id}/seats/available-count", get(available_count))
}

#[derive(Debug, Serialize)]
struct AvailableCount {
    event_id: Uuid,
    available: i64,
}

async fn list_seats(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<Uuid>,
) -> Result<Json<Vec<Seat>>, ApiError> {
    Ok(Json(state.seats.list_seats(event_id).await?))
}

async fn list_available_seats(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<Uuid>,
) -> Result<Json<Vec<Seat>>, ApiError> {
    Ok(Json(state.seats.list_available_seats(event_id).await?))
}

async fn available_count(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<Uuid>,
) -> Result<Json<AvailableCount>, ApiError> {
    let available = state.seats.count_available_seats(event_id).await?;
    Ok(Json(AvailableCount { event_id, available }))
}
