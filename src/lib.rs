pub mod cache;
pub mod config;
pub mod controllers;
pub mod database;
pub mod error;
pub mod kv;
pub mod lock;
pub mod middleware;
pub mod mocks;
pub mod models;
pub mod redis_client;
pub mod repository;
pub mod services;

use axum::{routing::get, Router};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

use crate::cache::CacheService;
use crate::kv::{CacheStore, CoordinationStore};
use crate::lock::LockManager;
use crate::repository::ReservationRepository;
use crate::services::{ReservationService, ReservationSettings, SeatService};

// Shared state для всего приложения
#[derive(Clone)]
pub struct AppState {
    pub reservations: ReservationService,
    pub seats: SeatService,
}

impl AppState {
    /// Durable store only: no seat locks, no availability cache.
    pub fn new(repo: Arc<dyn ReservationRepository>, settings: ReservationSettings) -> Self {
        Self {
            reservations: ReservationService::new(repo.clone(), settings),
            seats: SeatService::new(repo),
        }
    }

    /// Uses `kv` both for seat locks and for the availability cache.
    pub fn with_kv<K>(
        repo: Arc<dyn ReservationRepository>,
        kv: Arc<K>,
        settings: ReservationSettings,
        cache_ttl: Duration,
    ) -> Self
    where
        K: CoordinationStore + CacheStore + 'static,
    {
        let cache = CacheService::new(kv.clone());
        let locks = LockManager::new(kv);
        Self {
            reservations: ReservationService::new(repo.clone(), settings)
                .with_lock_manager(locks)
                .with_cache(cache.clone()),
            seats: SeatService::new(repo).with_cache(cache, cache_ttl),
        }
    }
}

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .nest("/api", controllers::routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
