pub mod cache;
pub mod config;
pub mod controllers;
pub mod database;
pub mod error;
pub mod middleware;
pub mod models;
pub mod services;
pub mod store;

use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::services::{auth::TokenService, booking::BookingCoordinator};
use crate::store::{PgTicketStore, TicketStore};

// Shared state для всего приложения
#[derive(Clone)]
pub struct AppState {
    pub db: database::Database,
    pub cache: Option<cache::CacheService>,
    pub config: config::Config,
    pub tokens: TokenService,
    pub bookings: BookingCoordinator,
}

impl AppState {
    /// Подключается к Postgres (и Redis, если задан), накатывает миграции.
    pub async fn connect(config: config::Config) -> anyhow::Result<Arc<Self>> {
        let db = database::Database::new(&config.database.url, config.database.pool_size).await?;
        info!("Database connected");

        db.run_migrations().await?;

        let cache = match &config.redis.url {
            Some(url) => match cache::CacheService::connect(url, config.redis.search_ttl_seconds).await {
                Ok(cache) => Some(cache),
                Err(e) => {
                    warn!("Redis unavailable, search cache disabled: {}", e);
                    None
                }
            },
            None => {
                info!("REDIS_URL not set, search cache disabled");
                None
            }
        };

        let store = Arc::new(PgTicketStore::new(db.pool.clone()));
        Ok(Self::from_parts(config, db, cache, store))
    }

    pub fn from_parts(
        config: config::Config,
        db: database::Database,
        cache: Option<cache::CacheService>,
        store: Arc<dyn TicketStore>,
    ) -> Arc<Self> {
        let tokens = TokenService::from_config(&config.jwt);
        let bookings = BookingCoordinator::new(store, config.booking.timeout());

        Arc::new(Self { db, cache, config, tokens, bookings })
    }
}

/// Главный роутер приложения.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(|| async { "Event Ticketing API v1.0" }))
        .route("/health", get(|| async { "OK" }))
        .merge(controllers::routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
