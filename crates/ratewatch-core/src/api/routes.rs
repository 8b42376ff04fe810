//! API routes

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{self, AppState};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/health", get(handlers::health))

        // Corridors & rates
        .route("/api/v1/corridors", get(handlers::list_corridors))
        .route(
            "/api/v1/corridors/:country/:base/:quote/rates",
            get(handlers::list_rates),
        )
        .route(
            "/api/v1/corridors/:country/:base/:quote/recommended",
            get(handlers::get_recommended).put(handlers::set_recommended),
        )

        // Subscriptions
        .route("/api/v1/subscriptions", post(handlers::create_subscription))
        .route("/api/v1/subscriptions/:id", get(handlers::get_subscription))
        .route(
            "/api/v1/subscriptions/:id/deactivate",
            post(handlers::deactivate_subscription),
        )

        // Manual triggers
        .route("/api/v1/cycles/ingestion", post(handlers::run_ingestion))
        .route("/api/v1/cycles/evaluation", post(handlers::run_evaluation))

        .with_state(state)
}
