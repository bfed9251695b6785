//! API handlers for the gateway REST endpoints

pub mod auth;
pub mod backends;
pub mod health;
pub mod holds;
pub mod openapi;
pub mod patron;
pub mod records;
pub mod reserves;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::AppState;

/// Create the application router with all routes
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_v1 = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        // Backends
        .route("/backends", get(backends::list_backends))
        .route("/capabilities", post(backends::check_capability))
        .route("/config", post(backends::get_config))
        // Records
        .route("/records/new", get(records::get_new_items))
        .route("/records/statuses", post(records::get_statuses))
        .route("/records/:id/status", get(records::get_status))
        .route("/records/:id/holdings", get(records::get_holding))
        .route("/records/:id/purchase-history", get(records::get_purchase_history))
        // Authentication
        .route("/auth/login", post(auth::login))
        // Patron account
        .route("/patron/profile", post(patron::get_profile))
        .route("/patron/transactions", post(patron::get_transactions))
        .route("/patron/transaction-history", post(patron::get_transaction_history))
        .route("/patron/holds", post(patron::get_holds))
        .route("/patron/fines", post(patron::get_fines))
        .route(
            "/patron/storage-retrieval-requests",
            post(patron::get_storage_retrieval_requests),
        )
        .route("/patron/ill-requests", post(patron::get_ill_requests))
        .route("/patron/blocks", post(patron::get_blocks))
        .route("/patron/password", post(patron::change_password))
        // Holds and loans
        .route("/holds", post(holds::place_hold))
        .route("/holds/validate", post(holds::check_hold))
        .route("/holds/pickup-locations", post(holds::get_pickup_locations))
        .route(
            "/holds/default-pickup-location",
            post(holds::get_default_pickup_location),
        )
        .route("/holds/request-groups", post(holds::get_request_groups))
        .route("/holds/cancel", post(holds::cancel_holds))
        .route("/loans/renew", post(holds::renew_loans))
        .route(
            "/storage-retrieval-requests",
            post(holds::place_storage_retrieval_request),
        )
        .route(
            "/storage-retrieval-requests/validate",
            post(holds::check_storage_retrieval_request),
        )
        .route("/ill-requests", post(holds::place_ill_request))
        .route("/ill-requests/validate", post(holds::check_ill_request))
        .route(
            "/ill-requests/pickup-libraries",
            post(holds::get_ill_pickup_libraries),
        )
        // Course reserves
        .route("/reserves", get(reserves::find_reserves))
        .route("/reserves/courses", get(reserves::list_courses))
        .route("/reserves/instructors", get(reserves::list_instructors))
        .route("/reserves/departments", get(reserves::list_departments))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi::create_openapi_router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
