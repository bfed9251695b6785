//! OpenAPI documentation

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{auth, backends, health, holds, patron, records, reserves};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "ILS Gateway API",
        version = "1.0.0",
        description = "Routes library-system requests across several backends"
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Backends
        backends::list_backends,
        backends::check_capability,
        backends::get_config,
        // Records
        records::get_status,
        records::get_statuses,
        records::get_holding,
        records::get_purchase_history,
        records::get_new_items,
        // Auth
        auth::login,
        // Patron
        patron::get_profile,
        patron::get_transactions,
        patron::get_transaction_history,
        patron::get_holds,
        patron::get_fines,
        patron::get_storage_retrieval_requests,
        patron::get_ill_requests,
        patron::get_blocks,
        patron::change_password,
        // Holds
        holds::place_hold,
        holds::check_hold,
        holds::get_pickup_locations,
        holds::get_default_pickup_location,
        holds::get_request_groups,
        holds::cancel_holds,
        holds::renew_loans,
        holds::place_storage_retrieval_request,
        holds::check_storage_retrieval_request,
        holds::place_ill_request,
        holds::check_ill_request,
        holds::get_ill_pickup_libraries,
        // Reserves
        reserves::list_courses,
        reserves::list_instructors,
        reserves::list_departments,
        reserves::find_reserves,
    ),
    components(
        schemas(
            health::HealthResponse,
            health::ReadinessResponse,
            backends::CapabilityRequest,
            backends::CapabilityResponse,
            backends::ConfigRequest,
            crate::services::ils::BackendsInfo,
            records::StatusesRequest,
            auth::LoginRequest,
            patron::PatronRequest,
            patron::HistoryRequest,
            patron::BlocksResponse,
            patron::ChangePasswordRequest,
            holds::PlaceRequest,
            holds::ValidityRequest,
            holds::ValidityResponse,
            holds::PickupRequest,
            holds::DefaultPickupResponse,
            holds::RequestGroupsRequest,
            holds::CancelRequest,
            holds::RenewRequest,
            holds::IllLibrariesRequest,
            crate::error::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "backends", description = "Configured backends and their capabilities"),
        (name = "records", description = "Record status and holdings"),
        (name = "auth", description = "Patron authentication"),
        (name = "patron", description = "Patron account"),
        (name = "holds", description = "Holds, renewals and other requests"),
        (name = "reserves", description = "Course reserves")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
