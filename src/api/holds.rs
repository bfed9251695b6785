//! Hold, renewal, storage retrieval and interlibrary loan endpoints

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    error::AppResult,
    models::{ActionResult, Patron, RequestDetails, RequestValidity},
};

/// Hold, storage retrieval or ILL request
#[derive(Deserialize, Validate, ToSchema)]
pub struct PlaceRequest {
    /// Composite record id
    #[validate(length(min = 1, message = "Record id is required"))]
    pub id: String,
    pub item_id: Option<String>,
    #[schema(value_type = Object)]
    pub patron: Patron,
    /// Request parameters such as `pickUpLocation` or `comment`
    #[serde(default)]
    #[schema(value_type = Object)]
    pub params: Map<String, Value>,
}

impl From<PlaceRequest> for RequestDetails {
    fn from(request: PlaceRequest) -> Self {
        Self {
            id: request.id,
            item_id: request.item_id,
            patron: request.patron,
            extra: request.params,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct ValidityRequest {
    pub id: String,
    #[schema(value_type = Object)]
    pub patron: Patron,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub data: Value,
}

#[derive(Serialize, ToSchema)]
pub struct ValidityResponse {
    pub valid: bool,
    pub status: Option<String>,
}

impl From<RequestValidity> for ValidityResponse {
    fn from(validity: RequestValidity) -> Self {
        Self {
            valid: validity.valid,
            status: validity.status,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct PickupRequest {
    #[schema(value_type = Option<Object>)]
    pub patron: Option<Patron>,
    #[schema(value_type = Option<Object>)]
    pub hold: Option<Value>,
}

#[derive(Serialize, ToSchema)]
pub struct DefaultPickupResponse {
    pub location: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct RequestGroupsRequest {
    pub id: String,
    #[schema(value_type = Object)]
    pub patron: Patron,
    #[schema(value_type = Option<Object>)]
    pub hold: Option<Value>,
}

#[derive(Deserialize, ToSchema)]
pub struct CancelRequest {
    #[schema(value_type = Object)]
    pub patron: Patron,
    /// Entries as listed by the patron's holds
    #[schema(value_type = Vec<Object>)]
    pub holds: Vec<Value>,
}

#[derive(Deserialize, ToSchema)]
pub struct RenewRequest {
    #[schema(value_type = Object)]
    pub patron: Patron,
    /// Entries as listed by the patron's transactions
    #[schema(value_type = Vec<Object>)]
    pub checkouts: Vec<Value>,
}

#[derive(Deserialize, ToSchema)]
pub struct IllLibrariesRequest {
    pub id: String,
    #[schema(value_type = Object)]
    pub patron: Patron,
}

/// Place a hold
#[utoipa::path(
    post,
    path = "/holds",
    tag = "holds",
    request_body = PlaceRequest,
    responses(
        (status = 200, description = "Outcome, `hold_wrong_user_institution` for a record of another library"),
        (status = 503, description = "No backend for the patron")
    )
)]
pub async fn place_hold(
    State(state): State<crate::AppState>,
    Json(request): Json<PlaceRequest>,
) -> AppResult<Json<ActionResult>> {
    request.validate()?;

    let mut ils = state.services.ils.router_for(Some(request.patron.clone()));
    let details = RequestDetails::from(request);
    let result = ils.place_hold(&details).await?;
    if result.success {
        tracing::info!("Hold placed on {} for {}", details.id, details.patron.cat_username);
    }
    Ok(Json(result))
}

/// Check whether a hold may be placed
#[utoipa::path(
    post,
    path = "/holds/validate",
    tag = "holds",
    request_body = ValidityRequest,
    responses(
        (status = 200, description = "Validity of the request", body = ValidityResponse)
    )
)]
pub async fn check_hold(
    State(state): State<crate::AppState>,
    Json(request): Json<ValidityRequest>,
) -> AppResult<Json<ValidityResponse>> {
    let mut ils = state.services.ils.router_for(Some(request.patron.clone()));
    let validity = ils
        .check_request_is_valid(&request.id, &request.data, &request.patron)
        .await?;
    Ok(Json(validity.into()))
}

/// List pickup locations
#[utoipa::path(
    post,
    path = "/holds/pickup-locations",
    tag = "holds",
    request_body = PickupRequest,
    responses(
        (status = 200, description = "Pickup locations with namespaced ids")
    )
)]
pub async fn get_pickup_locations(
    State(state): State<crate::AppState>,
    Json(request): Json<PickupRequest>,
) -> AppResult<Json<Vec<Value>>> {
    let mut ils = state.services.ils.router_for(request.patron.clone());
    Ok(Json(
        ils.get_pick_up_locations(request.patron.as_ref(), request.hold.as_ref())
            .await?,
    ))
}

/// Get the default pickup location
#[utoipa::path(
    post,
    path = "/holds/default-pickup-location",
    tag = "holds",
    request_body = PickupRequest,
    responses(
        (status = 200, description = "Default location, if any", body = DefaultPickupResponse)
    )
)]
pub async fn get_default_pickup_location(
    State(state): State<crate::AppState>,
    Json(request): Json<PickupRequest>,
) -> AppResult<Json<DefaultPickupResponse>> {
    let mut ils = state.services.ils.router_for(request.patron.clone());
    let location = ils
        .get_default_pick_up_location(request.patron.as_ref(), request.hold.as_ref())
        .await?;
    Ok(Json(DefaultPickupResponse { location }))
}

/// List request groups
#[utoipa::path(
    post,
    path = "/holds/request-groups",
    tag = "holds",
    request_body = RequestGroupsRequest,
    responses(
        (status = 200, description = "Request groups of the record")
    )
)]
pub async fn get_request_groups(
    State(state): State<crate::AppState>,
    Json(request): Json<RequestGroupsRequest>,
) -> AppResult<Json<Vec<Value>>> {
    let mut ils = state.services.ils.router_for(Some(request.patron.clone()));
    Ok(Json(
        ils.get_request_groups(&request.id, &request.patron, request.hold.as_ref())
            .await?,
    ))
}

/// Cancel holds
#[utoipa::path(
    post,
    path = "/holds/cancel",
    tag = "holds",
    request_body = CancelRequest,
    responses(
        (status = 200, description = "Count and per-item outcome")
    )
)]
pub async fn cancel_holds(
    State(state): State<crate::AppState>,
    Json(request): Json<CancelRequest>,
) -> AppResult<Json<Value>> {
    let result = state
        .services
        .ils
        .cancel_holds(request.patron, &request.holds)
        .await?;
    Ok(Json(result))
}

/// Renew loans
#[utoipa::path(
    post,
    path = "/loans/renew",
    tag = "holds",
    request_body = RenewRequest,
    responses(
        (status = 200, description = "Blocks and per-item renewal outcome")
    )
)]
pub async fn renew_loans(
    State(state): State<crate::AppState>,
    Json(request): Json<RenewRequest>,
) -> AppResult<Json<Value>> {
    let result = state
        .services
        .ils
        .renew(request.patron, &request.checkouts)
        .await?;
    Ok(Json(result))
}

/// Place a storage retrieval request
#[utoipa::path(
    post,
    path = "/storage-retrieval-requests",
    tag = "holds",
    request_body = PlaceRequest,
    responses(
        (status = 200, description = "Outcome, `storage_wrong_user_institution` for a record of another library")
    )
)]
pub async fn place_storage_retrieval_request(
    State(state): State<crate::AppState>,
    Json(request): Json<PlaceRequest>,
) -> AppResult<Json<ActionResult>> {
    request.validate()?;

    let mut ils = state.services.ils.router_for(Some(request.patron.clone()));
    let details = RequestDetails::from(request);
    Ok(Json(ils.place_storage_retrieval_request(&details).await?))
}

/// Check whether a storage retrieval request may be placed
#[utoipa::path(
    post,
    path = "/storage-retrieval-requests/validate",
    tag = "holds",
    request_body = ValidityRequest,
    responses(
        (status = 200, description = "Validity of the request", body = ValidityResponse)
    )
)]
pub async fn check_storage_retrieval_request(
    State(state): State<crate::AppState>,
    Json(request): Json<ValidityRequest>,
) -> AppResult<Json<ValidityResponse>> {
    let mut ils = state.services.ils.router_for(Some(request.patron.clone()));
    let validity = ils
        .check_storage_retrieval_request_is_valid(&request.id, &request.data, &request.patron)
        .await?;
    Ok(Json(validity.into()))
}

/// Place an interlibrary loan request with the library owning the record
#[utoipa::path(
    post,
    path = "/ill-requests",
    tag = "holds",
    request_body = PlaceRequest,
    responses(
        (status = 200, description = "Outcome of the request")
    )
)]
pub async fn place_ill_request(
    State(state): State<crate::AppState>,
    Json(request): Json<PlaceRequest>,
) -> AppResult<Json<ActionResult>> {
    request.validate()?;

    let mut ils = state.services.ils.router_for(Some(request.patron.clone()));
    let details = RequestDetails::from(request);
    Ok(Json(ils.place_ill_request(&details).await?))
}

/// Check whether an interlibrary loan request may be placed
#[utoipa::path(
    post,
    path = "/ill-requests/validate",
    tag = "holds",
    request_body = ValidityRequest,
    responses(
        (status = 200, description = "Validity of the request", body = ValidityResponse)
    )
)]
pub async fn check_ill_request(
    State(state): State<crate::AppState>,
    Json(request): Json<ValidityRequest>,
) -> AppResult<Json<ValidityResponse>> {
    let mut ils = state.services.ils.router_for(Some(request.patron.clone()));
    let validity = ils
        .check_ill_request_is_valid(&request.id, &request.data, &request.patron)
        .await?;
    Ok(Json(validity.into()))
}

/// List libraries an interlibrary loan can be delivered to
#[utoipa::path(
    post,
    path = "/ill-requests/pickup-libraries",
    tag = "holds",
    request_body = IllLibrariesRequest,
    responses(
        (status = 200, description = "Pickup libraries, or null when not offered")
    )
)]
pub async fn get_ill_pickup_libraries(
    State(state): State<crate::AppState>,
    Json(request): Json<IllLibrariesRequest>,
) -> AppResult<Json<Option<Vec<Value>>>> {
    let mut ils = state.services.ils.router_for(Some(request.patron.clone()));
    Ok(Json(
        ils.get_ill_pickup_libraries(&request.id, &request.patron)
            .await?,
    ))
}
