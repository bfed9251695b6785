//! Backend introspection endpoints

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::{
    drivers::Method,
    error::{AppError, AppResult},
    models::Patron,
    services::ils::BackendsInfo,
};

#[derive(Deserialize, ToSchema)]
pub struct CapabilityRequest {
    /// Operation name, e.g. `placeHold`
    pub method: String,
    /// Parameters the operation would be called with
    #[serde(default)]
    #[schema(value_type = Object)]
    pub params: Value,
}

#[derive(Serialize, ToSchema)]
pub struct CapabilityResponse {
    pub method: String,
    pub supported: bool,
}

#[derive(Deserialize, ToSchema)]
pub struct ConfigRequest {
    /// Feature name, e.g. `Holds`
    pub function: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub params: Value,
    /// Logged-in patron, used when `params` name no source
    #[schema(value_type = Option<Object>)]
    pub patron: Option<Patron>,
}

/// List configured backends
#[utoipa::path(
    get,
    path = "/backends",
    tag = "backends",
    responses(
        (status = 200, description = "Configured sources and login settings", body = BackendsInfo)
    )
)]
pub async fn list_backends(State(state): State<crate::AppState>) -> Json<BackendsInfo> {
    Json(state.services.ils.backends())
}

/// Ask whether the backend owning a call can perform an operation
#[utoipa::path(
    post,
    path = "/capabilities",
    tag = "backends",
    request_body = CapabilityRequest,
    responses(
        (status = 200, description = "Whether the operation is supported", body = CapabilityResponse),
        (status = 400, description = "Unknown operation")
    )
)]
pub async fn check_capability(
    State(state): State<crate::AppState>,
    Json(request): Json<CapabilityRequest>,
) -> AppResult<Json<CapabilityResponse>> {
    let method = Method::from_name(&request.method)
        .ok_or_else(|| AppError::BadRequest(format!("Unknown method: {}", request.method)))?;

    let mut ils = state.services.ils.router();
    let supported = ils.supports_method(method, &request.params).await?;
    Ok(Json(CapabilityResponse {
        method: method.name().to_string(),
        supported,
    }))
}

/// Get the settings of an optional backend feature
#[utoipa::path(
    post,
    path = "/config",
    tag = "backends",
    request_body = ConfigRequest,
    responses(
        (status = 200, description = "Feature settings, or null when the feature is disabled")
    )
)]
pub async fn get_config(
    State(state): State<crate::AppState>,
    Json(request): Json<ConfigRequest>,
) -> AppResult<Json<Option<Value>>> {
    let mut ils = state.services.ils.router_for(request.patron);
    Ok(Json(ils.get_config(&request.function, &request.params).await?))
}
