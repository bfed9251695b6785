//! Record status and holdings endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::Value;
use utoipa::{IntoParams, ToSchema};

use crate::{error::AppResult, models::Holding, namespace::ScopedId};

/// Batch status request
#[derive(Deserialize, ToSchema)]
pub struct StatusesRequest {
    /// Composite record ids (`source.localId`)
    #[schema(value_type = Vec<String>)]
    pub ids: Vec<ScopedId>,
}

/// Query parameters for new items
#[derive(Debug, Deserialize, IntoParams)]
pub struct NewItemsQuery {
    /// Page number (default: 1)
    pub page: Option<u32>,
    /// Items per page (default: 20)
    pub limit: Option<u32>,
    /// Maximum age in days (default: 30)
    pub days_old: Option<u32>,
    pub fund_id: Option<String>,
}

/// Get the status of a record
#[utoipa::path(
    get,
    path = "/records/{id}/status",
    tag = "records",
    params(
        ("id" = String, Path, description = "Composite record id")
    ),
    responses(
        (status = 200, description = "Status of each item of the record"),
        (status = 502, description = "Backend failure")
    )
)]
pub async fn get_status(
    State(state): State<crate::AppState>,
    Path(id): Path<ScopedId>,
) -> AppResult<Json<Vec<Holding>>> {
    let mut ils = state.services.ils.router();
    Ok(Json(ils.get_status(&id).await?))
}

/// Get the status of several records across backends
#[utoipa::path(
    post,
    path = "/records/statuses",
    tag = "records",
    request_body = StatusesRequest,
    responses(
        (status = 200, description = "Statuses grouped per record, failed backends yield error entries")
    )
)]
pub async fn get_statuses(
    State(state): State<crate::AppState>,
    Json(request): Json<StatusesRequest>,
) -> AppResult<Json<Vec<Vec<Holding>>>> {
    let mut ils = state.services.ils.router();
    Ok(Json(ils.get_statuses(&request.ids).await?))
}

/// Get the holdings of a record
#[utoipa::path(
    get,
    path = "/records/{id}/holdings",
    tag = "records",
    params(
        ("id" = String, Path, description = "Composite record id")
    ),
    responses(
        (status = 200, description = "Holdings of the record")
    )
)]
pub async fn get_holding(
    State(state): State<crate::AppState>,
    Path(id): Path<ScopedId>,
) -> AppResult<Json<Vec<Holding>>> {
    let mut ils = state.services.ils.router();
    Ok(Json(ils.get_holding(&id, None, &Value::Null).await?))
}

/// Get the purchase history of a serial record
#[utoipa::path(
    get,
    path = "/records/{id}/purchase-history",
    tag = "records",
    params(
        ("id" = String, Path, description = "Composite record id")
    ),
    responses(
        (status = 200, description = "Purchase history entries")
    )
)]
pub async fn get_purchase_history(
    State(state): State<crate::AppState>,
    Path(id): Path<ScopedId>,
) -> AppResult<Json<Vec<Value>>> {
    let mut ils = state.services.ils.router();
    Ok(Json(ils.get_purchase_history(&id).await?))
}

/// List recently added records of the default backend
#[utoipa::path(
    get,
    path = "/records/new",
    tag = "records",
    params(NewItemsQuery),
    responses(
        (status = 200, description = "Count and ids of new records")
    )
)]
pub async fn get_new_items(
    State(state): State<crate::AppState>,
    Query(query): Query<NewItemsQuery>,
) -> AppResult<Json<Value>> {
    let mut ils = state.services.ils.router();
    let items = ils
        .get_new_items(
            query.page.unwrap_or(1),
            query.limit.unwrap_or(20),
            query.days_old.unwrap_or(30),
            query.fund_id.as_deref(),
        )
        .await?;
    Ok(Json(items))
}
