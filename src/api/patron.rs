//! Patron account endpoints
//!
//! Every request carries the patron record returned by `/auth/login`; its
//! `cat_username` prefix selects the backend.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    error::AppResult,
    models::{ActionResult, PasswordChange, Patron},
};

#[derive(Deserialize, ToSchema)]
pub struct PatronRequest {
    #[schema(value_type = Object)]
    pub patron: Patron,
}

#[derive(Deserialize, ToSchema)]
pub struct HistoryRequest {
    #[schema(value_type = Object)]
    pub patron: Patron,
    /// Paging and sorting parameters passed through to the backend
    #[serde(default)]
    #[schema(value_type = Object)]
    pub params: Value,
}

#[derive(Serialize, ToSchema)]
pub struct BlocksResponse {
    pub request_blocks: Vec<String>,
    pub account_blocks: Vec<String>,
}

#[derive(Deserialize, Validate, ToSchema)]
pub struct ChangePasswordRequest {
    #[schema(value_type = Object)]
    pub patron: Patron,
    pub old_password: String,
    #[validate(length(min = 4, message = "New password must be at least 4 characters"))]
    pub new_password: String,
}

/// Get the patron's profile
#[utoipa::path(
    post,
    path = "/patron/profile",
    tag = "patron",
    request_body = PatronRequest,
    responses(
        (status = 200, description = "Patron profile")
    )
)]
pub async fn get_profile(
    State(state): State<crate::AppState>,
    Json(request): Json<PatronRequest>,
) -> AppResult<Json<Value>> {
    let mut ils = state.services.ils.router_for(Some(request.patron.clone()));
    Ok(Json(ils.get_my_profile(&request.patron).await?))
}

/// Get the patron's current loans
#[utoipa::path(
    post,
    path = "/patron/transactions",
    tag = "patron",
    request_body = PatronRequest,
    responses(
        (status = 200, description = "Current loans")
    )
)]
pub async fn get_transactions(
    State(state): State<crate::AppState>,
    Json(request): Json<PatronRequest>,
) -> AppResult<Json<Vec<Value>>> {
    let mut ils = state.services.ils.router_for(Some(request.patron.clone()));
    Ok(Json(ils.get_my_transactions(&request.patron).await?))
}

/// Get the patron's loan history
#[utoipa::path(
    post,
    path = "/patron/transaction-history",
    tag = "patron",
    request_body = HistoryRequest,
    responses(
        (status = 200, description = "Count and page of past loans")
    )
)]
pub async fn get_transaction_history(
    State(state): State<crate::AppState>,
    Json(request): Json<HistoryRequest>,
) -> AppResult<Json<Value>> {
    let mut ils = state.services.ils.router_for(Some(request.patron.clone()));
    Ok(Json(
        ils.get_my_transaction_history(&request.patron, &request.params)
            .await?,
    ))
}

/// Get the patron's holds
#[utoipa::path(
    post,
    path = "/patron/holds",
    tag = "patron",
    request_body = PatronRequest,
    responses(
        (status = 200, description = "Holds with namespaced record and item ids")
    )
)]
pub async fn get_holds(
    State(state): State<crate::AppState>,
    Json(request): Json<PatronRequest>,
) -> AppResult<Json<Vec<Value>>> {
    let mut ils = state.services.ils.router_for(Some(request.patron.clone()));
    Ok(Json(ils.get_my_holds(&request.patron).await?))
}

/// Get the patron's fines
#[utoipa::path(
    post,
    path = "/patron/fines",
    tag = "patron",
    request_body = PatronRequest,
    responses(
        (status = 200, description = "Outstanding fines")
    )
)]
pub async fn get_fines(
    State(state): State<crate::AppState>,
    Json(request): Json<PatronRequest>,
) -> AppResult<Json<Vec<Value>>> {
    let mut ils = state.services.ils.router_for(Some(request.patron.clone()));
    Ok(Json(ils.get_my_fines(&request.patron).await?))
}

/// Get the patron's storage retrieval requests
#[utoipa::path(
    post,
    path = "/patron/storage-retrieval-requests",
    tag = "patron",
    request_body = PatronRequest,
    responses(
        (status = 200, description = "Storage retrieval requests")
    )
)]
pub async fn get_storage_retrieval_requests(
    State(state): State<crate::AppState>,
    Json(request): Json<PatronRequest>,
) -> AppResult<Json<Vec<Value>>> {
    let mut ils = state.services.ils.router_for(Some(request.patron.clone()));
    Ok(Json(
        ils.get_my_storage_retrieval_requests(&request.patron)
            .await?,
    ))
}

/// Get the patron's interlibrary loan requests
#[utoipa::path(
    post,
    path = "/patron/ill-requests",
    tag = "patron",
    request_body = PatronRequest,
    responses(
        (status = 200, description = "Interlibrary loan requests")
    )
)]
pub async fn get_ill_requests(
    State(state): State<crate::AppState>,
    Json(request): Json<PatronRequest>,
) -> AppResult<Json<Vec<Value>>> {
    let mut ils = state.services.ils.router_for(Some(request.patron.clone()));
    Ok(Json(ils.get_my_ill_requests(&request.patron).await?))
}

/// Get the request and account blocks of the patron
#[utoipa::path(
    post,
    path = "/patron/blocks",
    tag = "patron",
    request_body = PatronRequest,
    responses(
        (status = 200, description = "Blocks reported by the backend", body = BlocksResponse)
    )
)]
pub async fn get_blocks(
    State(state): State<crate::AppState>,
    Json(request): Json<PatronRequest>,
) -> AppResult<Json<BlocksResponse>> {
    let mut ils = state.services.ils.router_for(Some(request.patron.clone()));
    let request_blocks = ils.get_request_blocks(&request.patron).await?;
    let account_blocks = ils.get_account_blocks(&request.patron).await?;
    Ok(Json(BlocksResponse {
        request_blocks,
        account_blocks,
    }))
}

/// Change the patron's catalog password
#[utoipa::path(
    post,
    path = "/patron/password",
    tag = "patron",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Outcome of the change"),
        (status = 400, description = "New password too short"),
        (status = 503, description = "Backend cannot change passwords")
    )
)]
pub async fn change_password(
    State(state): State<crate::AppState>,
    Json(request): Json<ChangePasswordRequest>,
) -> AppResult<Json<ActionResult>> {
    request.validate()?;

    let mut ils = state.services.ils.router_for(Some(request.patron.clone()));
    let result = ils
        .change_password(&PasswordChange {
            patron: request.patron,
            old_password: request.old_password,
            new_password: request.new_password,
        })
        .await?;
    Ok(Json(result))
}
