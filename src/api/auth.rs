//! Patron authentication endpoint

use axum::{extract::State, Json};
use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::Patron,
};

/// Login request
#[derive(Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    /// Catalog username, optionally prefixed with its source
    #[validate(length(min = 1, message = "Username is required"))]
    pub username: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// Log a patron in to their library system
#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Patron record with namespaced identifiers"),
        (status = 400, description = "Missing username or password"),
        (status = 401, description = "Invalid credentials"),
        (status = 503, description = "No backend accepts this login")
    )
)]
pub async fn login(
    State(state): State<crate::AppState>,
    Json(request): Json<LoginRequest>,
) -> AppResult<Json<Patron>> {
    request.validate()?;

    let mut ils = state.services.ils.router();
    let patron = ils
        .patron_login(&request.username, &request.password)
        .await?
        .ok_or_else(|| AppError::Authentication("Invalid username or password".to_string()))?;

    tracing::info!("Patron {} logged in", patron.cat_username);
    Ok(Json(patron))
}
