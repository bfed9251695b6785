//! Course reserves endpoints, served by the default backend

use axum::{
    extract::{Query, State},
    Json,
};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;
use utoipa::IntoParams;

use crate::error::AppResult;

/// Query parameters for reserves search
#[derive(Debug, Deserialize, IntoParams)]
pub struct ReservesQuery {
    pub course: Option<String>,
    pub instructor: Option<String>,
    pub department: Option<String>,
}

/// List courses
#[utoipa::path(
    get,
    path = "/reserves/courses",
    tag = "reserves",
    responses(
        (status = 200, description = "Course names by id")
    )
)]
pub async fn list_courses(
    State(state): State<crate::AppState>,
) -> AppResult<Json<IndexMap<String, String>>> {
    let mut ils = state.services.ils.router();
    Ok(Json(ils.get_courses().await?))
}

/// List instructors
#[utoipa::path(
    get,
    path = "/reserves/instructors",
    tag = "reserves",
    responses(
        (status = 200, description = "Instructor names by id")
    )
)]
pub async fn list_instructors(
    State(state): State<crate::AppState>,
) -> AppResult<Json<IndexMap<String, String>>> {
    let mut ils = state.services.ils.router();
    Ok(Json(ils.get_instructors().await?))
}

/// List departments
#[utoipa::path(
    get,
    path = "/reserves/departments",
    tag = "reserves",
    responses(
        (status = 200, description = "Department names by id")
    )
)]
pub async fn list_departments(
    State(state): State<crate::AppState>,
) -> AppResult<Json<IndexMap<String, String>>> {
    let mut ils = state.services.ils.router();
    Ok(Json(ils.get_departments().await?))
}

/// Search course reserves
#[utoipa::path(
    get,
    path = "/reserves",
    tag = "reserves",
    params(ReservesQuery),
    responses(
        (status = 200, description = "Reserve entries with namespaced record ids")
    )
)]
pub async fn find_reserves(
    State(state): State<crate::AppState>,
    Query(query): Query<ReservesQuery>,
) -> AppResult<Json<Vec<Value>>> {
    let mut ils = state.services.ils.router();
    let reserves = ils
        .find_reserves(
            query.course.as_deref().unwrap_or_default(),
            query.instructor.as_deref().unwrap_or_default(),
            query.department.as_deref().unwrap_or_default(),
        )
        .await?;
    Ok(Json(reserves))
}
