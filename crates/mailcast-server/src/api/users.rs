use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use mailcast_common::types::UserRole;
use mailcast_storage::{ProfileUpdate, UserRow};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

use crate::api::pagination::PaginationParams;
use crate::api::{error_response, success_empty_response, success_paginated_response, success_response};
use crate::auth::Claims;
use crate::logging::TraceId;
use crate::state::AppState;

#[derive(Serialize, ToSchema)]
struct UserResponse {
    id: String,
    email: String,
    display_name: Option<String>,
    phone: Option<String>,
    avatar: Option<String>,
    country: Option<String>,
    role: UserRole,
    is_active: bool,
    is_blocked: bool,
    created_at: String,
}

fn to_response(u: UserRow) -> UserResponse {
    UserResponse {
        id: u.id,
        email: u.email,
        display_name: u.display_name,
        phone: u.phone,
        avatar: u.avatar,
        country: u.country,
        role: u.role,
        is_active: u.is_active,
        is_blocked: u.is_blocked,
        created_at: u.created_at.to_rfc3339(),
    }
}

fn require_manager(claims: &Claims, trace_id: &str) -> Result<(), Response> {
    if claims.is_manager() {
        Ok(())
    } else {
        Err(error_response(
            StatusCode::FORBIDDEN,
            trace_id,
            "forbidden",
            "manager role required",
        ))
    }
}

/// The acting user's own profile.
#[utoipa::path(
    get,
    path = "/v1/profile",
    tag = "Users",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Profile", body = UserResponse),
        (status = 401, description = "Unauthenticated", body = crate::api::ApiError)
    )
)]
async fn get_profile(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    match state.store.get_user_by_id(&claims.sub).await {
        Ok(Some(u)) => success_response(StatusCode::OK, &trace_id, to_response(u)),
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            &trace_id,
            "not_found",
            "account not found",
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to load profile");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
        }
    }
}

#[derive(Deserialize, ToSchema)]
struct UpdateProfileRequest {
    display_name: Option<String>,
    phone: Option<String>,
    avatar: Option<String>,
    country: Option<String>,
}

/// Update the acting user's profile fields.
#[utoipa::path(
    put,
    path = "/v1/profile",
    tag = "Users",
    security(("bearer_auth" = [])),
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Updated profile", body = UserResponse),
        (status = 401, description = "Unauthenticated", body = crate::api::ApiError)
    )
)]
async fn update_profile(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Json(req): Json<UpdateProfileRequest>,
) -> impl IntoResponse {
    let upd = ProfileUpdate {
        display_name: req.display_name,
        phone: req.phone,
        avatar: req.avatar,
        country: req.country,
    };
    match state.store.update_user_profile(&claims.sub, &upd).await {
        Ok(Some(u)) => success_response(StatusCode::OK, &trace_id, to_response(u)),
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            &trace_id,
            "not_found",
            "account not found",
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to update profile");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
        }
    }
}

/// List non-manager accounts (manager only), ordered by email.
#[utoipa::path(
    get,
    path = "/v1/users",
    tag = "Users",
    security(("bearer_auth" = [])),
    params(PaginationParams),
    responses(
        (status = 200, description = "Account page", body = Vec<UserResponse>),
        (status = 403, description = "Manager role required", body = crate::api::ApiError)
    )
)]
async fn list_users(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Query(pagination): Query<PaginationParams>,
) -> impl IntoResponse {
    if let Err(resp) = require_manager(&claims, &trace_id) {
        return resp;
    }
    let total = match state.store.count_members().await {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "Failed to count users");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            );
        }
    };
    match state
        .store
        .list_members(pagination.limit(), pagination.offset())
        .await
    {
        Ok(rows) => success_paginated_response(
            StatusCode::OK,
            &trace_id,
            rows.into_iter().map(to_response).collect(),
            total,
            pagination.limit(),
            pagination.offset(),
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to list users");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
        }
    }
}

async fn set_blocked(
    state: &AppState,
    trace_id: &str,
    id: &str,
    blocked: bool,
) -> Response {
    match state.store.set_user_blocked(id, blocked).await {
        Ok(true) => {
            tracing::info!(user_id = %id, blocked, "Account block flag changed");
            let msg = if blocked {
                "Account blocked"
            } else {
                "Account unblocked"
            };
            success_empty_response(StatusCode::OK, trace_id, msg)
        }
        Ok(false) => error_response(
            StatusCode::NOT_FOUND,
            trace_id,
            "not_found",
            "account not found",
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to change block flag");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                trace_id,
                "storage_error",
                "Database error",
            )
        }
    }
}

/// Block an account (manager only). Blocked accounts cannot log in.
#[utoipa::path(
    post,
    path = "/v1/users/{id}/block",
    tag = "Users",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Account ID")),
    responses(
        (status = 200, description = "Account blocked"),
        (status = 403, description = "Manager role required", body = crate::api::ApiError),
        (status = 404, description = "Unknown account", body = crate::api::ApiError)
    )
)]
async fn block_user(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    if let Err(resp) = require_manager(&claims, &trace_id) {
        return resp;
    }
    set_blocked(&state, &trace_id, &id, true).await
}

/// Unblock an account (manager only).
#[utoipa::path(
    post,
    path = "/v1/users/{id}/unblock",
    tag = "Users",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Account ID")),
    responses(
        (status = 200, description = "Account unblocked"),
        (status = 403, description = "Manager role required", body = crate::api::ApiError),
        (status = 404, description = "Unknown account", body = crate::api::ApiError)
    )
)]
async fn unblock_user(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    if let Err(resp) = require_manager(&claims, &trace_id) {
        return resp;
    }
    set_blocked(&state, &trace_id, &id, false).await
}

pub fn user_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(get_profile, update_profile))
        .routes(routes!(list_users))
        .routes(routes!(block_user))
        .routes(routes!(unblock_user))
}
