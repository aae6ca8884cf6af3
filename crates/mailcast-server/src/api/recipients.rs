use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use mailcast_storage::{RecipientRow, RecipientUpdate};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

use crate::api::pagination::PaginationParams;
use crate::api::{error_response, success_empty_response, success_paginated_response, success_response};
use crate::auth::{actor_scope, Claims};
use crate::logging::TraceId;
use crate::state::AppState;

#[derive(Deserialize, ToSchema)]
struct CreateRecipientRequest {
    email: String,
    full_name: String,
    #[serde(default)]
    comment: String,
}

#[derive(Deserialize, ToSchema)]
struct UpdateRecipientRequest {
    email: Option<String>,
    full_name: Option<String>,
    comment: Option<String>,
}

#[derive(Serialize, ToSchema)]
struct RecipientResponse {
    id: String,
    email: String,
    full_name: String,
    comment: String,
    owner_id: Option<String>,
    created_at: String,
    updated_at: String,
}

fn to_response(r: RecipientRow) -> RecipientResponse {
    RecipientResponse {
        id: r.id,
        email: r.email,
        full_name: r.full_name,
        comment: r.comment,
        owner_id: r.owner_id,
        created_at: r.created_at.to_rfc3339(),
        updated_at: r.updated_at.to_rfc3339(),
    }
}

/// List visible recipients, ordered by email.
#[utoipa::path(
    get,
    path = "/v1/recipients",
    tag = "Recipients",
    security(("bearer_auth" = [])),
    params(PaginationParams),
    responses(
        (status = 200, description = "Recipient page", body = Vec<RecipientResponse>),
        (status = 401, description = "Unauthenticated", body = crate::api::ApiError)
    )
)]
async fn list_recipients(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Query(pagination): Query<PaginationParams>,
) -> impl IntoResponse {
    let scope = actor_scope(&claims);
    let total = match state.store.count_recipients(&scope).await {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "Failed to count recipients");
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
        .list_recipients(&scope, pagination.limit(), pagination.offset())
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
            tracing::error!(error = %e, "Failed to list recipients");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
        }
    }
}

/// Create a recipient owned by the acting user.
#[utoipa::path(
    post,
    path = "/v1/recipients",
    tag = "Recipients",
    security(("bearer_auth" = [])),
    request_body = CreateRecipientRequest,
    responses(
        (status = 201, description = "Recipient created", body = RecipientResponse),
        (status = 400, description = "Invalid fields", body = crate::api::ApiError),
        (status = 409, description = "Email already exists", body = crate::api::ApiError)
    )
)]
async fn create_recipient(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Json(req): Json<CreateRecipientRequest>,
) -> impl IntoResponse {
    if !req.email.contains('@') || req.full_name.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            "validation_error",
            "email and full_name are required",
        );
    }

    match state.store.get_recipient_by_email(&req.email).await {
        Ok(Some(_)) => {
            return error_response(
                StatusCode::CONFLICT,
                &trace_id,
                "conflict",
                "a recipient with this email already exists",
            );
        }
        Ok(None) => {}
        Err(e) => {
            tracing::error!(error = %e, "Failed to check recipient email");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            );
        }
    }

    let now = chrono::Utc::now();
    let row = RecipientRow {
        id: mailcast_common::id::next_id(),
        email: req.email,
        full_name: req.full_name,
        comment: req.comment,
        owner_id: Some(claims.sub.clone()),
        created_at: now,
        updated_at: now,
    };
    match state.store.insert_recipient(&row).await {
        Ok(created) => success_response(StatusCode::CREATED, &trace_id, to_response(created)),
        Err(e) => {
            tracing::error!(error = %e, "Failed to create recipient");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
        }
    }
}

/// Fetch one visible recipient.
#[utoipa::path(
    get,
    path = "/v1/recipients/{id}",
    tag = "Recipients",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Recipient ID")),
    responses(
        (status = 200, description = "Recipient", body = RecipientResponse),
        (status = 404, description = "Not found", body = crate::api::ApiError)
    )
)]
async fn get_recipient(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let scope = actor_scope(&claims);
    match state.store.get_recipient_by_id(&id).await {
        Ok(Some(r)) if scope.allows(&r.owner_id) => {
            success_response(StatusCode::OK, &trace_id, to_response(r))
        }
        Ok(_) => error_response(
            StatusCode::NOT_FOUND,
            &trace_id,
            "not_found",
            "recipient not found",
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to get recipient");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
        }
    }
}

/// Update one visible recipient.
#[utoipa::path(
    put,
    path = "/v1/recipients/{id}",
    tag = "Recipients",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Recipient ID")),
    request_body = UpdateRecipientRequest,
    responses(
        (status = 200, description = "Updated recipient", body = RecipientResponse),
        (status = 404, description = "Not found", body = crate::api::ApiError),
        (status = 409, description = "Email already exists", body = crate::api::ApiError)
    )
)]
async fn update_recipient(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateRecipientRequest>,
) -> impl IntoResponse {
    let scope = actor_scope(&claims);
    let existing = match state.store.get_recipient_by_id(&id).await {
        Ok(Some(r)) if scope.allows(&r.owner_id) => r,
        Ok(_) => {
            return error_response(
                StatusCode::NOT_FOUND,
                &trace_id,
                "not_found",
                "recipient not found",
            );
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to get recipient");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            );
        }
    };

    if let Some(ref email) = req.email {
        if email != &existing.email {
            match state.store.get_recipient_by_email(email).await {
                Ok(Some(_)) => {
                    return error_response(
                        StatusCode::CONFLICT,
                        &trace_id,
                        "conflict",
                        "a recipient with this email already exists",
                    );
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(error = %e, "Failed to check recipient email");
                    return error_response(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        &trace_id,
                        "storage_error",
                        "Database error",
                    );
                }
            }
        }
    }

    let upd = RecipientUpdate {
        email: req.email,
        full_name: req.full_name,
        comment: req.comment,
    };
    match state.store.update_recipient(&id, &upd).await {
        Ok(Some(r)) => success_response(StatusCode::OK, &trace_id, to_response(r)),
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            &trace_id,
            "not_found",
            "recipient not found",
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to update recipient");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
        }
    }
}

/// Delete one visible recipient (cascades to mailing links and attempts).
#[utoipa::path(
    delete,
    path = "/v1/recipients/{id}",
    tag = "Recipients",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Recipient ID")),
    responses(
        (status = 200, description = "Recipient deleted"),
        (status = 404, description = "Not found", body = crate::api::ApiError)
    )
)]
async fn delete_recipient(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let scope = actor_scope(&claims);
    match state.store.get_recipient_by_id(&id).await {
        Ok(Some(r)) if scope.allows(&r.owner_id) => {}
        Ok(_) => {
            return error_response(
                StatusCode::NOT_FOUND,
                &trace_id,
                "not_found",
                "recipient not found",
            );
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to get recipient");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            );
        }
    }
    match state.store.delete_recipient(&id).await {
        Ok(true) => success_empty_response(StatusCode::OK, &trace_id, "Recipient deleted"),
        Ok(false) => error_response(
            StatusCode::NOT_FOUND,
            &trace_id,
            "not_found",
            "recipient not found",
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to delete recipient");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
        }
    }
}

pub fn recipient_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(list_recipients, create_recipient))
        .routes(routes!(get_recipient, update_recipient, delete_recipient))
}
