use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use mailcast_storage::{MessageRow, MessageUpdate};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

use crate::api::pagination::PaginationParams;
use crate::api::{error_response, success_empty_response, success_paginated_response, success_response};
use crate::auth::{actor_scope, Claims};
use crate::logging::TraceId;
use crate::state::AppState;

#[derive(Deserialize, ToSchema)]
struct CreateMessageRequest {
    subject: String,
    body: String,
}

#[derive(Deserialize, ToSchema)]
struct UpdateMessageRequest {
    subject: Option<String>,
    body: Option<String>,
}

#[derive(Serialize, ToSchema)]
struct MessageResponse {
    id: String,
    subject: String,
    body: String,
    owner_id: Option<String>,
    created_at: String,
    updated_at: String,
}

fn to_response(m: MessageRow) -> MessageResponse {
    MessageResponse {
        id: m.id,
        subject: m.subject,
        body: m.body,
        owner_id: m.owner_id,
        created_at: m.created_at.to_rfc3339(),
        updated_at: m.updated_at.to_rfc3339(),
    }
}

/// List visible messages, ordered by subject.
#[utoipa::path(
    get,
    path = "/v1/messages",
    tag = "Messages",
    security(("bearer_auth" = [])),
    params(PaginationParams),
    responses(
        (status = 200, description = "Message page", body = Vec<MessageResponse>),
        (status = 401, description = "Unauthenticated", body = crate::api::ApiError)
    )
)]
async fn list_messages(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Query(pagination): Query<PaginationParams>,
) -> impl IntoResponse {
    let scope = actor_scope(&claims);
    let total = match state.store.count_messages(&scope).await {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "Failed to count messages");
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
        .list_messages(&scope, pagination.limit(), pagination.offset())
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
            tracing::error!(error = %e, "Failed to list messages");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
        }
    }
}

/// Compose a message owned by the acting user.
#[utoipa::path(
    post,
    path = "/v1/messages",
    tag = "Messages",
    security(("bearer_auth" = [])),
    request_body = CreateMessageRequest,
    responses(
        (status = 201, description = "Message created", body = MessageResponse),
        (status = 400, description = "Invalid fields", body = crate::api::ApiError)
    )
)]
async fn create_message(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Json(req): Json<CreateMessageRequest>,
) -> impl IntoResponse {
    if req.subject.is_empty() || req.body.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            "validation_error",
            "subject and body are required",
        );
    }

    let now = chrono::Utc::now();
    let row = MessageRow {
        id: mailcast_common::id::next_id(),
        subject: req.subject,
        body: req.body,
        owner_id: Some(claims.sub.clone()),
        created_at: now,
        updated_at: now,
    };
    match state.store.insert_message(&row).await {
        Ok(created) => success_response(StatusCode::CREATED, &trace_id, to_response(created)),
        Err(e) => {
            tracing::error!(error = %e, "Failed to create message");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
        }
    }
}

/// Fetch one visible message.
#[utoipa::path(
    get,
    path = "/v1/messages/{id}",
    tag = "Messages",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Message ID")),
    responses(
        (status = 200, description = "Message", body = MessageResponse),
        (status = 404, description = "Not found", body = crate::api::ApiError)
    )
)]
async fn get_message(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let scope = actor_scope(&claims);
    match state.store.get_message_by_id(&id).await {
        Ok(Some(m)) if scope.allows(&m.owner_id) => {
            success_response(StatusCode::OK, &trace_id, to_response(m))
        }
        Ok(_) => error_response(
            StatusCode::NOT_FOUND,
            &trace_id,
            "not_found",
            "message not found",
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to get message");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
        }
    }
}

/// Update one visible message.
#[utoipa::path(
    put,
    path = "/v1/messages/{id}",
    tag = "Messages",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Message ID")),
    request_body = UpdateMessageRequest,
    responses(
        (status = 200, description = "Updated message", body = MessageResponse),
        (status = 404, description = "Not found", body = crate::api::ApiError)
    )
)]
async fn update_message(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateMessageRequest>,
) -> impl IntoResponse {
    let scope = actor_scope(&claims);
    match state.store.get_message_by_id(&id).await {
        Ok(Some(m)) if scope.allows(&m.owner_id) => {}
        Ok(_) => {
            return error_response(
                StatusCode::NOT_FOUND,
                &trace_id,
                "not_found",
                "message not found",
            );
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to get message");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            );
        }
    };

    let upd = MessageUpdate {
        subject: req.subject,
        body: req.body,
    };
    match state.store.update_message(&id, &upd).await {
        Ok(Some(m)) => success_response(StatusCode::OK, &trace_id, to_response(m)),
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            &trace_id,
            "not_found",
            "message not found",
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to update message");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
        }
    }
}

/// Delete one visible message (cascades to mailings referencing it).
#[utoipa::path(
    delete,
    path = "/v1/messages/{id}",
    tag = "Messages",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Message ID")),
    responses(
        (status = 200, description = "Message deleted"),
        (status = 404, description = "Not found", body = crate::api::ApiError)
    )
)]
async fn delete_message(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let scope = actor_scope(&claims);
    match state.store.get_message_by_id(&id).await {
        Ok(Some(m)) if scope.allows(&m.owner_id) => {}
        Ok(_) => {
            return error_response(
                StatusCode::NOT_FOUND,
                &trace_id,
                "not_found",
                "message not found",
            );
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to get message");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            );
        }
    }
    match state.store.delete_message(&id).await {
        Ok(true) => success_empty_response(StatusCode::OK, &trace_id, "Message deleted"),
        Ok(false) => error_response(
            StatusCode::NOT_FOUND,
            &trace_id,
            "not_found",
            "message not found",
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to delete message");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
        }
    }
}

pub fn message_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(list_messages, create_message))
        .routes(routes!(get_message, update_message, delete_message))
}
