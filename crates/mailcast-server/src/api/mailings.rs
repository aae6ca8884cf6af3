use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use mailcast_common::types::{MailingStatus, OwnerScope};
use mailcast_dispatch::{DispatchError, PassSummary};
use mailcast_storage::{MailingRow, MailingUpdate, SendAttemptFilter};
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

use crate::api::attempts::attempt_to_response;
use crate::api::pagination::PaginationParams;
use crate::api::{error_response, success_empty_response, success_paginated_response, success_response};
use crate::auth::{actor_scope, Claims};
use crate::logging::TraceId;
use crate::state::AppState;

#[derive(Deserialize, ToSchema)]
struct CreateMailingRequest {
    message_id: String,
    recipient_ids: Vec<String>,
    #[serde(default)]
    end_at: Option<DateTime<Utc>>,
}

/// `end_at` distinguishes "absent" (leave untouched) from "null" (clear):
/// an explicit null clears the end time.
#[derive(Deserialize, ToSchema)]
struct UpdateMailingRequest {
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    end_at: Option<Option<DateTime<Utc>>>,
    message_id: Option<String>,
    recipient_ids: Option<Vec<String>>,
}

fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

#[derive(Serialize, ToSchema)]
struct MailingResponse {
    id: String,
    status: MailingStatus,
    first_sent_at: Option<String>,
    end_at: Option<String>,
    message_id: String,
    recipient_ids: Vec<String>,
    owner_id: Option<String>,
    total_sent: i32,
    successful_sends: i32,
    failed_sends: i32,
    created_at: String,
    updated_at: String,
}

fn to_response(m: MailingRow, recipient_ids: Vec<String>) -> MailingResponse {
    MailingResponse {
        id: m.id,
        status: m.status,
        first_sent_at: m.first_sent_at.map(|t| t.to_rfc3339()),
        end_at: m.end_at.map(|t| t.to_rfc3339()),
        message_id: m.message_id,
        recipient_ids,
        owner_id: m.owner_id,
        total_sent: m.total_sent,
        successful_sends: m.successful_sends,
        failed_sends: m.failed_sends,
        created_at: m.created_at.to_rfc3339(),
        updated_at: m.updated_at.to_rfc3339(),
    }
}

/// Non-managers may only reference their own message.
async fn check_message_ref(
    state: &AppState,
    scope: &OwnerScope,
    trace_id: &str,
    message_id: &str,
) -> Result<(), Response> {
    match state.store.get_message_by_id(message_id).await {
        Ok(Some(m)) if scope.allows(&m.owner_id) => Ok(()),
        Ok(_) => Err(error_response(
            StatusCode::BAD_REQUEST,
            trace_id,
            "validation_error",
            "message not found",
        )),
        Err(e) => {
            tracing::error!(error = %e, "Failed to check message reference");
            Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                trace_id,
                "storage_error",
                "Database error",
            ))
        }
    }
}

/// Non-managers may only reference their own recipients; every ID must
/// resolve.
async fn check_recipient_refs(
    state: &AppState,
    scope: &OwnerScope,
    trace_id: &str,
    recipient_ids: &[String],
) -> Result<(), Response> {
    if recipient_ids.is_empty() {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            trace_id,
            "validation_error",
            "at least one recipient is required",
        ));
    }
    let rows = match state.store.list_recipients_by_ids(recipient_ids).await {
        Ok(rows) => rows,
        Err(e) => {
            tracing::error!(error = %e, "Failed to check recipient references");
            return Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                trace_id,
                "storage_error",
                "Database error",
            ));
        }
    };
    let unique: std::collections::HashSet<&str> =
        recipient_ids.iter().map(String::as_str).collect();
    if unique.len() != recipient_ids.len() {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            trace_id,
            "validation_error",
            "duplicate recipients in the set",
        ));
    }
    if rows.len() != unique.len() || rows.iter().any(|r| !scope.allows(&r.owner_id)) {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            trace_id,
            "validation_error",
            "one or more recipients not found",
        ));
    }
    Ok(())
}

/// List visible mailings in insertion order.
#[utoipa::path(
    get,
    path = "/v1/mailings",
    tag = "Mailings",
    security(("bearer_auth" = [])),
    params(PaginationParams),
    responses(
        (status = 200, description = "Mailing page", body = Vec<MailingResponse>),
        (status = 401, description = "Unauthenticated", body = crate::api::ApiError)
    )
)]
async fn list_mailings(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Query(pagination): Query<PaginationParams>,
) -> impl IntoResponse {
    let scope = actor_scope(&claims);
    let total = match state.store.count_mailings(&scope).await {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "Failed to count mailings");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            );
        }
    };
    let rows = match state
        .store
        .list_mailings(&scope, pagination.limit(), pagination.offset())
        .await
    {
        Ok(rows) => rows,
        Err(e) => {
            tracing::error!(error = %e, "Failed to list mailings");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            );
        }
    };

    let mut items = Vec::with_capacity(rows.len());
    for m in rows {
        let recipient_ids = state
            .store
            .list_mailing_recipient_ids(&m.id)
            .await
            .unwrap_or_default();
        items.push(to_response(m, recipient_ids));
    }
    success_paginated_response(
        StatusCode::OK,
        &trace_id,
        items,
        total,
        pagination.limit(),
        pagination.offset(),
    )
}

/// Create a mailing pairing one message with a recipient set.
#[utoipa::path(
    post,
    path = "/v1/mailings",
    tag = "Mailings",
    security(("bearer_auth" = [])),
    request_body = CreateMailingRequest,
    responses(
        (status = 201, description = "Mailing created", body = MailingResponse),
        (status = 400, description = "Invalid references", body = crate::api::ApiError)
    )
)]
async fn create_mailing(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Json(req): Json<CreateMailingRequest>,
) -> impl IntoResponse {
    let scope = actor_scope(&claims);
    if let Err(resp) = check_message_ref(&state, &scope, &trace_id, &req.message_id).await {
        return resp;
    }
    if let Err(resp) = check_recipient_refs(&state, &scope, &trace_id, &req.recipient_ids).await {
        return resp;
    }

    let now = Utc::now();
    let row = MailingRow {
        id: mailcast_common::id::next_id(),
        first_sent_at: None,
        end_at: req.end_at,
        status: MailingStatus::Created,
        message_id: req.message_id,
        owner_id: Some(claims.sub.clone()),
        total_sent: 0,
        successful_sends: 0,
        failed_sends: 0,
        created_at: now,
        updated_at: now,
    };
    match state.store.insert_mailing(&row, &req.recipient_ids).await {
        Ok(created) => {
            success_response(StatusCode::CREATED, &trace_id, to_response(created, req.recipient_ids))
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to create mailing");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
        }
    }
}

async fn load_visible_mailing(
    state: &AppState,
    scope: &OwnerScope,
    trace_id: &str,
    id: &str,
) -> Result<MailingRow, Response> {
    match state.store.get_mailing_by_id(id).await {
        Ok(Some(m)) if scope.allows(&m.owner_id) => Ok(m),
        Ok(_) => Err(error_response(
            StatusCode::NOT_FOUND,
            trace_id,
            "not_found",
            "mailing not found",
        )),
        Err(e) => {
            tracing::error!(error = %e, "Failed to get mailing");
            Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                trace_id,
                "storage_error",
                "Database error",
            ))
        }
    }
}

/// Fetch one visible mailing.
#[utoipa::path(
    get,
    path = "/v1/mailings/{id}",
    tag = "Mailings",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Mailing ID")),
    responses(
        (status = 200, description = "Mailing", body = MailingResponse),
        (status = 404, description = "Not found", body = crate::api::ApiError)
    )
)]
async fn get_mailing(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let scope = actor_scope(&claims);
    let mailing = match load_visible_mailing(&state, &scope, &trace_id, &id).await {
        Ok(m) => m,
        Err(resp) => return resp,
    };
    let recipient_ids = state
        .store
        .list_mailing_recipient_ids(&id)
        .await
        .unwrap_or_default();
    success_response(StatusCode::OK, &trace_id, to_response(mailing, recipient_ids))
}

/// Edit a mailing. Changing `end_at` forces the status back to `running`
/// (the manual reopen mechanism); re-saving the same value leaves it
/// untouched.
#[utoipa::path(
    put,
    path = "/v1/mailings/{id}",
    tag = "Mailings",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Mailing ID")),
    request_body = UpdateMailingRequest,
    responses(
        (status = 200, description = "Updated mailing", body = MailingResponse),
        (status = 400, description = "Invalid references", body = crate::api::ApiError),
        (status = 404, description = "Not found", body = crate::api::ApiError)
    )
)]
async fn update_mailing(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateMailingRequest>,
) -> impl IntoResponse {
    let scope = actor_scope(&claims);
    if let Err(resp) = load_visible_mailing(&state, &scope, &trace_id, &id).await {
        return resp;
    }
    if let Some(ref message_id) = req.message_id {
        if let Err(resp) = check_message_ref(&state, &scope, &trace_id, message_id).await {
            return resp;
        }
    }
    if let Some(ref recipient_ids) = req.recipient_ids {
        if let Err(resp) = check_recipient_refs(&state, &scope, &trace_id, recipient_ids).await {
            return resp;
        }
    }

    let upd = MailingUpdate {
        end_at: req.end_at,
        message_id: req.message_id,
        recipient_ids: req.recipient_ids,
    };
    match state.store.update_mailing(&id, &upd).await {
        Ok(Some(m)) => {
            let recipient_ids = state
                .store
                .list_mailing_recipient_ids(&id)
                .await
                .unwrap_or_default();
            success_response(StatusCode::OK, &trace_id, to_response(m, recipient_ids))
        }
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            &trace_id,
            "not_found",
            "mailing not found",
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to update mailing");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
        }
    }
}

/// Delete one visible mailing.
#[utoipa::path(
    delete,
    path = "/v1/mailings/{id}",
    tag = "Mailings",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Mailing ID")),
    responses(
        (status = 200, description = "Mailing deleted"),
        (status = 404, description = "Not found", body = crate::api::ApiError)
    )
)]
async fn delete_mailing(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let scope = actor_scope(&claims);
    if let Err(resp) = load_visible_mailing(&state, &scope, &trace_id, &id).await {
        return resp;
    }
    match state.store.delete_mailing(&id).await {
        Ok(true) => success_empty_response(StatusCode::OK, &trace_id, "Mailing deleted"),
        Ok(false) => error_response(
            StatusCode::NOT_FOUND,
            &trace_id,
            "not_found",
            "mailing not found",
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to delete mailing");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
        }
    }
}

/// Run one dispatch pass over the mailing's recipients (interactive
/// trigger: no precondition on the current status).
#[utoipa::path(
    post,
    path = "/v1/mailings/{id}/send",
    tag = "Mailings",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Mailing ID")),
    responses(
        (status = 200, description = "Pass summary", body = PassSummary),
        (status = 404, description = "Not found", body = crate::api::ApiError)
    )
)]
async fn send_mailing(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let scope = actor_scope(&claims);
    if let Err(resp) = load_visible_mailing(&state, &scope, &trace_id, &id).await {
        return resp;
    }

    match state.dispatcher.run_pass(&id, Some(claims.sub.as_str())).await {
        Ok(summary) => success_response(StatusCode::OK, &trace_id, summary),
        Err(DispatchError::MailingNotFound(_)) => error_response(
            StatusCode::NOT_FOUND,
            &trace_id,
            "not_found",
            "mailing not found",
        ),
        Err(DispatchError::NotRunning { .. }) => {
            // The interactive path never sets this precondition.
            error_response(
                StatusCode::CONFLICT,
                &trace_id,
                "not_running",
                "mailing is not running",
            )
        }
        Err(DispatchError::Store(e)) => {
            tracing::error!(error = %e, "Dispatch pass failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
        }
    }
}

/// Delivery attempts recorded for one visible mailing, in insertion
/// order.
#[utoipa::path(
    get,
    path = "/v1/mailings/{id}/attempts",
    tag = "Mailings",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Mailing ID"), PaginationParams),
    responses(
        (status = 200, description = "Attempt page"),
        (status = 404, description = "Not found", body = crate::api::ApiError)
    )
)]
async fn mailing_attempts(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(pagination): Query<PaginationParams>,
) -> impl IntoResponse {
    let scope = actor_scope(&claims);
    if let Err(resp) = load_visible_mailing(&state, &scope, &trace_id, &id).await {
        return resp;
    }

    // The mailing itself is visible, so its full audit trail is too —
    // including attempts stamped by other actors or by the scheduler.
    let audit_scope = OwnerScope {
        user_id: claims.sub.clone(),
        is_manager: true,
    };
    let filter = SendAttemptFilter {
        mailing_id: Some(id.clone()),
        ..Default::default()
    };
    let total = match state.store.count_send_attempts(&audit_scope, &filter).await {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "Failed to count attempts");
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
        .list_send_attempts(&audit_scope, &filter, pagination.limit(), pagination.offset())
        .await
    {
        Ok(rows) => success_paginated_response(
            StatusCode::OK,
            &trace_id,
            rows.into_iter().map(attempt_to_response).collect(),
            total,
            pagination.limit(),
            pagination.offset(),
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to list attempts");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
        }
    }
}

pub fn mailing_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(list_mailings, create_mailing))
        .routes(routes!(get_mailing, update_mailing, delete_mailing))
        .routes(routes!(send_mailing))
        .routes(routes!(mailing_attempts))
}
