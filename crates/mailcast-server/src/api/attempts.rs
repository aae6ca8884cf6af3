use axum::extract::{Extension, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use mailcast_common::types::AttemptStatus;
use mailcast_storage::{SendAttemptFilter, SendAttemptRow};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

use crate::api::pagination::PaginationParams;
use crate::api::{error_response, success_paginated_response};
use crate::auth::{actor_scope, Claims};
use crate::logging::TraceId;
use crate::state::AppState;

#[derive(Serialize, ToSchema)]
pub struct SendAttemptResponse {
    pub id: String,
    pub attempted_at: String,
    pub status: AttemptStatus,
    pub server_response: String,
    pub mailing_id: String,
    pub recipient_id: Option<String>,
    pub message_id: Option<String>,
    pub owner_id: Option<String>,
}

pub(crate) fn attempt_to_response(a: SendAttemptRow) -> SendAttemptResponse {
    SendAttemptResponse {
        id: a.id,
        attempted_at: a.attempted_at.to_rfc3339(),
        status: a.status,
        server_response: a.server_response,
        mailing_id: a.mailing_id,
        recipient_id: a.recipient_id,
        message_id: a.message_id,
        owner_id: a.owner_id,
    }
}

#[derive(Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
struct AttemptQueryParams {
    /// Exact mailing match (optional)
    #[param(required = false)]
    #[serde(rename = "mailing_id__eq")]
    mailing_id_eq: Option<String>,
    /// Exact outcome match (optional)
    #[param(required = false)]
    #[serde(rename = "status__eq")]
    status_eq: Option<AttemptStatus>,
}

/// List the acting user's delivery attempts in insertion order (managers
/// see every owner's attempts).
#[utoipa::path(
    get,
    path = "/v1/attempts",
    tag = "Attempts",
    security(("bearer_auth" = [])),
    params(AttemptQueryParams, PaginationParams),
    responses(
        (status = 200, description = "Attempt page", body = Vec<SendAttemptResponse>),
        (status = 401, description = "Unauthenticated", body = crate::api::ApiError)
    )
)]
async fn list_attempts(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Query(params): Query<AttemptQueryParams>,
    Query(pagination): Query<PaginationParams>,
) -> impl IntoResponse {
    let scope = actor_scope(&claims);
    let filter = SendAttemptFilter {
        mailing_id: params.mailing_id_eq,
        status: params.status_eq,
    };
    let total = match state.store.count_send_attempts(&scope, &filter).await {
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
        .list_send_attempts(&scope, &filter, pagination.limit(), pagination.offset())
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

pub fn attempt_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().routes(routes!(list_attempts))
}
