use axum::extract::{Extension, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use mailcast_common::types::{AttemptStatus, MailingStatus};
use serde::Serialize;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

use crate::api::{error_response, success_response};
use crate::auth::Claims;
use crate::logging::TraceId;
use crate::state::AppState;

/// Store-wide figures shown to managers.
#[derive(Serialize, ToSchema)]
struct ManagerDashboard {
    total_mailings: u64,
    running_mailings: u64,
    unique_recipients: u64,
}

/// The acting member's own delivery figures.
#[derive(Serialize, ToSchema)]
struct MemberDashboard {
    sent_messages: u64,
    successful_attempts: u64,
    failed_attempts: u64,
}

#[derive(Serialize, ToSchema)]
#[serde(untagged)]
enum DashboardData {
    Manager(ManagerDashboard),
    Member(MemberDashboard),
}

/// Home dashboard. Managers see store-wide mailing figures; members see
/// their own attempt counts.
#[utoipa::path(
    get,
    path = "/v1/dashboard",
    tag = "Dashboard",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Dashboard figures", body = DashboardData),
        (status = 401, description = "Unauthenticated", body = crate::api::ApiError)
    )
)]
async fn dashboard(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let result: anyhow::Result<DashboardData> = if claims.is_manager() {
        async {
            Ok(DashboardData::Manager(ManagerDashboard {
                total_mailings: state.store.count_all_mailings().await?,
                running_mailings: state
                    .store
                    .count_mailings_with_status(MailingStatus::Running)
                    .await?,
                unique_recipients: state.store.count_all_recipients().await?,
            }))
        }
        .await
    } else {
        async {
            Ok(DashboardData::Member(MemberDashboard {
                sent_messages: state.store.count_attempts_by_owner(&claims.sub, None).await?,
                successful_attempts: state
                    .store
                    .count_attempts_by_owner(&claims.sub, Some(AttemptStatus::Success))
                    .await?,
                failed_attempts: state
                    .store
                    .count_attempts_by_owner(&claims.sub, Some(AttemptStatus::Failure))
                    .await?,
            }))
        }
        .await
    };

    match result {
        Ok(data) => success_response(StatusCode::OK, &trace_id, data),
        Err(e) => {
            tracing::error!(error = %e, "Failed to build dashboard");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
        }
    }
}

pub fn dashboard_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().routes(routes!(dashboard))
}
