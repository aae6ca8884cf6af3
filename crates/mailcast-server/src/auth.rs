use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use mailcast_common::types::{LoginRequest, LoginResponse, OwnerScope, RegisterRequest, UserRole};
use mailcast_storage::auth::{hash_password, verify_password};
use mailcast_storage::UserRow;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::{error_response, success_empty_response, success_response};
use crate::logging::TraceId;
use crate::state::AppState;

const ACTIVATE_PURPOSE: &str = "activate";
const RESET_PURPOSE: &str = "reset";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub role: String,
    pub iat: u64,
    pub exp: u64,
}

impl Claims {
    pub fn is_manager(&self) -> bool {
        self.role == UserRole::Manager.as_str()
    }
}

/// The ownership scope a request acts under, reduced from the JWT claims.
pub fn actor_scope(claims: &Claims) -> OwnerScope {
    OwnerScope {
        user_id: claims.sub.clone(),
        is_manager: claims.is_manager(),
    }
}

pub fn create_token(secret: &str, user: &UserRow, expire_secs: u64) -> anyhow::Result<String> {
    let now = Utc::now().timestamp() as u64;
    let claims = Claims {
        sub: user.id.clone(),
        email: user.email.clone(),
        role: user.role.as_str().to_string(),
        iat: now,
        exp: now + expire_secs,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok(token)
}

pub fn validate_token(secret: &str, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

fn trace_id_of(req: &Request<Body>) -> String {
    req.extensions()
        .get::<TraceId>()
        .map(|t| t.0.clone())
        .unwrap_or_default()
}

/// JWT bearer authentication middleware. Inserts [`Claims`] into request
/// extensions for downstream handlers.
pub async fn jwt_auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> axum::response::Response {
    let trace_id = trace_id_of(&req);
    let auth_header = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let token = match auth_header {
        None => {
            return error_response(
                StatusCode::UNAUTHORIZED,
                &trace_id,
                "unauthorized",
                "missing authorization header",
            );
        }
        Some(header) => {
            if let Some(token) = header.strip_prefix("Bearer ") {
                if token.is_empty() {
                    return error_response(
                        StatusCode::UNAUTHORIZED,
                        &trace_id,
                        "unauthorized",
                        "invalid authorization header",
                    );
                }
                token
            } else {
                return error_response(
                    StatusCode::UNAUTHORIZED,
                    &trace_id,
                    "unauthorized",
                    "invalid authorization header",
                );
            }
        }
    };

    match validate_token(&state.jwt_secret, token) {
        Ok(claims) => {
            req.extensions_mut().insert(claims);
            next.run(req).await
        }
        Err(e) => {
            if matches!(
                e.kind(),
                jsonwebtoken::errors::ErrorKind::ExpiredSignature
            ) {
                error_response(
                    StatusCode::UNAUTHORIZED,
                    &trace_id,
                    "token_expired",
                    "token expired",
                )
            } else {
                error_response(
                    StatusCode::UNAUTHORIZED,
                    &trace_id,
                    "unauthorized",
                    "invalid token",
                )
            }
        }
    }
}

/// Sends an account-lifecycle message (activation link, reset token)
/// through the shared mail transport. Failures are logged, not surfaced;
/// the account operation itself already succeeded.
async fn send_account_email(state: &AppState, to: &str, subject: &str, body: &str) {
    if let Err(e) = state
        .transport
        .send(subject, body, &state.config.smtp.from_address, &[to.to_string()])
        .await
    {
        tracing::error!(to = %to, error = %e, "Failed to send account email");
    }
}

#[derive(Serialize, ToSchema)]
struct RegisteredResponse {
    id: String,
    email: String,
}

/// Register a new account. The account starts inactive; an activation
/// link is emailed to the given address.
#[utoipa::path(
    post,
    path = "/v1/auth/register",
    tag = "Auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created, activation mail sent", body = RegisteredResponse),
        (status = 400, description = "Invalid email or password", body = crate::api::ApiError),
        (status = 409, description = "Email already registered", body = crate::api::ApiError)
    )
)]
pub async fn register(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> impl IntoResponse {
    if !req.email.contains('@') {
        return error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            "validation_error",
            "a valid email address is required",
        );
    }
    if req.password.len() < 8 {
        return error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            "validation_error",
            "password must be at least 8 characters",
        );
    }

    match state.store.get_user_by_email(&req.email).await {
        Ok(Some(_)) => {
            return error_response(
                StatusCode::CONFLICT,
                &trace_id,
                "conflict",
                "email already registered",
            );
        }
        Ok(None) => {}
        Err(e) => {
            tracing::error!(error = %e, "Failed to check existing user");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            );
        }
    }

    let password_hash = match hash_password(&req.password) {
        Ok(h) => h,
        Err(e) => {
            tracing::error!(error = %e, "Failed to hash password");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "internal_error",
                "internal error",
            );
        }
    };

    let user = match state
        .store
        .create_user(&req.email, &password_hash, UserRole::Member, false)
        .await
    {
        Ok(u) => u,
        Err(e) => {
            tracing::error!(error = %e, "Failed to create user");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            );
        }
    };

    let expires_at = Utc::now() + Duration::seconds(state.config.auth.activation_ttl_secs as i64);
    match state
        .store
        .token_signer()
        .sign(&user.id, ACTIVATE_PURPOSE, expires_at)
    {
        Ok(token) => {
            let link = format!(
                "{}/v1/auth/activate/{}/{}",
                state.config.site_base_url, user.id, token
            );
            let body = format!(
                "Welcome to mailcast!\n\n\
                 Activate your account by opening the link below:\n{link}\n\n\
                 If you did not register, you can ignore this message."
            );
            send_account_email(&state, &user.email, "Activate your mailcast account", &body).await;
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to sign activation token");
        }
    }

    tracing::info!(user_id = %user.id, email = %user.email, "Account registered");
    success_response(
        StatusCode::CREATED,
        &trace_id,
        RegisteredResponse {
            id: user.id,
            email: user.email,
        },
    )
}

/// Activate an account from an emailed link.
#[utoipa::path(
    get,
    path = "/v1/auth/activate/{user_id}/{token}",
    tag = "Auth",
    params(
        ("user_id" = String, Path, description = "Account ID"),
        ("token" = String, Path, description = "Signed activation token")
    ),
    responses(
        (status = 200, description = "Account activated"),
        (status = 400, description = "Invalid or expired token", body = crate::api::ApiError),
        (status = 404, description = "Unknown account", body = crate::api::ApiError)
    )
)]
pub async fn activate(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path((user_id, token)): Path<(String, String)>,
) -> impl IntoResponse {
    let user = match state.store.get_user_by_id(&user_id).await {
        Ok(Some(u)) => u,
        Ok(None) => {
            return error_response(
                StatusCode::NOT_FOUND,
                &trace_id,
                "not_found",
                "account not found",
            );
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to load user");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            );
        }
    };

    if !state
        .store
        .token_signer()
        .verify(&user.id, ACTIVATE_PURPOSE, &token)
    {
        return error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            "bad_request",
            "activation link is invalid or expired",
        );
    }

    if let Err(e) = state.store.set_user_active(&user.id, true).await {
        tracing::error!(error = %e, "Failed to activate user");
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            &trace_id,
            "storage_error",
            "Database error",
        );
    }
    tracing::info!(user_id = %user.id, "Account activated");
    success_empty_response(StatusCode::OK, &trace_id, "Account activated")
}

/// Log in with email and password. Inactive and blocked accounts are
/// refused.
#[utoipa::path(
    post,
    path = "/v1/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = LoginResponse),
        (status = 400, description = "Missing credentials", body = crate::api::ApiError),
        (status = 401, description = "Invalid credentials or disabled account", body = crate::api::ApiError)
    )
)]
pub async fn login(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> impl IntoResponse {
    if req.email.is_empty() || req.password.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            "bad_request",
            "email and password are required",
        );
    }

    let user = match state.store.get_user_by_email(&req.email).await {
        Ok(Some(u)) => u,
        Ok(None) => {
            return error_response(
                StatusCode::UNAUTHORIZED,
                &trace_id,
                "unauthorized",
                "invalid credentials",
            );
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to query user");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            );
        }
    };

    match verify_password(&req.password, &user.password_hash) {
        Ok(true) => {}
        _ => {
            return error_response(
                StatusCode::UNAUTHORIZED,
                &trace_id,
                "unauthorized",
                "invalid credentials",
            );
        }
    }

    if !user.is_active || user.is_blocked {
        return error_response(
            StatusCode::UNAUTHORIZED,
            &trace_id,
            "unauthorized",
            "account is disabled",
        );
    }

    match create_token(&state.jwt_secret, &user, state.token_expire_secs) {
        Ok(token) => success_response(
            StatusCode::OK,
            &trace_id,
            LoginResponse {
                token,
                expires_in: state.token_expire_secs,
            },
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to create token");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "internal_error",
                "internal error",
            )
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct PasswordResetRequest {
    pub email: String,
}

/// Request a password reset. Always answers 200; when the account exists,
/// a reset token is emailed to it.
#[utoipa::path(
    post,
    path = "/v1/auth/password-reset",
    tag = "Auth",
    request_body = PasswordResetRequest,
    responses(
        (status = 200, description = "Reset mail sent when the account exists")
    )
)]
pub async fn password_reset_request(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Json(req): Json<PasswordResetRequest>,
) -> impl IntoResponse {
    match state.store.get_user_by_email(&req.email).await {
        Ok(Some(user)) => {
            let expires_at =
                Utc::now() + Duration::seconds(state.config.auth.reset_ttl_secs as i64);
            match state
                .store
                .token_signer()
                .sign(&user.id, RESET_PURPOSE, expires_at)
            {
                Ok(token) => {
                    let body = format!(
                        "A password reset was requested for your mailcast account.\n\n\
                         uid: {}\n\
                         token: {}\n\n\
                         The token expires in one hour. If you did not request a reset,\n\
                         you can ignore this message.",
                        user.id, token
                    );
                    send_account_email(&state, &user.email, "Reset your mailcast password", &body)
                        .await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to sign reset token");
                }
            }
        }
        Ok(None) => {}
        Err(e) => {
            tracing::error!(error = %e, "Failed to query user for reset");
        }
    }

    success_empty_response(
        StatusCode::OK,
        &trace_id,
        "If the account exists, a reset message has been sent",
    )
}

#[derive(Deserialize, ToSchema)]
pub struct PasswordResetConfirm {
    pub user_id: String,
    pub token: String,
    pub new_password: String,
}

/// Confirm a password reset with an emailed token.
#[utoipa::path(
    post,
    path = "/v1/auth/password-reset/confirm",
    tag = "Auth",
    request_body = PasswordResetConfirm,
    responses(
        (status = 200, description = "Password updated"),
        (status = 400, description = "Invalid token or password", body = crate::api::ApiError)
    )
)]
pub async fn password_reset_confirm(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Json(req): Json<PasswordResetConfirm>,
) -> impl IntoResponse {
    if req.new_password.len() < 8 {
        return error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            "validation_error",
            "password must be at least 8 characters",
        );
    }

    let valid = match state.store.get_user_by_id(&req.user_id).await {
        Ok(Some(_)) => state
            .store
            .token_signer()
            .verify(&req.user_id, RESET_PURPOSE, &req.token),
        Ok(None) => false,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load user for reset");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            );
        }
    };
    if !valid {
        return error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            "bad_request",
            "reset token is invalid or expired",
        );
    }

    let password_hash = match hash_password(&req.new_password) {
        Ok(h) => h,
        Err(e) => {
            tracing::error!(error = %e, "Failed to hash password");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "internal_error",
                "internal error",
            );
        }
    };

    if let Err(e) = state
        .store
        .update_user_password_hash(&req.user_id, &password_hash)
        .await
    {
        tracing::error!(error = %e, "Failed to update password");
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            &trace_id,
            "storage_error",
            "Database error",
        );
    }
    tracing::info!(user_id = %req.user_id, "Password reset");
    success_empty_response(StatusCode::OK, &trace_id, "Password updated")
}
