mod common;

use axum::http::StatusCode;
use common::*;
use serde_json::json;

#[tokio::test]
async fn health_is_public() {
    let ctx = build_test_context().await.unwrap();

    let (status, body) = request_no_body(&ctx.app, "GET", "/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_ok_envelope(&body);
    assert_eq!(body["data"]["storage_status"], "ok");
}

#[tokio::test]
async fn protected_routes_require_a_token() {
    let ctx = build_test_context().await.unwrap();

    let (status, body) = request_no_body(&ctx.app, "GET", "/v1/recipients", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_err_envelope(&body, 1002);

    let (status, _) =
        request_no_body(&ctx.app, "GET", "/v1/recipients", Some("not-a-jwt")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn registration_requires_activation_before_login() {
    let ctx = build_test_context().await.unwrap();

    let (status, body) = request_json(
        &ctx.app,
        "POST",
        "/v1/auth/register",
        None,
        Some(json!({ "email": "new@example.com", "password": "super-secret" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_ok_envelope(&body);

    // Not yet activated: login is refused.
    let (status, body) = request_json(
        &ctx.app,
        "POST",
        "/v1/auth/login",
        None,
        Some(json!({ "email": "new@example.com", "password": "super-secret" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_err_envelope(&body, 1002);

    // Walk the emailed activation link, then log in.
    let mail = ctx.transport.last_mail_to("new@example.com").unwrap();
    let path = extract_activation_path(&mail.body);
    let (status, _) = request_no_body(&ctx.app, "GET", &path, None).await;
    assert_eq!(status, StatusCode::OK);

    let token = login(&ctx.app, "new@example.com", "super-secret").await;
    assert!(!token.is_empty());
}

#[tokio::test]
async fn duplicate_registration_is_a_conflict() {
    let ctx = build_test_context().await.unwrap();

    register_and_activate(&ctx, "taken@example.com", "super-secret").await;
    let (status, body) = request_json(
        &ctx.app,
        "POST",
        "/v1/auth/register",
        None,
        Some(json!({ "email": "taken@example.com", "password": "other-secret" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_err_envelope(&body, 1005);
}

#[tokio::test]
async fn tampered_activation_link_is_rejected() {
    let ctx = build_test_context().await.unwrap();

    let (status, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/auth/register",
        None,
        Some(json!({ "email": "x@example.com", "password": "super-secret" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let mail = ctx.transport.last_mail_to("x@example.com").unwrap();
    let path = extract_activation_path(&mail.body);
    let (status, body) = request_no_body(&ctx.app, "GET", &format!("{path}x"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_err_envelope(&body, 1001);
}

#[tokio::test]
async fn password_reset_flow_replaces_the_password() {
    let ctx = build_test_context().await.unwrap();

    register_and_activate(&ctx, "reset@example.com", "old-password").await;

    let (status, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/auth/password-reset",
        None,
        Some(json!({ "email": "reset@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let mail = ctx.transport.last_mail_to("reset@example.com").unwrap();
    let (uid, token) = extract_reset_credentials(&mail.body);

    let (status, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/auth/password-reset/confirm",
        None,
        Some(json!({ "user_id": uid, "token": token, "new_password": "brand-new-pw" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Old password no longer works; the new one does.
    let (status, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/auth/login",
        None,
        Some(json!({ "email": "reset@example.com", "password": "old-password" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    login(&ctx.app, "reset@example.com", "brand-new-pw").await;
}

#[tokio::test]
async fn reset_request_for_unknown_account_still_answers_ok() {
    let ctx = build_test_context().await.unwrap();

    let (status, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/auth/password-reset",
        None,
        Some(json!({ "email": "ghost@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(ctx.transport.last_mail_to("ghost@example.com").is_none());
}

#[tokio::test]
async fn blocked_member_cannot_login() {
    let ctx = build_test_context().await.unwrap();

    register_and_activate(&ctx, "victim@example.com", "super-secret").await;
    let manager_token = login_manager(&ctx).await;

    let user = ctx
        .state
        .store
        .get_user_by_email("victim@example.com")
        .await
        .unwrap()
        .unwrap();
    let (status, _) = request_no_body(
        &ctx.app,
        "POST",
        &format!("/v1/users/{}/block", user.id),
        Some(&manager_token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = request_json(
        &ctx.app,
        "POST",
        "/v1/auth/login",
        None,
        Some(json!({ "email": "victim@example.com", "password": "super-secret" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_err_envelope(&body, 1002);

    // Unblock restores access.
    let (status, _) = request_no_body(
        &ctx.app,
        "POST",
        &format!("/v1/users/{}/unblock", user.id),
        Some(&manager_token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    login(&ctx.app, "victim@example.com", "super-secret").await;
}

#[tokio::test]
async fn profile_can_be_read_and_updated() {
    let ctx = build_test_context().await.unwrap();

    let token = register_and_activate(&ctx, "me@example.com", "super-secret").await;

    let (status, body) = request_no_body(&ctx.app, "GET", "/v1/profile", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["email"], "me@example.com");
    assert_eq!(body["data"]["role"], "member");

    let (status, body) = request_json(
        &ctx.app,
        "PUT",
        "/v1/profile",
        Some(&token),
        Some(json!({ "display_name": "Mel", "country": "NL" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["display_name"], "Mel");
    assert_eq!(body["data"]["country"], "NL");
}
