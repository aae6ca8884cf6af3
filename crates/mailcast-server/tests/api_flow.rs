mod common;

use axum::http::StatusCode;
use common::*;
use serde_json::json;

async fn create_recipient(
    ctx: &TestContext,
    token: &str,
    email: &str,
    full_name: &str,
) -> String {
    let (status, body) = request_json(
        &ctx.app,
        "POST",
        "/v1/recipients",
        Some(token),
        Some(json!({ "email": email, "full_name": full_name })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["data"]["id"].as_str().unwrap().to_string()
}

async fn create_message(ctx: &TestContext, token: &str, subject: &str) -> String {
    let (status, body) = request_json(
        &ctx.app,
        "POST",
        "/v1/messages",
        Some(token),
        Some(json!({ "subject": subject, "body": "Fresh news inside" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["data"]["id"].as_str().unwrap().to_string()
}

async fn create_mailing(
    ctx: &TestContext,
    token: &str,
    message_id: &str,
    recipient_ids: &[String],
    end_at: Option<&str>,
) -> String {
    let (status, body) = request_json(
        &ctx.app,
        "POST",
        "/v1/mailings",
        Some(token),
        Some(json!({
            "message_id": message_id,
            "recipient_ids": recipient_ids,
            "end_at": end_at,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["data"]["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn recipient_crud_is_owner_scoped() {
    let ctx = build_test_context().await.unwrap();
    let alice = register_and_activate(&ctx, "alice@example.com", "super-secret").await;
    let bob = register_and_activate(&ctx, "bob@example.com", "super-secret").await;
    let manager = login_manager(&ctx).await;

    create_recipient(&ctx, &alice, "zoe@list.example.com", "Zoe").await;
    let amy_id = create_recipient(&ctx, &alice, "amy@list.example.com", "Amy").await;
    create_recipient(&ctx, &bob, "carl@list.example.com", "Carl").await;

    // Alice sees her own rows, ordered by email.
    let (status, body) = request_no_body(&ctx.app, "GET", "/v1/recipients", Some(&alice)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 2);
    assert_eq!(body["data"]["items"][0]["email"], "amy@list.example.com");
    assert_eq!(body["data"]["items"][1]["email"], "zoe@list.example.com");

    // The manager sees every owner's rows.
    let (_, body) = request_no_body(&ctx.app, "GET", "/v1/recipients", Some(&manager)).await;
    assert_eq!(body["data"]["total"], 3);

    // Bob cannot see or edit Alice's recipient.
    let (status, _) = request_no_body(
        &ctx.app,
        "GET",
        &format!("/v1/recipients/{amy_id}"),
        Some(&bob),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Duplicate email is a store-wide conflict, across owners too.
    let (status, body) = request_json(
        &ctx.app,
        "POST",
        "/v1/recipients",
        Some(&bob),
        Some(json!({ "email": "amy@list.example.com", "full_name": "Imposter" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_err_envelope(&body, 1005);

    // Owner update and delete round-trip.
    let (status, body) = request_json(
        &ctx.app,
        "PUT",
        &format!("/v1/recipients/{amy_id}"),
        Some(&alice),
        Some(json!({ "comment": "priority reader" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["comment"], "priority reader");

    let (status, _) = request_no_body(
        &ctx.app,
        "DELETE",
        &format!("/v1/recipients/{amy_id}"),
        Some(&alice),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = request_no_body(&ctx.app, "GET", "/v1/recipients", Some(&alice)).await;
    assert_eq!(body["data"]["total"], 1);
}

#[tokio::test]
async fn message_crud_round_trips() {
    let ctx = build_test_context().await.unwrap();
    let alice = register_and_activate(&ctx, "alice@example.com", "super-secret").await;

    let id = create_message(&ctx, &alice, "Weekly digest").await;

    let (status, body) =
        request_no_body(&ctx.app, "GET", &format!("/v1/messages/{id}"), Some(&alice)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["subject"], "Weekly digest");

    let (status, body) = request_json(
        &ctx.app,
        "PUT",
        &format!("/v1/messages/{id}"),
        Some(&alice),
        Some(json!({ "body": "Updated copy" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["body"], "Updated copy");

    let (status, _) =
        request_no_body(&ctx.app, "DELETE", &format!("/v1/messages/{id}"), Some(&alice)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) =
        request_no_body(&ctx.app, "GET", &format!("/v1/messages/{id}"), Some(&alice)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn mailing_creation_validates_foreign_references() {
    let ctx = build_test_context().await.unwrap();
    let alice = register_and_activate(&ctx, "alice@example.com", "super-secret").await;
    let bob = register_and_activate(&ctx, "bob@example.com", "super-secret").await;

    let alice_message = create_message(&ctx, &alice, "Private").await;
    let alice_recipient = create_recipient(&ctx, &alice, "r@list.example.com", "Reader").await;

    // Bob cannot bundle Alice's message or recipients.
    let (status, body) = request_json(
        &ctx.app,
        "POST",
        "/v1/mailings",
        Some(&bob),
        Some(json!({ "message_id": alice_message, "recipient_ids": [alice_recipient] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_err_envelope(&body, 1101);

    // Empty recipient sets are refused.
    let bob_message = create_message(&ctx, &bob, "Bulletin").await;
    let (status, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/mailings",
        Some(&bob),
        Some(json!({ "message_id": bob_message, "recipient_ids": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn send_pass_records_attempts_and_counters() {
    let ctx = build_test_context().await.unwrap();
    let alice = register_and_activate(&ctx, "alice@example.com", "super-secret").await;

    let message_id = create_message(&ctx, &alice, "Launch").await;
    let r1 = create_recipient(&ctx, &alice, "a@list.example.com", "A").await;
    let r2 = create_recipient(&ctx, &alice, "b@list.example.com", "B").await;
    let r3 = create_recipient(&ctx, &alice, "c@list.example.com", "C").await;
    let mailing_id = create_mailing(&ctx, &alice, &message_id, &[r1, r2, r3], None).await;

    ctx.transport.fail_address("b@list.example.com");

    let (status, body) = request_no_body(
        &ctx.app,
        "POST",
        &format!("/v1/mailings/{mailing_id}/send"),
        Some(&alice),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total_sent"], 3);
    assert_eq!(body["data"]["successful_sends"], 2);
    assert_eq!(body["data"]["failed_sends"], 1);
    assert_eq!(body["data"]["status"], "running");

    // Three audit rows, the failure carrying the transport error verbatim.
    let (status, body) = request_no_body(
        &ctx.app,
        "GET",
        &format!("/v1/mailings/{mailing_id}/attempts"),
        Some(&alice),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 3);
    let failure = body["data"]["items"]
        .as_array()
        .unwrap()
        .iter()
        .find(|a| a["status"] == "failure")
        .expect("one failure attempt");
    assert_eq!(failure["server_response"], "SMTP error: 550 mailbox unavailable");

    // The mailing row accumulated the counters.
    let (_, body) = request_no_body(
        &ctx.app,
        "GET",
        &format!("/v1/mailings/{mailing_id}"),
        Some(&alice),
    )
    .await;
    assert_eq!(body["data"]["total_sent"], 3);
    assert_eq!(body["data"]["successful_sends"], 2);
    assert_eq!(body["data"]["failed_sends"], 1);
    assert!(body["data"]["first_sent_at"].is_string());

    // The member dashboard reflects the acting user's attempts.
    let (_, body) = request_no_body(&ctx.app, "GET", "/v1/dashboard", Some(&alice)).await;
    assert_eq!(body["data"]["sent_messages"], 3);
    assert_eq!(body["data"]["successful_attempts"], 2);
    assert_eq!(body["data"]["failed_attempts"], 1);
}

#[tokio::test]
async fn sending_an_unknown_mailing_is_not_found() {
    let ctx = build_test_context().await.unwrap();
    let alice = register_and_activate(&ctx, "alice@example.com", "super-secret").await;
    let mails_before = ctx.transport.sent_mails().len();

    let (status, body) = request_no_body(
        &ctx.app,
        "POST",
        "/v1/mailings/999999/send",
        Some(&alice),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_err_envelope(&body, 1004);
    assert_eq!(ctx.transport.sent_mails().len(), mails_before);
}

#[tokio::test]
async fn editing_end_at_reopens_a_finished_mailing() {
    let ctx = build_test_context().await.unwrap();
    let alice = register_and_activate(&ctx, "alice@example.com", "super-secret").await;

    let message_id = create_message(&ctx, &alice, "Launch").await;
    let r1 = create_recipient(&ctx, &alice, "a@list.example.com", "A").await;
    let past = "2020-01-01T00:00:00Z";
    let mailing_id = create_mailing(&ctx, &alice, &message_id, &[r1], Some(past)).await;

    // A pass completing after end_at finishes the mailing.
    let (_, body) = request_no_body(
        &ctx.app,
        "POST",
        &format!("/v1/mailings/{mailing_id}/send"),
        Some(&alice),
    )
    .await;
    assert_eq!(body["data"]["status"], "finished");

    // Re-saving the same end_at leaves it finished.
    let (status, body) = request_json(
        &ctx.app,
        "PUT",
        &format!("/v1/mailings/{mailing_id}"),
        Some(&alice),
        Some(json!({ "end_at": past })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "finished");

    // A different end_at reopens it.
    let (status, body) = request_json(
        &ctx.app,
        "PUT",
        &format!("/v1/mailings/{mailing_id}"),
        Some(&alice),
        Some(json!({ "end_at": "2099-01-01T00:00:00Z" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "running");
}

#[tokio::test]
async fn manager_dashboard_shows_store_wide_figures() {
    let ctx = build_test_context().await.unwrap();
    let alice = register_and_activate(&ctx, "alice@example.com", "super-secret").await;
    let manager = login_manager(&ctx).await;

    let message_id = create_message(&ctx, &alice, "Launch").await;
    let r1 = create_recipient(&ctx, &alice, "a@list.example.com", "A").await;
    let r2 = create_recipient(&ctx, &alice, "b@list.example.com", "B").await;
    let running = create_mailing(&ctx, &alice, &message_id, &[r1.clone(), r2], None).await;
    create_mailing(&ctx, &alice, &message_id, &[r1], None).await;

    let (_, _) = request_no_body(
        &ctx.app,
        "POST",
        &format!("/v1/mailings/{running}/send"),
        Some(&alice),
    )
    .await;

    let (status, body) = request_no_body(&ctx.app, "GET", "/v1/dashboard", Some(&manager)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total_mailings"], 2);
    assert_eq!(body["data"]["running_mailings"], 1);
    assert_eq!(body["data"]["unique_recipients"], 2);
}

#[tokio::test]
async fn user_administration_is_manager_only() {
    let ctx = build_test_context().await.unwrap();
    let alice = register_and_activate(&ctx, "alice@example.com", "super-secret").await;
    let manager = login_manager(&ctx).await;

    let (status, body) = request_no_body(&ctx.app, "GET", "/v1/users", Some(&alice)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_err_envelope(&body, 1006);

    let (status, body) = request_no_body(&ctx.app, "GET", "/v1/users", Some(&manager)).await;
    assert_eq!(status, StatusCode::OK);
    let emails: Vec<String> = body["data"]["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["email"].as_str().unwrap().to_string())
        .collect();
    assert!(emails.contains(&"alice@example.com".to_string()));
    // Managers themselves are excluded from the member listing.
    assert!(!emails.contains(&MANAGER_EMAIL.to_string()));
}

#[tokio::test]
async fn deleting_a_message_cascades_to_its_mailings() {
    let ctx = build_test_context().await.unwrap();
    let alice = register_and_activate(&ctx, "alice@example.com", "super-secret").await;

    let message_id = create_message(&ctx, &alice, "Launch").await;
    let r1 = create_recipient(&ctx, &alice, "a@list.example.com", "A").await;
    let mailing_id = create_mailing(&ctx, &alice, &message_id, &[r1], None).await;

    let (status, _) = request_no_body(
        &ctx.app,
        "DELETE",
        &format!("/v1/messages/{message_id}"),
        Some(&alice),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = request_no_body(
        &ctx.app,
        "GET",
        &format!("/v1/mailings/{mailing_id}"),
        Some(&alice),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
