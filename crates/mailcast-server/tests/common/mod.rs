#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use chrono::Utc;
use mailcast_common::types::{LoginRequest, UserRole};
use mailcast_dispatch::Dispatcher;
use mailcast_server::app;
use mailcast_server::config::{AuthConfig, DatabaseConfig, ServerConfig, SmtpConfig};
use mailcast_server::state::AppState;
use mailcast_storage::auth::hash_password;
use mailcast_storage::MailStore;
use mailcast_transport::{MailTransport, TransportError};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tower::util::ServiceExt;

pub const MANAGER_EMAIL: &str = "manager@example.com";
pub const MANAGER_PASSWORD: &str = "manager-secret";
pub const SITE_BASE_URL: &str = "http://testserver";

#[derive(Debug, Clone)]
pub struct SentMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Transport double shared between the app under test and the test body:
/// records everything, fails addresses on request.
pub struct MockTransport {
    fail_for: Mutex<HashSet<String>>,
    sent: Mutex<Vec<SentMail>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            fail_for: Mutex::new(HashSet::new()),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_address(&self, addr: &str) {
        self.fail_for.lock().unwrap().insert(addr.to_string());
    }

    pub fn sent_mails(&self) -> Vec<SentMail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn last_mail_to(&self, addr: &str) -> Option<SentMail> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|m| m.to == addr)
            .cloned()
    }
}

#[async_trait]
impl MailTransport for MockTransport {
    async fn send(
        &self,
        subject: &str,
        body: &str,
        _from: &str,
        to: &[String],
    ) -> Result<(), TransportError> {
        let addr = to.first().cloned().unwrap_or_default();
        self.sent.lock().unwrap().push(SentMail {
            to: addr.clone(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        if self.fail_for.lock().unwrap().contains(&addr) {
            Err(TransportError::Smtp("550 mailbox unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

pub struct TestContext {
    pub temp_dir: TempDir,
    pub state: AppState,
    pub app: axum::Router,
    pub transport: Arc<MockTransport>,
}

pub async fn build_test_context() -> Result<TestContext> {
    mailcast_common::id::init(1, 1);

    let temp_dir = tempfile::tempdir()?;
    let db_url = format!(
        "sqlite://{}?mode=rwc",
        temp_dir.path().join("mailcast.db").display()
    );
    let store = Arc::new(MailStore::new(&db_url, temp_dir.path()).await?);

    let password_hash = hash_password(MANAGER_PASSWORD)?;
    store
        .create_user(MANAGER_EMAIL, &password_hash, UserRole::Manager, true)
        .await?;

    let config = ServerConfig {
        http_port: 8080,
        site_base_url: SITE_BASE_URL.to_string(),
        cors_allowed_origins: Vec::new(),
        database: DatabaseConfig {
            url: db_url,
            data_dir: temp_dir.path().to_string_lossy().to_string(),
        },
        smtp: SmtpConfig::default(),
        auth: AuthConfig::default(),
    };

    let transport = Arc::new(MockTransport::new());
    let dispatcher = Arc::new(Dispatcher::new(
        store.clone(),
        transport.clone(),
        config.smtp.from_address.clone(),
    ));

    let state = AppState {
        store,
        dispatcher,
        transport: transport.clone(),
        start_time: Utc::now(),
        jwt_secret: Arc::new("test-secret".to_string()),
        token_expire_secs: 3600,
        config: Arc::new(config),
    };

    let app = app::build_http_app(state.clone());

    Ok(TestContext {
        temp_dir,
        state,
        app,
        transport,
    })
}

pub async fn request_json(
    app: &axum::Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    builder = builder.header("Content-Type", "application/json");

    let req_body = body.unwrap_or(Value::Null).to_string();
    let req = builder
        .body(Body::from(req_body))
        .expect("request should build");

    let resp = app
        .clone()
        .oneshot(req)
        .await
        .expect("request should be handled");

    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body should read");
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice::<Value>(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).to_string()))
    };

    (status, json)
}

pub async fn request_no_body(
    app: &axum::Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }

    let req = builder.body(Body::empty()).expect("request should build");

    let resp = app
        .clone()
        .oneshot(req)
        .await
        .expect("request should be handled");
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body should read");
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice::<Value>(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).to_string()))
    };

    (status, json)
}

pub async fn login(app: &axum::Router, email: &str, password: &str) -> String {
    let (status, body) = request_json(
        app,
        "POST",
        "/v1/auth/login",
        None,
        Some(
            serde_json::to_value(LoginRequest {
                email: email.to_string(),
                password: password.to_string(),
            })
            .expect("login request should serialize"),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["err_code"], 0);
    body["data"]["token"]
        .as_str()
        .expect("token should exist")
        .to_string()
}

pub async fn login_manager(ctx: &TestContext) -> String {
    login(&ctx.app, MANAGER_EMAIL, MANAGER_PASSWORD).await
}

/// Registers a member, walks the emailed activation link, and logs in.
pub async fn register_and_activate(ctx: &TestContext, email: &str, password: &str) -> String {
    let (status, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/auth/register",
        None,
        Some(serde_json::json!({ "email": email, "password": password })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let mail = ctx
        .transport
        .last_mail_to(email)
        .expect("activation mail should be sent");
    let path = extract_activation_path(&mail.body);
    let (status, _) = request_no_body(&ctx.app, "GET", &path, None).await;
    assert_eq!(status, StatusCode::OK);

    login(&ctx.app, email, password).await
}

/// Pulls the `/v1/auth/activate/{id}/{token}` path out of an activation
/// mail body.
pub fn extract_activation_path(body: &str) -> String {
    let idx = body
        .find("/v1/auth/activate/")
        .expect("mail should contain an activation link");
    body[idx..]
        .split_whitespace()
        .next()
        .expect("link should end with whitespace")
        .to_string()
}

/// Pulls the `uid:` / `token:` pair out of a reset mail body.
pub fn extract_reset_credentials(body: &str) -> (String, String) {
    let mut uid = None;
    let mut token = None;
    for line in body.lines() {
        if let Some(rest) = line.trim().strip_prefix("uid: ") {
            uid = Some(rest.trim().to_string());
        }
        if let Some(rest) = line.trim().strip_prefix("token: ") {
            token = Some(rest.trim().to_string());
        }
    }
    (
        uid.expect("mail should contain uid"),
        token.expect("mail should contain token"),
    )
}

pub fn assert_ok_envelope(json: &Value) {
    assert_eq!(json["err_code"], 0);
    assert!(json["err_msg"].is_string());
    assert!(json.get("trace_id").is_some());
}

pub fn assert_err_envelope(json: &Value, err_code: i64) {
    assert_eq!(json["err_code"], err_code);
    assert!(json["err_msg"].is_string());
    assert!(json.get("trace_id").is_some());
}

pub fn decode_data<T: DeserializeOwned>(json: &Value) -> T {
    serde_json::from_value(json["data"].clone()).expect("data should decode")
}
