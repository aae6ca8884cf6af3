use anyhow::Result;
use chrono::Utc;
use mailcast_common::types::UserRole;
use mailcast_dispatch::Dispatcher;
use mailcast_storage::MailStore;
use mailcast_transport::SmtpMailTransport;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use mailcast_server::app;
use mailcast_server::config::{self, ServerConfig};
use mailcast_server::state::AppState;

#[allow(clippy::print_stderr)]
fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  mailcast-server [config.toml]                        Start the server");
    eprintln!("  mailcast-server send-mailing <config.toml> <id>      Run one dispatch pass over a running mailing");
}

#[tokio::main]
async fn main() -> Result<()> {
    mailcast_common::id::init(1, 1);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("mailcast=info".parse()?))
        .init();

    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        Some("send-mailing") => {
            let config_path = args.get(2).ok_or_else(|| {
                print_usage();
                anyhow::anyhow!("send-mailing requires <config.toml> and <mailing_id> arguments")
            })?;
            let mailing_id = args.get(3).ok_or_else(|| {
                print_usage();
                anyhow::anyhow!("send-mailing requires <mailing_id> argument")
            })?;
            run_send_mailing(config_path, mailing_id).await
        }
        Some("--help" | "-h") => {
            print_usage();
            Ok(())
        }
        _ => {
            let config_path = args
                .get(1)
                .map(|s| s.as_str())
                .unwrap_or("config/server.toml");
            run_server(config_path).await
        }
    }
}

fn build_transport(config: &ServerConfig) -> Result<SmtpMailTransport> {
    let transport = SmtpMailTransport::new(
        &config.smtp.host,
        config.smtp.port,
        config.smtp.username.as_deref(),
        config.smtp.password.as_deref(),
    )?;
    Ok(transport)
}

/// Scheduled/operator trigger: one dispatch pass over a mailing that must
/// already be `running`. Exits non-zero when the mailing is missing or
/// not running.
async fn run_send_mailing(config_path: &str, mailing_id: &str) -> Result<()> {
    let config = config::ServerConfig::load(config_path)?;
    let store = Arc::new(
        MailStore::new(
            &config.database.connection_url(),
            Path::new(&config.database.data_dir),
        )
        .await?,
    );
    let transport = Arc::new(build_transport(&config)?);
    let dispatcher = Dispatcher::new(store, transport, config.smtp.from_address.clone());

    let summary = dispatcher.run_scheduled_pass(mailing_id).await?;
    tracing::info!(
        mailing_id = %summary.mailing_id,
        total_sent = summary.total_sent,
        successful_sends = summary.successful_sends,
        failed_sends = summary.failed_sends,
        status = %summary.status,
        "send-mailing completed"
    );
    Ok(())
}

async fn run_server(config_path: &str) -> Result<()> {
    let config = config::ServerConfig::load(config_path)?;

    tracing::info!(
        http_port = config.http_port,
        data_dir = %config.database.data_dir,
        db = %config.database.redacted_url(),
        "mailcast-server starting"
    );

    let store = Arc::new(
        MailStore::new(
            &config.database.connection_url(),
            Path::new(&config.database.data_dir),
        )
        .await?,
    );

    // Default manager account: create if the users table is empty
    match store.count_users().await {
        Ok(0) => {
            let password_hash =
                mailcast_storage::auth::hash_password(&config.auth.default_manager_password)?;
            match store
                .create_user(
                    &config.auth.default_manager_email,
                    &password_hash,
                    UserRole::Manager,
                    true,
                )
                .await
            {
                Ok(_) => {
                    tracing::info!(
                        email = %config.auth.default_manager_email,
                        "Created default manager account"
                    );
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to create default manager account");
                }
            }
        }
        Ok(count) => {
            tracing::info!(
                count,
                "Users table already has accounts, skipping default manager creation"
            );
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to check users table");
        }
    }

    let transport = Arc::new(build_transport(&config)?);
    let dispatcher = Arc::new(Dispatcher::new(
        store.clone(),
        transport.clone(),
        config.smtp.from_address.clone(),
    ));

    // JWT secret: use configured value or generate random
    let jwt_secret = match &config.auth.jwt_secret {
        Some(secret) => Arc::new(secret.clone()),
        None => {
            let secret = mailcast_storage::auth::generate_token();
            tracing::warn!("No jwt_secret configured. A random secret was generated and will change on restart. Set [auth].jwt_secret in config for production use.");
            Arc::new(secret)
        }
    };

    let state = AppState {
        store,
        dispatcher,
        transport,
        start_time: Utc::now(),
        jwt_secret,
        token_expire_secs: config.auth.token_expire_secs,
        config: Arc::new(config.clone()),
    };

    let http_addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    let app = app::build_http_app(state);
    let http_listener = tokio::net::TcpListener::bind(http_addr).await?;

    tracing::info!(http = %http_addr, "Server started");

    axum::serve(http_listener, app)
        .with_graceful_shutdown(async {
            signal::ctrl_c().await.ok();
            tracing::info!("Shutting down gracefully");
        })
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}
