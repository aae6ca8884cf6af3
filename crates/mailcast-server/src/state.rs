use chrono::{DateTime, Utc};
use mailcast_dispatch::Dispatcher;
use mailcast_storage::MailStore;
use mailcast_transport::MailTransport;
use std::sync::Arc;

use crate::config::ServerConfig;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<MailStore>,
    pub dispatcher: Arc<Dispatcher>,
    /// Shared with the dispatcher; also used directly for account mail
    /// (activation links, password resets).
    pub transport: Arc<dyn MailTransport>,
    pub start_time: DateTime<Utc>,
    pub jwt_secret: Arc<String>,
    pub token_expire_secs: u64,
    pub config: Arc<ServerConfig>,
}
