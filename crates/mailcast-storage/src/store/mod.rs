use anyhow::Result;
use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection};
use std::path::Path;

use crate::auth::TokenSigner;

pub mod attempt;
pub mod mailing;
pub mod message;
pub mod recipient;
pub mod user;

pub use attempt::{SendAttemptFilter, SendAttemptRow};
pub use mailing::{MailingRow, MailingUpdate};
pub use message::{MessageRow, MessageUpdate};
pub use recipient::{RecipientRow, RecipientUpdate};
pub use user::{ProfileUpdate, UserRow};

/// Unified access layer for the mailcast database.
///
/// All methods are `async fn` over SeaORM. The connection URL decides the
/// backend; the SQLite default is `sqlite://data/mailcast.db?mode=rwc`.
pub struct MailStore {
    pub(crate) db: DatabaseConnection,
    pub(crate) token_signer: TokenSigner,
}

impl MailStore {
    /// Connect and initialize the database.
    ///
    /// - `db_url`: full connection URL, supplied by server configuration.
    /// - `data_dir`: local data directory holding the token signing key,
    ///   independent of the database backend.
    ///
    /// Runs all pending `sea-orm-migration` migrations so the schema is
    /// current.
    pub async fn new(db_url: &str, data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let db = Database::connect(db_url).await?;

        // WAL mode only applies to SQLite
        if db_url.starts_with("sqlite:") {
            db.execute_unprepared("PRAGMA journal_mode=WAL;").await?;
        }

        Migrator::up(&db, None).await?;

        let token_signer = TokenSigner::load_or_create(data_dir)?;
        tracing::info!(db_url = %db_url, "Initialized mail store");

        Ok(Self { db, token_signer })
    }

    /// Underlying connection reference, for the store submodules.
    pub(crate) fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    pub fn token_signer(&self) -> &TokenSigner {
        &self.token_signer
    }
}
