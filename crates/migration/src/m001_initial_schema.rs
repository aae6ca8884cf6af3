use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m001_initial_schema"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Tables are created in dependency order.
        manager.get_connection().execute_unprepared(UP_SQL).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(DOWN_SQL)
            .await?;
        Ok(())
    }
}

const UP_SQL: &str = "
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY NOT NULL,
    email TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    display_name TEXT,
    phone TEXT,
    avatar TEXT,
    country TEXT,
    role TEXT NOT NULL DEFAULT 'member',
    is_active INTEGER NOT NULL DEFAULT 0,
    is_blocked INTEGER NOT NULL DEFAULT 0,
    token_version INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_users_email ON users(email);

CREATE TABLE IF NOT EXISTS recipients (
    id TEXT PRIMARY KEY NOT NULL,
    email TEXT NOT NULL UNIQUE,
    full_name TEXT NOT NULL,
    comment TEXT NOT NULL DEFAULT '',
    owner_id TEXT REFERENCES users(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_recipients_email ON recipients(email);
CREATE INDEX IF NOT EXISTS idx_recipients_owner ON recipients(owner_id);

CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY NOT NULL,
    subject TEXT NOT NULL,
    body TEXT NOT NULL,
    owner_id TEXT REFERENCES users(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_messages_subject ON messages(subject);
CREATE INDEX IF NOT EXISTS idx_messages_owner ON messages(owner_id);

CREATE TABLE IF NOT EXISTS mailings (
    id TEXT PRIMARY KEY NOT NULL,
    first_sent_at TEXT,
    end_at TEXT,
    status TEXT NOT NULL DEFAULT 'created',
    message_id TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
    owner_id TEXT REFERENCES users(id) ON DELETE CASCADE,
    total_sent INTEGER NOT NULL DEFAULT 0,
    successful_sends INTEGER NOT NULL DEFAULT 0,
    failed_sends INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_mailings_status ON mailings(status);
CREATE INDEX IF NOT EXISTS idx_mailings_owner ON mailings(owner_id);

CREATE TABLE IF NOT EXISTS mailing_recipients (
    mailing_id TEXT NOT NULL REFERENCES mailings(id) ON DELETE CASCADE,
    recipient_id TEXT NOT NULL REFERENCES recipients(id) ON DELETE CASCADE,
    PRIMARY KEY (mailing_id, recipient_id)
);
CREATE INDEX IF NOT EXISTS idx_mailing_recipients_recipient ON mailing_recipients(recipient_id);

CREATE TABLE IF NOT EXISTS send_attempts (
    id TEXT PRIMARY KEY NOT NULL,
    attempted_at TEXT NOT NULL,
    status TEXT NOT NULL,
    server_response TEXT NOT NULL DEFAULT '',
    mailing_id TEXT NOT NULL REFERENCES mailings(id) ON DELETE CASCADE,
    recipient_id TEXT REFERENCES recipients(id) ON DELETE CASCADE,
    message_id TEXT REFERENCES messages(id) ON DELETE CASCADE,
    owner_id TEXT REFERENCES users(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_send_attempts_mailing ON send_attempts(mailing_id);
CREATE INDEX IF NOT EXISTS idx_send_attempts_owner ON send_attempts(owner_id);
CREATE INDEX IF NOT EXISTS idx_send_attempts_attempted_at ON send_attempts(attempted_at);
";

const DOWN_SQL: &str = "
DROP TABLE IF EXISTS send_attempts;
DROP TABLE IF EXISTS mailing_recipients;
DROP TABLE IF EXISTS mailings;
DROP TABLE IF EXISTS messages;
DROP TABLE IF EXISTS recipients;
DROP TABLE IF EXISTS users;
";
