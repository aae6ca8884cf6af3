//! Persistence layer for mailcast.
//!
//! All entities live in one relational database accessed through
//! [`store::MailStore`] (SeaORM; SQLite by default, any `sea-orm`
//! connection URL works). Credential hashing and the signed
//! activation/reset tokens live in [`auth`].

pub mod auth;
pub mod entities;
pub mod store;


pub use store::MailStore;
pub use store::{
    MailingRow, MailingUpdate, MessageRow, MessageUpdate, ProfileUpdate, RecipientRow,
    RecipientUpdate, SendAttemptFilter, SendAttemptRow, UserRow,
};
