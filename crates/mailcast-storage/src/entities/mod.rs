pub mod mailing;
pub mod mailing_recipient;
pub mod message;
pub mod recipient;
pub mod send_attempt;
pub mod user;
