//! Outbound mail delivery seam.
//!
//! The dispatch workflow talks to [`MailTransport`] only; the production
//! implementation is [`smtp::SmtpMailTransport`] over lettre's async SMTP
//! client. One call means one delivery attempt — retries, rate limiting,
//! and bounce tracking are out of scope.

pub mod error;
pub mod smtp;

pub use error::TransportError;
pub use smtp::SmtpMailTransport;

use async_trait::async_trait;

/// A transport that delivers one plain-text email to a set of addresses.
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Delivers the message, or fails with a [`TransportError`].
    ///
    /// # Errors
    ///
    /// Returns an error when any address fails to parse or the transport
    /// rejects the message. Callers decide how a failure affects the
    /// surrounding batch.
    async fn send(
        &self,
        subject: &str,
        body: &str,
        from: &str,
        to: &[String],
    ) -> Result<(), TransportError>;
}
