/// Errors that can occur while handing a message to the mail transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// A from/to address failed to parse.
    #[error("invalid email address: {0}")]
    Address(#[from] lettre::address::AddressError),

    /// The message itself could not be built.
    #[error("failed to build message: {0}")]
    Message(#[from] lettre::error::Error),

    /// The SMTP server rejected the message or the connection failed.
    #[error("SMTP error: {0}")]
    Smtp(String),
}
