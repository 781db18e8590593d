use lettre::address::AddressError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid SMTP_ENCRYPT value: {0}")]
    InvalidEncryption(String),

    #[error("failed to decode attachment content: {0}")]
    AttachmentDecode(#[from] base64::DecodeError),

    #[error("invalid address {address:?}: {source}")]
    Address {
        address: String,
        #[source]
        source: AddressError,
    },

    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    #[error("invalid header {0:?}")]
    Header(String),

    #[error("failed to build message: {0}")]
    Build(#[from] lettre::error::Error),

    #[error("failed to create SMTP transport: {0}")]
    Transport(String),

    #[error("failed to send email: {0}")]
    Send(String),
}
