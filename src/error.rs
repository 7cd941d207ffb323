use std::fmt::Display;

use thiserror::Error;

use crate::crypto::KeystoreError;
use crate::soap::PayloadError;

pub type Result<T> = std::result::Result<T, Error>;

/// Why an invocation produced no signed document. Every variant is terminal.
///
/// Messages carry the failing stage and the underlying cause, never credential material.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or missing input XML
    #[error("payload parse error: {0}")]
    PayloadParse(String),

    /// Key store decode, password or alias failures
    #[error("credential error: {0}")]
    Credential(String),

    /// Cryptographic or document failures while signing
    #[error("signature error: {0}")]
    Signature(String),

    /// Unexpected structural failures while composing SOAP/WSS elements
    #[error("envelope construction error: {0}")]
    EnvelopeConstruction(String),
}

impl Error {
    pub(crate) fn signature(cause: impl Display) -> Self {
        Error::Signature(cause.to_string())
    }

    pub(crate) fn envelope(cause: impl Display) -> Self {
        Error::EnvelopeConstruction(cause.to_string())
    }
}

impl From<PayloadError> for Error {
    fn from(err: PayloadError) -> Self {
        Error::PayloadParse(err.to_string())
    }
}

impl From<KeystoreError> for Error {
    fn from(err: KeystoreError) -> Self {
        Error::Credential(err.to_string())
    }
}
