//! Crate-level error type returned by the [`Storage`](crate::storage::Storage) facade.

use common::StoreError;
use thiserror::Error;

use crate::codec::CodecError;
use crate::crypto::EnvelopeError;
use crate::custom::CustomCipherError;
use crate::secrets::SecretError;

/// Coarse classification used by callers to decide how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Client setup is wrong; retrying will not help.
    Configuration,
    /// A value could not be encrypted or decrypted.
    Cryptographic,
    /// Caller input was rejected before any work was done.
    Validation,
    /// The record store failed.
    Storage,
    Internal,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Secret(#[from] SecretError),

    #[error(transparent)]
    Custom(#[from] CustomCipherError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<EnvelopeError> for Error {
    fn from(e: EnvelopeError) -> Self {
        Error::Codec(CodecError::Envelope(e))
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config(_) => ErrorKind::Configuration,
            Error::Validation(_) => ErrorKind::Validation,
            Error::Secret(e) => secret_kind(e),
            Error::Custom(CustomCipherError::SelfTestFailed(_)) => ErrorKind::Validation,
            Error::Custom(_) => ErrorKind::Configuration,
            Error::Codec(CodecError::Envelope(e)) => envelope_kind(e),
            Error::Codec(CodecError::Serialize(_) | CodecError::Worker(_)) => ErrorKind::Internal,
            Error::Store(_) => ErrorKind::Storage,
        }
    }

    /// `true` only for transport failures the store marks as retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Store(e) if e.is_retryable())
    }
}

fn secret_kind(e: &SecretError) -> ErrorKind {
    if e.is_configuration() {
        ErrorKind::Configuration
    } else {
        ErrorKind::Cryptographic
    }
}

fn envelope_kind(e: &EnvelopeError) -> ErrorKind {
    match e {
        EnvelopeError::NoSecretResolver
        | EnvelopeError::SecretNotForCustomEncryption(_)
        | EnvelopeError::CustomEncryptionReturnType { .. }
        | EnvelopeError::CustomDecryptionReturnType { .. } => ErrorKind::Configuration,
        EnvelopeError::Secret(s) => secret_kind(s),
        EnvelopeError::InvalidCiphertext(_)
        | EnvelopeError::UnknownDecryptorVersion(_)
        | EnvelopeError::DecryptionAuth
        | EnvelopeError::Cipher(_) => ErrorKind::Cryptographic,
    }
}
