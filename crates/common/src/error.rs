use crate::crypto::{KeyError, SecretError};
use crate::store::BackendError;

/// Crate-wide error taxonomy.
///
/// Lower layers keep their own error enums ([`KeyError`], [`BackendError`], ...)
/// and are folded in here so that a failure keeps its category as it
/// propagates: a bad box tag stays [`Error::DecryptionFail`], a missing
/// viewer key stays [`Error::Authentication`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Programmer or invariant misuse
    #[error("coding error: {0}")]
    Coding(String),
    /// Refused to store secret material in the clear
    #[error("security warning: {0}")]
    SecurityWarning(String),
    /// The caller lacks the role an operation requires
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// No held key decrypts the data, or the required identity is not logged in
    #[error("authentication error: {0}")]
    Authentication(String),
    #[error("encryption error: {0}")]
    Encryption(String),
    #[error("decryption failed: {0}")]
    DecryptionFail(String),
    #[error("signing error: {0}")]
    Signing(String),
    /// A name path cannot be continued
    #[error("resolution error: {0}")]
    Resolution(String),
    #[error("not implemented: {0}")]
    ToBeImplemented(String),
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("error: {0}")]
    Default(#[from] anyhow::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl From<KeyError> for Error {
    fn from(err: KeyError) -> Self {
        match err {
            KeyError::Coding(msg) => Error::Coding(msg),
            KeyError::Encryption(msg) => Error::Encryption(msg),
            KeyError::DecryptionFail(msg) => Error::DecryptionFail(msg),
            KeyError::Signing(msg) => Error::Signing(msg),
            KeyError::ToBeImplemented(msg) => Error::ToBeImplemented(msg),
            KeyError::Default(err) => Error::Default(err),
        }
    }
}

impl From<SecretError> for Error {
    fn from(err: SecretError) -> Self {
        match err {
            SecretError::DecryptionFail => {
                Error::DecryptionFail("access key does not open ciphertext".to_string())
            }
            SecretError::Default(err) => Error::Default(err),
        }
    }
}

impl Error {
    /// Re-raise any failure inside a name lookup as a resolution failure
    pub(crate) fn resolution(self) -> Self {
        match self {
            Error::Resolution(msg) => Error::Resolution(msg),
            other => Error::Resolution(other.to_string()),
        }
    }
}
