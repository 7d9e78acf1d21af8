//! Error types for the security layer.

use thiserror::Error;

/// Errors from token verification and tenant encryption.
#[derive(Debug, Error)]
pub enum SecurityError {
    /// The token is not three dot-separated segments of decodable base64.
    #[error("Invalid token format")]
    InvalidFormat,

    /// The token signature does not match the shared secret.
    #[error("Invalid token signature")]
    InvalidSignature,

    /// The token's expiry lies in the past.
    #[error("Token expired")]
    TokenExpired,

    /// Encryption could not be performed.
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Decryption failed: tampered ciphertext or wrong tenant keys.
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),
}

/// Alias for Result with SecurityError.
pub type SecurityResult<T> = Result<T, SecurityError>;
