//! Cryptographic error types

use thiserror::Error;

/// Errors that can occur in key handling and signature operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Key pair generation failed (entropy source or parameter problem)
    ///
    /// Fatal to that generation attempt; the caller has to retry.
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    /// The requested key size is below what we accept
    #[error("Key size too small: minimum {minimum} bits, requested {requested}")]
    KeySizeTooSmall {
        /// Smallest accepted modulus size in bits
        minimum: usize,
        /// Requested modulus size in bits
        requested: usize,
    },

    /// The serialized public key could not be parsed
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    /// The signature is not valid base64 or has the wrong shape
    #[error("Malformed signature: {0}")]
    SignatureFormat(String),

    /// Signing the digest failed
    #[error("Signing failed: {0}")]
    SigningFailed(String),

    /// Signature verification failed - the signature does not match
    #[error("Signature verification failed")]
    SignatureVerificationFailed,
}

/// Result type for cryptographic operations
pub type CryptoResult<T> = Result<T, CryptoError>;
