//! RSA key pair management
//!
//! Each local identity owns one [`KeyPair`]. The private half never leaves
//! the process and is dropped with the session; the public half travels as
//! a PEM (`-----BEGIN PUBLIC KEY-----`, SubjectPublicKeyInfo) string.
//!
//! Key generation is CPU bound, so [`KeyManager::generate_key_pair`] runs it
//! on tokio's blocking pool and resolves once the pair is ready.

use std::fmt;
use std::sync::Arc;

use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::error::{CryptoError, CryptoResult};

/// Default modulus size in bits
pub const DEFAULT_KEY_BITS: usize = 2048;

/// Smallest modulus size we are willing to generate
pub const MIN_KEY_BITS: usize = 1024;

/// A PEM-encoded RSA public key, as carried on the wire
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PublicKeyPem(String);

impl PublicKeyPem {
    /// Wrap an already-serialized PEM string without parsing it
    ///
    /// Received keys stay unparsed until verification so that a malformed
    /// key surfaces as an `invalid` verdict rather than a receive error.
    pub fn from_pem(pem: impl Into<String>) -> Self {
        PublicKeyPem(pem.into())
    }

    /// Encode a parsed public key
    pub fn encode(key: &RsaPublicKey) -> CryptoResult<Self> {
        key.to_public_key_pem(LineEnding::LF)
            .map(PublicKeyPem)
            .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
    }

    /// Parse the PEM back into a usable key
    pub fn decode(&self) -> CryptoResult<RsaPublicKey> {
        RsaPublicKey::from_public_key_pem(&self.0)
            .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
    }

    /// The PEM text
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short SHA-256 fingerprint of the PEM text, for logs and display
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0.as_bytes());
        hex::encode(&digest[..8])
    }
}

impl fmt::Debug for PublicKeyPem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKeyPem({})", self.fingerprint())
    }
}

impl fmt::Display for PublicKeyPem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An RSA key pair owned by one local identity
///
/// The private key is zeroized by `rsa` on drop. There is no
/// way to serialize it.
pub struct KeyPair {
    public_key: PublicKeyPem,
    private_key: RsaPrivateKey,
}

impl KeyPair {
    /// Generate a fresh key pair on the current thread
    ///
    /// Prefer [`KeyManager::generate_key_pair`] from async code.
    pub fn generate(bits: usize) -> CryptoResult<Self> {
        if bits < MIN_KEY_BITS {
            return Err(CryptoError::KeySizeTooSmall {
                minimum: MIN_KEY_BITS,
                requested: bits,
            });
        }

        let private_key = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
        let public_key = PublicKeyPem::encode(&private_key.to_public_key())?;

        Ok(KeyPair {
            public_key,
            private_key,
        })
    }

    /// The serialized public half
    pub fn public_key(&self) -> &PublicKeyPem {
        &self.public_key
    }

    /// The signing handle
    pub(crate) fn private_key(&self) -> &RsaPrivateKey {
        &self.private_key
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

/// Generates key pairs off the caller's task
#[derive(Clone, Copy, Debug)]
pub struct KeyManager {
    bits: usize,
}

impl KeyManager {
    /// Create a manager producing keys of `bits` modulus size
    pub fn new(bits: usize) -> Self {
        KeyManager { bits }
    }

    /// Configured modulus size
    pub fn bits(&self) -> usize {
        self.bits
    }

    /// Generate a key pair on the blocking pool
    ///
    /// The caller's task stays free to make progress on other work while
    /// the primes are searched for. Every call produces independent key
    /// material.
    pub async fn generate_key_pair(&self) -> CryptoResult<Arc<KeyPair>> {
        let bits = self.bits;
        debug!(bits, "dispatching key generation");

        let keys = tokio::task::spawn_blocking(move || KeyPair::generate(bits))
            .await
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))??;

        info!(
            bits,
            fingerprint = %keys.public_key().fingerprint(),
            "key pair generated"
        );
        Ok(Arc::new(keys))
    }
}

impl Default for KeyManager {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_BITS)
    }
}
