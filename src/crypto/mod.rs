//! Cryptographic primitives for the signed-message exchange
//!
//! - `keys`: RSA key pairs and their PEM public half
//! - `signature`: SHA-256 + PKCS#1 v1.5 signing and fail-closed verification
//! - `error`: the error taxonomy shared by both

pub mod error;
pub mod keys;
pub mod signature;

pub use error::{CryptoError, CryptoResult};
pub use keys::{KeyManager, KeyPair, PublicKeyPem, DEFAULT_KEY_BITS, MIN_KEY_BITS};
pub use signature::{Signature, SignatureCodec};

/// Generate cryptographically secure random bytes
pub fn random_bytes<const N: usize>() -> [u8; N] {
    use rand::RngCore;
    let mut bytes = [0u8; N];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

#[cfg(test)]
mod integration_tests {
    use super::*;

    #[test]
    fn test_signature_survives_json_transport() {
        let keys = KeyPair::generate(1024).unwrap();
        let signature = SignatureCodec::sign("over the wire", &keys).unwrap();

        // Both halves travel as plain JSON strings
        let sig_json = serde_json::to_string(&signature).unwrap();
        let key_json = serde_json::to_string(keys.public_key()).unwrap();
        assert!(sig_json.starts_with('"'));
        assert!(key_json.contains("BEGIN PUBLIC KEY"));

        let signature: Signature = serde_json::from_str(&sig_json).unwrap();
        let public_key: PublicKeyPem = serde_json::from_str(&key_json).unwrap();
        assert!(SignatureCodec::verify("over the wire", &signature, &public_key));
    }

    #[test]
    fn test_random_bytes_differ() {
        let a = random_bytes::<32>();
        let b = random_bytes::<32>();
        assert_ne!(a, b);
    }
}
