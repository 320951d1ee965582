//! Message signing and verification
//!
//! A signature covers the SHA-256 digest of the UTF-8 bytes of the message
//! text, signed with RSASSA-PKCS1-v1_5. On the wire the raw signature bytes
//! are base64 (standard alphabet, padded).
//!
//! PKCS#1 v1.5 happens to be deterministic, so signing the same text twice
//! with the same key gives identical bytes today. Nothing should rely on
//! that: a switch to a randomized padding such as PSS would keep every
//! verification property while changing the bytes on each call.

use std::fmt;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rsa::Pkcs1v15Sign;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use super::error::{CryptoError, CryptoResult};
use super::keys::{KeyPair, PublicKeyPem};

/// Size of the message digest in bytes
pub const DIGEST_SIZE: usize = 32;

/// A base64-encoded signature, as carried on the wire
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature(String);

impl Signature {
    /// Wrap a base64 string without decoding it
    pub fn from_base64(encoded: impl Into<String>) -> Self {
        Signature(encoded.into())
    }

    /// Encode raw signature bytes
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Signature(BASE64.encode(bytes))
    }

    /// The base64 text
    pub fn as_base64(&self) -> &str {
        &self.0
    }

    /// Decode to raw bytes
    pub fn to_bytes(&self) -> CryptoResult<Vec<u8>> {
        BASE64
            .decode(&self.0)
            .map_err(|e| CryptoError::SignatureFormat(e.to_string()))
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown: String = self.0.chars().take(16).collect();
        write!(f, "Signature({}...)", shown)
    }
}

/// Stateless signing and verification over message text
pub struct SignatureCodec;

impl SignatureCodec {
    /// SHA-256 over the UTF-8 encoding of `text`
    pub fn digest(text: &str) -> [u8; DIGEST_SIZE] {
        Sha256::digest(text.as_bytes()).into()
    }

    /// Sign `text` with the pair's private key
    pub fn sign(text: &str, keys: &KeyPair) -> CryptoResult<Signature> {
        let digest = Self::digest(text);
        let raw = keys
            .private_key()
            .sign(Pkcs1v15Sign::new::<Sha256>(), &digest)
            .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;

        Ok(Signature::from_bytes(&raw))
    }

    /// Check that `signature` over `text` was made by `public_key`
    ///
    /// Fails closed: a malformed key, malformed base64 or a digest mismatch
    /// all return `false`. Use [`SignatureCodec::verify_detailed`] to learn
    /// which one it was.
    pub fn verify(text: &str, signature: &Signature, public_key: &PublicKeyPem) -> bool {
        match Self::verify_detailed(text, signature, public_key) {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, key = %public_key.fingerprint(), "signature rejected");
                false
            }
        }
    }

    /// Like [`SignatureCodec::verify`], but reports why a check failed
    pub fn verify_detailed(
        text: &str,
        signature: &Signature,
        public_key: &PublicKeyPem,
    ) -> CryptoResult<()> {
        let key = public_key.decode()?;
        let raw = signature.to_bytes()?;
        let digest = Self::digest(text);

        key.verify(Pkcs1v15Sign::new::<Sha256>(), &digest, &raw)
            .map_err(|_| CryptoError::SignatureVerificationFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::LazyLock;

    static ALICE: LazyLock<KeyPair> = LazyLock::new(|| KeyPair::generate(1024).unwrap());
    static BOB: LazyLock<KeyPair> = LazyLock::new(|| KeyPair::generate(1024).unwrap());

    #[test]
    fn test_sign_verify() {
        let sig = SignatureCodec::sign("hello", &ALICE).unwrap();
        assert!(SignatureCodec::verify("hello", &sig, ALICE.public_key()));
    }

    #[test]
    fn test_wrong_text_fails() {
        let sig = SignatureCodec::sign("hello", &ALICE).unwrap();
        assert!(!SignatureCodec::verify("hello!", &sig, ALICE.public_key()));
    }

    #[test]
    fn test_wrong_key_fails() {
        let sig = SignatureCodec::sign("hello", &ALICE).unwrap();
        assert!(!SignatureCodec::verify("hello", &sig, BOB.public_key()));
    }

    #[test]
    fn test_empty_and_unicode_text() {
        for text in ["", "olá, mundo", "🔐 assinatura"] {
            let sig = SignatureCodec::sign(text, &ALICE).unwrap();
            assert!(SignatureCodec::verify(text, &sig, ALICE.public_key()));
        }
    }

    #[test]
    fn test_malformed_base64_is_format_error() {
        let sig = Signature::from_base64("***not base64***");
        let err = SignatureCodec::verify_detailed("hello", &sig, ALICE.public_key()).unwrap_err();

        assert!(matches!(err, CryptoError::SignatureFormat(_)));
        assert!(!SignatureCodec::verify("hello", &sig, ALICE.public_key()));
    }

    #[test]
    fn test_padded_base64_rejected() {
        let sig = SignatureCodec::sign("hello", &ALICE).unwrap();
        for padded in [
            format!(" {}", sig.as_base64()),
            format!("{}\n", sig.as_base64()),
        ] {
            let sig = Signature::from_base64(padded);
            assert!(matches!(
                SignatureCodec::verify_detailed("hello", &sig, ALICE.public_key()),
                Err(CryptoError::SignatureFormat(_))
            ));
        }
    }

    #[test]
    fn test_malformed_key_is_key_error() {
        let sig = SignatureCodec::sign("hello", &ALICE).unwrap();
        let key = PublicKeyPem::from_pem("-----BEGIN PUBLIC KEY-----\nAAAA\n-----END PUBLIC KEY-----\n");
        let err = SignatureCodec::verify_detailed("hello", &sig, &key).unwrap_err();

        assert!(matches!(err, CryptoError::InvalidPublicKey(_)));
    }

    #[test]
    fn test_truncated_signature_fails() {
        let sig = SignatureCodec::sign("hello", &ALICE).unwrap();
        let mut raw = sig.to_bytes().unwrap();
        raw.truncate(raw.len() / 2);

        let short = Signature::from_bytes(&raw);
        assert!(!SignatureCodec::verify("hello", &short, ALICE.public_key()));
    }

    #[test]
    fn test_digest_is_sha256_of_utf8() {
        // SHA-256("abc")
        let expected = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";
        assert_eq!(hex::encode(SignatureCodec::digest("abc")), expected);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_sign_then_verify(text in ".{0,64}") {
            let sig = SignatureCodec::sign(&text, &ALICE).unwrap();
            prop_assert!(SignatureCodec::verify(&text, &sig, ALICE.public_key()));
        }

        #[test]
        fn prop_other_text_rejected(text in ".{0,64}", other in ".{0,64}") {
            prop_assume!(text != other);
            let sig = SignatureCodec::sign(&text, &ALICE).unwrap();
            prop_assert!(!SignatureCodec::verify(&other, &sig, ALICE.public_key()));
        }

        #[test]
        fn prop_tampered_base64_never_valid(pos in any::<prop::sample::Index>(), replacement in prop::char::range('!', '~')) {
            let sig = SignatureCodec::sign("tamper target", &ALICE).unwrap();
            let mut chars: Vec<char> = sig.as_base64().chars().collect();
            let i = pos.index(chars.len());
            prop_assume!(chars[i] != replacement);
            chars[i] = replacement;

            let tampered = Signature::from_base64(chars.into_iter().collect::<String>());
            prop_assert!(!SignatureCodec::verify("tamper target", &tampered, ALICE.public_key()));
        }
    }
}
