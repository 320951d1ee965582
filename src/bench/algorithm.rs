//! Benchmarked algorithms
//!
//! Anything implementing [`BenchAlgorithm`] can be timed. [`Algorithm`] is
//! the static registry of built-in primitives; each entry builds its keyed
//! state once in [`Algorithm::instantiate`] so that key setup stays out of
//! the timed loop.

use std::fmt;
use std::str::FromStr;

use aes::Aes128;
use aes_gcm::Aes256Gcm;
use blowfish::Blowfish;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::generic_array::GenericArray;
use cbc::cipher::{BlockEncrypt, BlockEncryptMut, KeyIvInit};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::ChaCha20Poly1305;
use ed25519_dalek::{Signer, SigningKey};
use rand::rngs::OsRng;
use rsa::Pkcs1v15Sign;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use twofish::Twofish;

use crate::crypto::{random_bytes, KeyPair, DEFAULT_KEY_BITS};

/// A benchmarked operation failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{algorithm} failed: {reason}")]
pub struct AlgorithmError {
    /// Algorithm name
    pub algorithm: String,
    /// What went wrong
    pub reason: String,
}

impl AlgorithmError {
    /// Create an error for `algorithm`
    pub fn new(algorithm: impl Into<String>, reason: impl Into<String>) -> Self {
        AlgorithmError {
            algorithm: algorithm.into(),
            reason: reason.into(),
        }
    }
}

/// A name that is not in the registry
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown algorithm: {0}")]
pub struct UnknownAlgorithm(pub String);

/// One timed operation
pub trait BenchAlgorithm: Send + Sync {
    /// Display name, unique within a battery
    fn name(&self) -> &str;

    /// Process `input` once
    fn run(&self, input: &[u8]) -> Result<Vec<u8>, AlgorithmError>;
}

/// Built-in algorithms
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Algorithm {
    /// AES-128 in CBC mode with PKCS#7 padding
    Aes128Cbc,
    /// Blowfish block by block, zero padded, 128-bit key
    Blowfish,
    /// Twofish block by block, zero padded, 128-bit key
    Twofish,
    /// AES-256 in GCM mode
    Aes256Gcm,
    /// ChaCha20-Poly1305 AEAD
    ChaCha20Poly1305,
    /// SHA-256 digest
    Sha256,
    /// BLAKE3 digest
    Blake3,
    /// Ed25519 signature
    Ed25519,
    /// SHA-256 + RSA PKCS#1 v1.5 signature, 2048-bit key
    RsaPkcs1v15,
}

impl Algorithm {
    /// Every registered algorithm
    pub const ALL: [Algorithm; 9] = [
        Algorithm::Aes128Cbc,
        Algorithm::Blowfish,
        Algorithm::Twofish,
        Algorithm::Aes256Gcm,
        Algorithm::ChaCha20Poly1305,
        Algorithm::Sha256,
        Algorithm::Blake3,
        Algorithm::Ed25519,
        Algorithm::RsaPkcs1v15,
    ];

    /// The default battery; RSA is opt-in because it is far too slow for
    /// the largest tier
    pub const DEFAULT: [Algorithm; 8] = [
        Algorithm::Aes128Cbc,
        Algorithm::Blowfish,
        Algorithm::Twofish,
        Algorithm::Aes256Gcm,
        Algorithm::ChaCha20Poly1305,
        Algorithm::Sha256,
        Algorithm::Blake3,
        Algorithm::Ed25519,
    ];

    /// Display name
    pub fn name(self) -> &'static str {
        match self {
            Algorithm::Aes128Cbc => "AES-128-CBC",
            Algorithm::Blowfish => "Blowfish",
            Algorithm::Twofish => "Twofish",
            Algorithm::Aes256Gcm => "AES-256-GCM",
            Algorithm::ChaCha20Poly1305 => "ChaCha20-Poly1305",
            Algorithm::Sha256 => "SHA-256",
            Algorithm::Blake3 => "BLAKE3",
            Algorithm::Ed25519 => "Ed25519",
            Algorithm::RsaPkcs1v15 => "RSA-PKCS1v15",
        }
    }

    /// Build the keyed state for this algorithm
    pub fn instantiate(self) -> Result<Box<dyn BenchAlgorithm>, AlgorithmError> {
        let name = self.name();
        let invalid_key = |e: cbc::cipher::InvalidLength| AlgorithmError::new(name, e.to_string());
        Ok(match self {
            Algorithm::Aes128Cbc => {
                let encryptor =
                    cbc::Encryptor::<Aes128>::new_from_slices(&random_bytes::<16>(), &random_bytes::<16>())
                        .map_err(invalid_key)?;
                Box::new(CbcBench { encryptor })
            }
            Algorithm::Blowfish => {
                let cipher: Blowfish =
                    Blowfish::new_from_slice(&random_bytes::<16>()).map_err(invalid_key)?;
                Box::new(EcbBench { name, cipher })
            }
            Algorithm::Twofish => {
                let cipher = Twofish::new_from_slice(&random_bytes::<16>()).map_err(invalid_key)?;
                Box::new(EcbBench { name, cipher })
            }
            Algorithm::Aes256Gcm => {
                let cipher = Aes256Gcm::new_from_slice(&random_bytes::<32>())
                    .map_err(|e| AlgorithmError::new(name, e.to_string()))?;
                Box::new(AeadBench {
                    name,
                    cipher,
                    nonce: random_bytes(),
                })
            }
            Algorithm::ChaCha20Poly1305 => {
                let cipher = ChaCha20Poly1305::new_from_slice(&random_bytes::<32>())
                    .map_err(|e| AlgorithmError::new(name, e.to_string()))?;
                Box::new(AeadBench {
                    name,
                    cipher,
                    nonce: random_bytes(),
                })
            }
            Algorithm::Sha256 => Box::new(Sha256Bench),
            Algorithm::Blake3 => Box::new(Blake3Bench),
            Algorithm::Ed25519 => Box::new(Ed25519Bench {
                key: SigningKey::generate(&mut OsRng),
            }),
            Algorithm::RsaPkcs1v15 => {
                let keys = KeyPair::generate(DEFAULT_KEY_BITS)
                    .map_err(|e| AlgorithmError::new(name, e.to_string()))?;
                Box::new(RsaBench { keys })
            }
        })
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Algorithm {
    type Err = UnknownAlgorithm;

    /// Accepts the display name or its lowercase, punctuation-free form
    /// (`aes256gcm`, `chacha20poly1305`, `rsapkcs1v15`, ...)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = normalize(s);
        Algorithm::ALL
            .into_iter()
            .find(|a| normalize(a.name()) == wanted)
            .ok_or_else(|| UnknownAlgorithm(s.to_string()))
    }
}

fn normalize(s: &str) -> String {
    s.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

// The encryptor is cloned per run so every run starts from the same IV
struct CbcBench {
    encryptor: cbc::Encryptor<Aes128>,
}

impl BenchAlgorithm for CbcBench {
    fn name(&self) -> &str {
        Algorithm::Aes128Cbc.name()
    }

    fn run(&self, input: &[u8]) -> Result<Vec<u8>, AlgorithmError> {
        Ok(self.encryptor.clone().encrypt_padded_vec_mut::<Pkcs7>(input))
    }
}

/// Raw block cipher applied to each block independently
struct EcbBench<C> {
    name: &'static str,
    cipher: C,
}

impl<C> BenchAlgorithm for EcbBench<C>
where
    C: BlockEncrypt + Send + Sync,
{
    fn name(&self) -> &str {
        self.name
    }

    fn run(&self, input: &[u8]) -> Result<Vec<u8>, AlgorithmError> {
        let block = C::block_size();
        let mut out = input.to_vec();
        out.resize(input.len().div_ceil(block).max(1) * block, 0);
        for chunk in out.chunks_exact_mut(block) {
            self.cipher.encrypt_block(GenericArray::from_mut_slice(chunk));
        }
        Ok(out)
    }
}

// A fixed nonce is fine here: the ciphertexts are thrown away
struct AeadBench<C> {
    name: &'static str,
    cipher: C,
    nonce: [u8; 12],
}

impl<C> BenchAlgorithm for AeadBench<C>
where
    C: Aead + Send + Sync,
{
    fn name(&self) -> &str {
        self.name
    }

    fn run(&self, input: &[u8]) -> Result<Vec<u8>, AlgorithmError> {
        self.cipher
            .encrypt(self.nonce.as_slice().into(), input)
            .map_err(|e| AlgorithmError::new(self.name, e.to_string()))
    }
}

struct Sha256Bench;

impl BenchAlgorithm for Sha256Bench {
    fn name(&self) -> &str {
        Algorithm::Sha256.name()
    }

    fn run(&self, input: &[u8]) -> Result<Vec<u8>, AlgorithmError> {
        Ok(Sha256::digest(input).to_vec())
    }
}

struct Blake3Bench;

impl BenchAlgorithm for Blake3Bench {
    fn name(&self) -> &str {
        Algorithm::Blake3.name()
    }

    fn run(&self, input: &[u8]) -> Result<Vec<u8>, AlgorithmError> {
        Ok(blake3::hash(input).as_bytes().to_vec())
    }
}

struct Ed25519Bench {
    key: SigningKey,
}

impl BenchAlgorithm for Ed25519Bench {
    fn name(&self) -> &str {
        Algorithm::Ed25519.name()
    }

    fn run(&self, input: &[u8]) -> Result<Vec<u8>, AlgorithmError> {
        Ok(self.key.sign(input).to_bytes().to_vec())
    }
}

struct RsaBench {
    keys: KeyPair,
}

impl BenchAlgorithm for RsaBench {
    fn name(&self) -> &str {
        Algorithm::RsaPkcs1v15.name()
    }

    // Same scheme as SignatureCodec::sign, minus the base64 step
    fn run(&self, input: &[u8]) -> Result<Vec<u8>, AlgorithmError> {
        let digest = Sha256::digest(input);
        self.keys
            .private_key()
            .sign(Pkcs1v15Sign::new::<Sha256>(), &digest)
            .map_err(|e| AlgorithmError::new(self.name(), e.to_string()))
    }
}
