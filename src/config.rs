//! Session and benchmark configuration
//!
//! Both structs have defaults matching the interactive tool and are
//! checked with `validate()` before use. The binaries fill them from
//! command-line arguments.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bench::Algorithm;
use crate::crypto::{DEFAULT_KEY_BITS, MIN_KEY_BITS};
use crate::message::Identity;
use crate::sink::DEFAULT_NOTIFICATION_TTL;

/// Iteration tiers run by default, smallest first
pub const DEFAULT_TIERS: [u64; 4] = [100, 1_000, 10_000, 100_000];

/// Text fed to every algorithm when the user gives none
pub const DEFAULT_BENCH_INPUT: &str = "This is a test message for evaluating the performance of \
    cryptographic algorithms. The goal is to measure processing time and memory consumption.";

/// Invalid configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Key size below the accepted minimum
    #[error("Key size {0} is below the minimum of {MIN_KEY_BITS} bits")]
    KeyTooSmall(usize),

    /// Local and peer labels are the same
    #[error("Peer must differ from the local identity ({0})")]
    PeerIsSelf(String),

    /// Empty identity label
    #[error("Identity labels must not be empty")]
    EmptyIdentity,

    /// No tiers to run
    #[error("At least one iteration tier is required")]
    NoTiers,

    /// A tier of zero iterations
    #[error("Iteration tiers must be positive")]
    ZeroTier,

    /// No algorithms to run
    #[error("At least one algorithm is required")]
    NoAlgorithms,

    /// The same algorithm listed twice
    #[error("Algorithm listed twice: {0}")]
    DuplicateAlgorithm(String),
}

/// Configuration of one chat session
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Local label
    pub identity: Identity,
    /// Label of the party we talk to
    pub peer: Identity,
    /// RSA modulus size for generated keys
    pub key_bits: usize,
    /// Auto-dismiss delay for notifications
    pub notification_ttl: Duration,
}

impl SessionConfig {
    /// Defaults for a session between `identity` and `peer`
    pub fn new(identity: impl Into<Identity>, peer: impl Into<Identity>) -> Self {
        SessionConfig {
            identity: identity.into(),
            peer: peer.into(),
            key_bits: DEFAULT_KEY_BITS,
            notification_ttl: DEFAULT_NOTIFICATION_TTL,
        }
    }

    /// Override the key size
    pub fn with_key_bits(mut self, bits: usize) -> Self {
        self.key_bits = bits;
        self
    }

    /// Check the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.identity.as_str().is_empty() || self.peer.as_str().is_empty() {
            return Err(ConfigError::EmptyIdentity);
        }
        if self.identity == self.peer {
            return Err(ConfigError::PeerIsSelf(self.identity.to_string()));
        }
        if self.key_bits < MIN_KEY_BITS {
            return Err(ConfigError::KeyTooSmall(self.key_bits));
        }
        Ok(())
    }
}

/// Configuration of the benchmark matrix
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchConfig {
    /// Default input text
    pub input: String,
    /// Iteration tiers, run in this order
    pub tiers: Vec<u64>,
    /// Algorithms, run in this order within each tier
    pub algorithms: Vec<Algorithm>,
    /// Yield to the scheduler before every cell
    pub yield_between_cells: bool,
}

impl Default for BenchConfig {
    fn default() -> Self {
        BenchConfig {
            input: DEFAULT_BENCH_INPUT.to_string(),
            tiers: DEFAULT_TIERS.to_vec(),
            algorithms: Algorithm::DEFAULT.to_vec(),
            yield_between_cells: true,
        }
    }
}

impl BenchConfig {
    /// Check only the tier list
    pub fn validate_tiers(&self) -> Result<(), ConfigError> {
        if self.tiers.is_empty() {
            return Err(ConfigError::NoTiers);
        }
        if self.tiers.contains(&0) {
            return Err(ConfigError::ZeroTier);
        }
        Ok(())
    }

    /// Check the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_tiers()?;
        if self.algorithms.is_empty() {
            return Err(ConfigError::NoAlgorithms);
        }
        for (i, algorithm) in self.algorithms.iter().enumerate() {
            if self.algorithms[..i].contains(algorithm) {
                return Err(ConfigError::DuplicateAlgorithm(algorithm.to_string()));
            }
        }
        Ok(())
    }
}
