//! # sigrelay
//!
//! Signed-message exchange between two parties over an unauthenticated
//! relay, plus a throughput benchmark for the primitives involved.
//!
//! ## Features
//!
//! - **RSA key pairs** generated off the caller's task, public half as PEM
//! - **SHA-256 + PKCS#1 v1.5 signatures**, base64 on the wire, fail-closed verification
//! - **Explicit trust states** per message: pending, valid, invalid
//! - **Pluggable transport** (in-memory hub, WebSocket relay)
//! - **Benchmark harness** over ciphers, hashes and signatures at increasing load
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sigrelay::crypto::{KeyPair, SignatureCodec};
//!
//! let keys = KeyPair::generate(2048)?;
//! let signature = SignatureCodec::sign("hello", &keys)?;
//!
//! assert!(SignatureCodec::verify("hello", &signature, keys.public_key()));
//! # Ok::<(), sigrelay::CryptoError>(())
//! ```
//!
//! ## Trust model
//!
//! A valid signature proves that the key bundled in the envelope signed the
//! text, nothing more. Identity labels are self-asserted, the relay is
//! neither authenticated nor encrypted, and delivery is at most once.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              APPLICATION LAYER              │
//! │      CLI  |  Relay server  |  UI sinks      │
//! └─────────────────────┬───────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────┐
//! │              PROTOCOL LAYER                 │
//! │  Session | Envelopes | Verification | Bench │
//! └─────────────────────┬───────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────┐
//! │               CRYPTO LAYER                  │
//! │        RSA-2048 | SHA-256 | PKCS#1 v1.5     │
//! └─────────────────────┬───────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────┐
//! │             TRANSPORT LAYER                 │
//! │     Relay events | In-memory | WebSocket    │
//! └─────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bench;
pub mod config;
pub mod crypto;
pub mod message;
pub mod relay;
pub mod session;
pub mod sink;
pub mod transport;

// Re-export main types at crate root
pub use bench::{BenchError, BenchmarkHarness, BenchmarkResult};
pub use config::{BenchConfig, SessionConfig};
pub use crypto::{CryptoError, CryptoResult, KeyManager, KeyPair, PublicKeyPem, SignatureCodec};
pub use message::{Identity, MessageEnvelope, VerificationEngine, VerificationStatus};
pub use relay::{RelayClient, RelayHub};
pub use session::{ChatSession, SessionError};
pub use sink::{Notification, Severity, UiSink};
