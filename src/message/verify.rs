//! Signature verification for envelopes
//!
//! The engine answers one question: did the key bundled in the envelope
//! sign the text in the envelope? It does not, and cannot, tell whether
//! that key belongs to the identity named in `author`. A peer can sign
//! with any key and claim any label.
//!
//! Local envelopes short-circuit to `Valid`. They were signed in this
//! process, so they are trusted by construction and never re-checked.
//!
//! Verification time is not constant; timing side channels are out of
//! scope for this engine.

use serde::{Deserialize, Serialize};

use super::envelope::{MessageEnvelope, Origin, VerificationStatus};
use crate::crypto::{CryptoResult, SignatureCodec};

/// Outcome of verifying one envelope
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    /// Key-to-signature correspondence holds
    Valid,
    /// Anything else
    Invalid,
}

impl From<Verdict> for VerificationStatus {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Valid => VerificationStatus::Valid,
            Verdict::Invalid => VerificationStatus::Invalid,
        }
    }
}

/// Pure verification over the immutable envelope fields
pub struct VerificationEngine;

impl VerificationEngine {
    /// Verify an envelope
    ///
    /// Idempotent: the result depends only on fields that never change
    /// after construction.
    pub fn verify(envelope: &MessageEnvelope) -> Verdict {
        match Self::check(envelope) {
            Ok(()) => Verdict::Valid,
            Err(_) => Verdict::Invalid,
        }
    }

    /// Verify, keeping the reason for a rejection
    pub fn check(envelope: &MessageEnvelope) -> CryptoResult<()> {
        match envelope.origin() {
            Origin::Local => Ok(()),
            Origin::Remote => SignatureCodec::verify_detailed(
                envelope.text(),
                envelope.signature(),
                envelope.sender_public_key(),
            ),
        }
    }
}
