//! Envelopes, their store, and their verification

pub mod envelope;
pub mod store;
pub mod verify;

pub use envelope::{
    EnvelopeId, EnvelopeIdGenerator, Identity, MessageEnvelope, Origin, VerificationStatus,
};
pub use store::{MessageStore, StatusChange, StoreError};
pub use verify::{Verdict, VerificationEngine};
