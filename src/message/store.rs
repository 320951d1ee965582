//! Ordered message store with per-envelope status updates

use std::collections::HashMap;

use parking_lot::Mutex;
use thiserror::Error;

use super::envelope::{EnvelopeId, MessageEnvelope, VerificationStatus};

/// Errors from the message store
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// An envelope with this id is already stored
    #[error("Duplicate envelope id {0}")]
    DuplicateId(EnvelopeId),

    /// No envelope with this id
    #[error("Unknown envelope id {0}")]
    UnknownEnvelope(EnvelopeId),
}

/// Outcome of a status update
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusChange {
    /// The status moved from `from` to the new value
    Changed {
        /// Status before the update
        from: VerificationStatus,
    },
    /// The envelope already had the requested status
    Unchanged,
}

#[derive(Default)]
struct Inner {
    order: Vec<MessageEnvelope>,
    index: HashMap<EnvelopeId, usize>,
}

/// Arrival-ordered sequence of envelopes
///
/// Appends and status updates each take the store lock, so a status update
/// keyed by id is atomic even when verifications race on several threads.
#[derive(Default)]
pub struct MessageStore {
    inner: Mutex<Inner>,
}

impl MessageStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an envelope at the end
    pub fn append(&self, envelope: MessageEnvelope) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let id = envelope.id();
        if inner.index.contains_key(&id) {
            return Err(StoreError::DuplicateId(id));
        }

        let position = inner.order.len();
        inner.order.push(envelope);
        inner.index.insert(id, position);
        Ok(())
    }

    /// Copy of the envelope with this id
    pub fn get(&self, id: EnvelopeId) -> Option<MessageEnvelope> {
        let inner = self.inner.lock();
        inner.index.get(&id).map(|&i| inner.order[i].clone())
    }

    /// Current status of the envelope with this id
    pub fn status(&self, id: EnvelopeId) -> Option<VerificationStatus> {
        let inner = self.inner.lock();
        inner
            .index
            .get(&id)
            .map(|&i| inner.order[i].verification_status())
    }

    /// Set the status to `new` only if it is currently `expected`
    ///
    /// Returns whether the swap happened.
    pub fn compare_and_set_status(
        &self,
        id: EnvelopeId,
        expected: VerificationStatus,
        new: VerificationStatus,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock();
        let i = *inner.index.get(&id).ok_or(StoreError::UnknownEnvelope(id))?;
        let envelope = &mut inner.order[i];

        if envelope.verification_status() != expected {
            return Ok(false);
        }
        envelope.set_verification_status(new);
        Ok(true)
    }

    /// Record a verification outcome
    ///
    /// Re-recording the status an envelope already has is a no-op, which
    /// keeps repeated verification of the same envelope idempotent.
    pub fn record_status(
        &self,
        id: EnvelopeId,
        status: VerificationStatus,
    ) -> Result<StatusChange, StoreError> {
        let mut inner = self.inner.lock();
        let i = *inner.index.get(&id).ok_or(StoreError::UnknownEnvelope(id))?;
        let envelope = &mut inner.order[i];

        let from = envelope.verification_status();
        if from == status {
            return Ok(StatusChange::Unchanged);
        }
        envelope.set_verification_status(status);
        Ok(StatusChange::Changed { from })
    }

    /// All envelopes in arrival order
    pub fn snapshot(&self) -> Vec<MessageEnvelope> {
        self.inner.lock().order.clone()
    }

    /// Number of stored envelopes
    pub fn len(&self) -> usize {
        self.inner.lock().order.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
