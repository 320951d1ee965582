//! The signed unit of chat communication

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::crypto::{CryptoResult, KeyPair, PublicKeyPem, Signature, SignatureCodec};

/// Random low bits appended to the millisecond timestamp in an id
const ID_RANDOM_BITS: u32 = 10;

/// A participant label such as "Alice" or "Bob"
///
/// Labels are self-asserted: nothing binds a label to a key, and any
/// party can claim any label.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Create a label
    pub fn new(label: impl Into<String>) -> Self {
        Identity(label.into())
    }

    /// The label text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(label: &str) -> Self {
        Identity::new(label)
    }
}

impl From<String> for Identity {
    fn from(label: String) -> Self {
        Identity(label)
    }
}

/// Session-unique envelope identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvelopeId(u64);

impl EnvelopeId {
    /// Wrap a raw id
    pub const fn new(raw: u64) -> Self {
        EnvelopeId(raw)
    }

    /// The raw value
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EnvelopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hands out timestamp-derived ids that strictly increase
///
/// An id is `millis << 10 | random`, bumped past the previous id when the
/// clock stalls or steps back. The random suffix keeps two peers that send
/// in the same millisecond from colliding; ids stay below 2^53 so they
/// survive a trip through a JavaScript number.
#[derive(Debug, Default)]
pub struct EnvelopeIdGenerator {
    last: AtomicU64,
}

impl EnvelopeIdGenerator {
    /// Create a generator
    pub fn new() -> Self {
        Self::default()
    }

    /// Next id
    pub fn next_id(&self) -> EnvelopeId {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        let suffix = rand::random::<u64>() & ((1 << ID_RANDOM_BITS) - 1);
        let candidate = (millis << ID_RANDOM_BITS) | suffix;

        let previous = self
            .last
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
                Some(candidate.max(last + 1))
            })
            .unwrap_or_else(|last| last);

        EnvelopeId(candidate.max(previous + 1))
    }
}

/// Verification state of an envelope
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    /// Not checked yet
    #[default]
    Pending,
    /// The embedded key signed this exact text
    Valid,
    /// Malformed data or signature mismatch
    Invalid,
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VerificationStatus::Pending => "pending",
            VerificationStatus::Valid => "valid",
            VerificationStatus::Invalid => "invalid",
        };
        f.write_str(s)
    }
}

/// Where an envelope came from, from the point of view of the local store
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Origin {
    /// Composed and signed in this process
    Local,
    /// Delivered by the relay
    #[default]
    Remote,
}

/// A signed chat message
///
/// Everything except `verification_status` is fixed when the envelope is
/// built; the signature covers `text` exactly as stored here.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEnvelope {
    id: EnvelopeId,
    text: String,
    signature: Signature,
    sender_public_key: PublicKeyPem,
    #[serde(default)]
    verification_status: VerificationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    author: Option<Identity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    recipient: Option<Identity>,
    #[serde(skip)]
    origin: Origin,
}

impl MessageEnvelope {
    /// Sign `text` and wrap it as a local, pending envelope
    pub fn sign(
        id: EnvelopeId,
        text: impl Into<String>,
        keys: &KeyPair,
        author: Identity,
        recipient: Option<Identity>,
    ) -> CryptoResult<Self> {
        let text = text.into();
        let signature = SignatureCodec::sign(&text, keys)?;

        Ok(MessageEnvelope {
            id,
            text,
            signature,
            sender_public_key: keys.public_key().clone(),
            verification_status: VerificationStatus::Pending,
            author: Some(author),
            recipient,
            origin: Origin::Local,
        })
    }

    /// Assemble a remote envelope from already-encoded parts
    ///
    /// No check is made that `signature` matches; that is what verification
    /// is for.
    pub fn from_parts(
        id: EnvelopeId,
        text: impl Into<String>,
        signature: Signature,
        sender_public_key: PublicKeyPem,
    ) -> Self {
        MessageEnvelope {
            id,
            text: text.into(),
            signature,
            sender_public_key,
            verification_status: VerificationStatus::Pending,
            author: None,
            recipient: None,
            origin: Origin::Remote,
        }
    }

    /// Re-label an envelope that just arrived from the relay
    ///
    /// The author becomes the relay-level sender, and any status the sender
    /// put on the wire is discarded.
    pub fn into_received(mut self, sender: Identity) -> Self {
        self.author = Some(sender);
        self.origin = Origin::Remote;
        self.verification_status = VerificationStatus::Pending;
        self
    }

    /// Envelope id
    pub fn id(&self) -> EnvelopeId {
        self.id
    }

    /// Signed text
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Base64 signature over `text`
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Public key bundled by the sender
    pub fn sender_public_key(&self) -> &PublicKeyPem {
        &self.sender_public_key
    }

    /// Current verification status
    pub fn verification_status(&self) -> VerificationStatus {
        self.verification_status
    }

    /// Claimed author label
    pub fn author(&self) -> Option<&Identity> {
        self.author.as_ref()
    }

    /// Intended recipient label
    pub fn recipient(&self) -> Option<&Identity> {
        self.recipient.as_ref()
    }

    /// Local or remote
    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub(crate) fn set_verification_status(&mut self, status: VerificationStatus) {
        self.verification_status = status;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_ids_strictly_increase() {
        let ids = EnvelopeIdGenerator::new();
        let mut previous = ids.next_id();
        for _ in 0..1000 {
            let next = ids.next_id();
            assert!(next > previous);
            previous = next;
        }
    }

    #[test]
    fn test_ids_fit_js_number() {
        let id = EnvelopeIdGenerator::new().next_id();
        assert!(id.get() < (1u64 << 53));
    }

    #[test]
    fn test_ids_unique_across_threads() {
        let ids = std::sync::Arc::new(EnvelopeIdGenerator::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ids = ids.clone();
                std::thread::spawn(move || (0..250).map(|_| ids.next_id()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id));
            }
        }
    }

    #[test]
    fn test_wire_shape() {
        let keys = KeyPair::generate(1024).unwrap();
        let envelope = MessageEnvelope::sign(
            EnvelopeId::new(42),
            "hello",
            &keys,
            Identity::new("Alice"),
            Some(Identity::new("Bob")),
        )
        .unwrap();

        let json: serde_json::Value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["id"], 42);
        assert_eq!(json["text"], "hello");
        assert_eq!(json["verificationStatus"], "pending");
        assert_eq!(json["author"], "Alice");
        assert!(json["senderPublicKey"].as_str().unwrap().contains("BEGIN PUBLIC KEY"));
        assert!(json.get("origin").is_none());
    }

    #[test]
    fn test_received_envelope_resets_status_and_origin() {
        let json = r#"{
            "id": 7,
            "text": "hi",
            "signature": "AAAA",
            "senderPublicKey": "pem",
            "verificationStatus": "valid"
        }"#;
        let envelope: MessageEnvelope = serde_json::from_str(json).unwrap();
        let envelope = envelope.into_received(Identity::new("Mallory"));

        assert_eq!(envelope.verification_status(), VerificationStatus::Pending);
        assert_eq!(envelope.origin(), Origin::Remote);
        assert_eq!(envelope.author(), Some(&Identity::new("Mallory")));
    }

    #[test]
    fn test_missing_status_reads_as_pending() {
        let json = r#"{"id": 8, "text": "hi", "signature": "AAAA", "senderPublicKey": "pem"}"#;
        let envelope: MessageEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.verification_status(), VerificationStatus::Pending);
    }
}
