//! Relay protocol and client
//!
//! The relay is a dumb fan-out: clients publish `sharePublicKey` and
//! `sendMessage` events, and every other connected client gets the matching
//! `receivePublicKey` / `receiveMessage` event. The relay does not read the
//! payload, authenticate anyone, retry, or persist anything.
//!
//! # Known gaps
//!
//! Delivery is at most once. A client that is disconnected, or that falls
//! too far behind, never sees the events sent in that window, and neither
//! side is told. Recipient filtering happens here on the client; the relay
//! delivers every event to every other member.

pub mod hub;

pub use hub::{HubMember, MemberId, RelayHub};

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::crypto::PublicKeyPem;
use crate::message::{Identity, MessageEnvelope};
use crate::transport::{Transport, TransportError};

/// Relay errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// Underlying transport failed
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// A frame that is not a relay event
    #[error("Malformed relay frame: {0}")]
    Malformed(String),

    /// A relay-to-client event was published by a client
    #[error("Event {0} cannot be published")]
    NotPublishable(&'static str),
}

impl From<serde_json::Error> for RelayError {
    fn from(e: serde_json::Error) -> Self {
        RelayError::Malformed(e.to_string())
    }
}

/// Result type for relay operations
pub type RelayResult<T> = Result<T, RelayError>;

/// Public key announcement payload
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyAnnouncement {
    /// Claimed sender label
    pub sender: Identity,
    /// Intended recipient label
    pub recipient: Identity,
    /// Announced key
    pub public_key: PublicKeyPem,
}

/// Message delivery payload
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDelivery {
    /// Claimed sender label
    pub sender: Identity,
    /// Intended recipient label
    pub recipient: Identity,
    /// The signed envelope
    pub message: MessageEnvelope,
}

/// Events on the relay wire
///
/// Serialized as `{"event": "<name>", "data": {...}}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum RelayMessage {
    /// Client publishes its public key
    SharePublicKey(KeyAnnouncement),
    /// Client publishes a message
    SendMessage(MessageDelivery),
    /// Relay delivers someone else's public key
    ReceivePublicKey(KeyAnnouncement),
    /// Relay delivers someone else's message
    ReceiveMessage(MessageDelivery),
}

impl RelayMessage {
    /// Wire name of the event
    pub fn event_name(&self) -> &'static str {
        match self {
            RelayMessage::SharePublicKey(_) => "sharePublicKey",
            RelayMessage::SendMessage(_) => "sendMessage",
            RelayMessage::ReceivePublicKey(_) => "receivePublicKey",
            RelayMessage::ReceiveMessage(_) => "receiveMessage",
        }
    }

    /// Serialize to JSON text
    pub fn to_json(&self) -> RelayResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Serialize to a transport frame
    pub fn to_bytes(&self) -> RelayResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse a transport frame
    pub fn from_bytes(frame: &[u8]) -> RelayResult<Self> {
        Ok(serde_json::from_slice(frame)?)
    }
}

/// Event a client-published event is delivered as
///
/// Only `sharePublicKey` and `sendMessage` may be published.
pub fn delivery_event(published: &str) -> RelayResult<&'static str> {
    match published {
        "sharePublicKey" => Ok("receivePublicKey"),
        "sendMessage" => Ok("receiveMessage"),
        "receivePublicKey" => Err(RelayError::NotPublishable("receivePublicKey")),
        "receiveMessage" => Err(RelayError::NotPublishable("receiveMessage")),
        other => Err(RelayError::Malformed(format!("unknown event {:?}", other))),
    }
}

/// A relay frame whose payload is carried as received
///
/// The relay only looks at the event name; `data` is never parsed, so
/// fields this crate does not know about reach the other members intact.
#[derive(Debug, Serialize, Deserialize)]
pub struct RawFrame {
    /// Event name
    pub event: String,
    /// Payload, byte for byte
    pub data: Box<RawValue>,
}

impl RawFrame {
    /// Parse the `{"event", "data"}` wrapper of a frame
    pub fn parse(frame: &str) -> RelayResult<Self> {
        Ok(serde_json::from_str(frame)?)
    }

    /// The same payload under the event other members receive
    pub fn into_delivery(self) -> RelayResult<RawFrame> {
        let event = delivery_event(&self.event)?;
        Ok(RawFrame {
            event: event.to_string(),
            data: self.data,
        })
    }

    /// Serialize to JSON text
    pub fn to_json(&self) -> RelayResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Something delivered to this client
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelayEvent {
    /// A peer announced its key
    PublicKey {
        /// Claimed sender
        sender: Identity,
        /// The key
        public_key: PublicKeyPem,
    },
    /// A peer sent a message
    Message {
        /// Claimed sender
        sender: Identity,
        /// The envelope as sent
        envelope: MessageEnvelope,
    },
}

/// Link state as seen by the client
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Frames can flow
    Connected,
    /// The transport is gone; events sent meanwhile are lost
    Disconnected,
}

/// Per-session relay client
///
/// Owned by the session that uses it; publishes under the session's
/// identity and only surfaces events addressed to it.
pub struct RelayClient {
    identity: Identity,
    transport: Box<dyn Transport>,
    state: ConnectionState,
}

impl RelayClient {
    /// Wrap a connected transport
    pub fn new(identity: Identity, transport: Box<dyn Transport>) -> Self {
        let state = if transport.is_connected() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        };

        RelayClient {
            identity,
            transport,
            state,
        }
    }

    /// Identity events are published under and filtered for
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Current link state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Announce `public_key` to `recipient`
    pub async fn share_public_key(
        &mut self,
        recipient: &Identity,
        public_key: &PublicKeyPem,
    ) -> RelayResult<()> {
        let event = RelayMessage::SharePublicKey(KeyAnnouncement {
            sender: self.identity.clone(),
            recipient: recipient.clone(),
            public_key: public_key.clone(),
        });
        self.publish(&event).await
    }

    /// Send `envelope` to `recipient`
    pub async fn send_message(
        &mut self,
        recipient: &Identity,
        envelope: &MessageEnvelope,
    ) -> RelayResult<()> {
        let event = RelayMessage::SendMessage(MessageDelivery {
            sender: self.identity.clone(),
            recipient: recipient.clone(),
            message: envelope.clone(),
        });
        self.publish(&event).await
    }

    /// Next event addressed to this client
    ///
    /// Frames for other recipients and frames that do not parse are
    /// skipped. A transport failure moves the client to `Disconnected`.
    pub async fn next_event(&mut self) -> RelayResult<RelayEvent> {
        loop {
            let frame = match self.transport.receive().await {
                Ok(frame) => frame,
                Err(e) => {
                    self.mark_disconnected(&e);
                    return Err(e.into());
                }
            };

            let event = match RelayMessage::from_bytes(&frame) {
                Ok(event) => event,
                Err(e) => {
                    warn!(identity = %self.identity, error = %e, "dropping unreadable relay frame");
                    continue;
                }
            };

            match event {
                RelayMessage::ReceivePublicKey(announce) if announce.recipient == self.identity => {
                    return Ok(RelayEvent::PublicKey {
                        sender: announce.sender,
                        public_key: announce.public_key,
                    });
                }
                RelayMessage::ReceiveMessage(delivery) if delivery.recipient == self.identity => {
                    return Ok(RelayEvent::Message {
                        sender: delivery.sender,
                        envelope: delivery.message,
                    });
                }
                other => {
                    debug!(identity = %self.identity, event = other.event_name(), "event not for us");
                }
            }
        }
    }

    /// Close the link
    pub async fn disconnect(&mut self) -> RelayResult<()> {
        self.state = ConnectionState::Disconnected;
        self.transport.close().await?;
        info!(identity = %self.identity, "disconnected from relay");
        Ok(())
    }

    async fn publish(&mut self, event: &RelayMessage) -> RelayResult<()> {
        let frame = event.to_bytes()?;
        if let Err(e) = self.transport.send(&frame).await {
            self.mark_disconnected(&e);
            return Err(e.into());
        }
        debug!(identity = %self.identity, event = event.event_name(), "published");
        Ok(())
    }

    fn mark_disconnected(&mut self, error: &TransportError) {
        let lost = matches!(error, TransportError::Disconnected) || !self.transport.is_connected();
        if !lost {
            warn!(identity = %self.identity, %error, "relay frame failed");
            return;
        }
        if self.state == ConnectionState::Connected {
            warn!(identity = %self.identity, %error, "relay connection lost");
        }
        self.state = ConnectionState::Disconnected;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{KeyPair, SignatureCodec};
    use crate::message::EnvelopeId;
    use crate::transport::memory::MemoryTransport;
    use std::sync::LazyLock;
    use std::time::Duration;
    use tokio::time::timeout;

    static KEYS: LazyLock<KeyPair> = LazyLock::new(|| KeyPair::generate(1024).unwrap());

    fn client(hub: &RelayHub, name: &str) -> RelayClient {
        RelayClient::new(Identity::new(name), Box::new(MemoryTransport::connect(hub)))
    }

    fn envelope(text: &str) -> MessageEnvelope {
        let signature = SignatureCodec::sign(text, &KEYS).unwrap();
        MessageEnvelope::from_parts(EnvelopeId::new(9), text, signature, KEYS.public_key().clone())
    }

    #[test]
    fn test_wire_format() {
        let event = RelayMessage::SharePublicKey(KeyAnnouncement {
            sender: Identity::new("Alice"),
            recipient: Identity::new("Bob"),
            public_key: PublicKeyPem::from_pem("pem"),
        });
        let json: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();

        assert_eq!(json["event"], "sharePublicKey");
        assert_eq!(json["data"]["sender"], "Alice");
        assert_eq!(json["data"]["recipient"], "Bob");
        assert_eq!(json["data"]["publicKey"], "pem");
    }

    #[test]
    fn test_message_wire_format() {
        let event = RelayMessage::SendMessage(MessageDelivery {
            sender: Identity::new("Alice"),
            recipient: Identity::new("Bob"),
            message: envelope("hello"),
        });
        let json: serde_json::Value = serde_json::to_value(&event).unwrap();

        assert_eq!(json["event"], "sendMessage");
        assert_eq!(json["data"]["message"]["text"], "hello");
        assert_eq!(json["data"]["message"]["verificationStatus"], "pending");

        let back = RelayMessage::from_bytes(&event.to_bytes().unwrap()).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_delivery_translation() {
        let frame = r#"{"event":"sharePublicKey","data":{"sender":"Alice","recipient":"Bob","publicKey":"pem"}}"#;
        let delivered = RawFrame::parse(frame).unwrap().into_delivery().unwrap();
        assert_eq!(delivered.event, "receivePublicKey");

        match RelayMessage::from_bytes(delivered.to_json().unwrap().as_bytes()).unwrap() {
            RelayMessage::ReceivePublicKey(announce) => {
                assert_eq!(announce.sender, Identity::new("Alice"));
                assert_eq!(announce.public_key, PublicKeyPem::from_pem("pem"));
            }
            other => panic!("unexpected event: {:?}", other),
        }

        assert_eq!(
            delivery_event("receivePublicKey"),
            Err(RelayError::NotPublishable("receivePublicKey"))
        );
        assert!(matches!(delivery_event("joinRoom"), Err(RelayError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_key_and_message_reach_recipient() {
        let hub = RelayHub::new();
        let mut alice = client(&hub, "Alice");
        let mut bob = client(&hub, "Bob");

        alice
            .share_public_key(&Identity::new("Bob"), KEYS.public_key())
            .await
            .unwrap();
        alice
            .send_message(&Identity::new("Bob"), &envelope("hello"))
            .await
            .unwrap();

        match bob.next_event().await.unwrap() {
            RelayEvent::PublicKey { sender, public_key } => {
                assert_eq!(sender, Identity::new("Alice"));
                assert_eq!(&public_key, KEYS.public_key());
            }
            other => panic!("unexpected event: {:?}", other),
        }
        match bob.next_event().await.unwrap() {
            RelayEvent::Message { sender, envelope } => {
                assert_eq!(sender, Identity::new("Alice"));
                assert_eq!(envelope.text(), "hello");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_events_for_others_are_filtered() {
        let hub = RelayHub::new();
        let mut alice = client(&hub, "Alice");
        let mut carol = client(&hub, "Carol");

        alice
            .send_message(&Identity::new("Bob"), &envelope("for bob"))
            .await
            .unwrap();
        assert!(timeout(Duration::from_millis(50), carol.next_event()).await.is_err());
    }

    #[tokio::test]
    async fn test_disconnect_state() {
        let hub = RelayHub::new();
        let mut bob = client(&hub, "Bob");
        assert_eq!(bob.state(), ConnectionState::Connected);

        bob.disconnect().await.unwrap();
        assert_eq!(bob.state(), ConnectionState::Disconnected);
        assert_eq!(
            bob.next_event().await,
            Err(RelayError::Transport(TransportError::Disconnected))
        );
    }

    #[tokio::test]
    async fn test_send_failure_marks_disconnected() {
        let hub = RelayHub::new();
        let mut transport = MemoryTransport::connect(&hub);
        transport.close().await.unwrap();
        let mut alice = RelayClient::new(Identity::new("Alice"), Box::new(transport));
        assert_eq!(alice.state(), ConnectionState::Disconnected);

        let result = alice
            .share_public_key(&Identity::new("Bob"), KEYS.public_key())
            .await;
        assert!(result.is_err());
        assert_eq!(alice.state(), ConnectionState::Disconnected);
    }
}
