//! Chat session orchestration
//!
//! A [`ChatSession`] belongs to one local identity talking to one peer. It
//! owns the identity's key pair, its relay client and its message store,
//! and reports everything the user should see through a [`UiSink`].
//!
//! Flow: generate keys (announced to the peer right away), send signed
//! messages, receive the peer's key and messages, verify received messages
//! on demand.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{ConfigError, SessionConfig};
use crate::crypto::{CryptoError, KeyManager, KeyPair, PublicKeyPem};
use crate::message::{
    EnvelopeId, EnvelopeIdGenerator, Identity, MessageEnvelope, MessageStore, StatusChange,
    StoreError, VerificationEngine, VerificationStatus,
};
use crate::relay::{ConnectionState, RelayClient, RelayError, RelayEvent};
use crate::sink::{Notification, Severity, UiSink};
use crate::transport::Transport;

/// Session errors
#[derive(Error, Debug)]
pub enum SessionError {
    /// Keys must be generated before sending
    #[error("No key pair yet; generate keys first")]
    NoKeys,

    /// Nothing to send
    #[error("Message is empty")]
    EmptyMessage,

    /// Invalid configuration
    #[error("Invalid session configuration: {0}")]
    Config(#[from] ConfigError),

    /// Key generation or signing failed
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Relay failure
    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),

    /// Store rejected the operation
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The message was signed and stored, but the relay did not take it
    #[error("Message {id} kept locally but not relayed: {source}")]
    Undelivered {
        /// Id of the stored envelope
        id: EnvelopeId,
        /// Relay failure
        source: RelayError,
    },
}

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;

/// One identity's side of a conversation
pub struct ChatSession {
    config: SessionConfig,
    key_manager: KeyManager,
    keys: Option<Arc<KeyPair>>,
    peer_public_key: Option<PublicKeyPem>,
    relay: RelayClient,
    store: MessageStore,
    ids: EnvelopeIdGenerator,
    sink: Arc<dyn UiSink>,
}

impl ChatSession {
    /// Create a session over a connected transport
    pub fn new(
        config: SessionConfig,
        transport: Box<dyn Transport>,
        sink: Arc<dyn UiSink>,
    ) -> SessionResult<Self> {
        config.validate()?;

        let relay = RelayClient::new(config.identity.clone(), transport);
        info!(identity = %config.identity, peer = %config.peer, "session created");

        Ok(ChatSession {
            key_manager: KeyManager::new(config.key_bits),
            config,
            keys: None,
            peer_public_key: None,
            relay,
            store: MessageStore::new(),
            ids: EnvelopeIdGenerator::new(),
            sink,
        })
    }

    /// Local identity
    pub fn identity(&self) -> &Identity {
        &self.config.identity
    }

    /// The peer we talk to
    pub fn peer(&self) -> &Identity {
        &self.config.peer
    }

    /// Our key pair, once generated
    pub fn keys(&self) -> Option<&Arc<KeyPair>> {
        self.keys.as_ref()
    }

    /// Latest key the peer announced
    ///
    /// Informational only; verification uses the key inside each envelope.
    pub fn peer_public_key(&self) -> Option<&PublicKeyPem> {
        self.peer_public_key.as_ref()
    }

    /// Sent and received envelopes in arrival order
    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    /// Relay link state
    pub fn connection_state(&self) -> ConnectionState {
        self.relay.state()
    }

    /// Generate a fresh key pair and announce its public half to the peer
    ///
    /// Generation runs off the current task. A previous key pair is
    /// replaced. If the announcement fails the keys are kept and
    /// [`announce_key`](Self::announce_key) can be retried.
    pub async fn generate_keys(&mut self) -> SessionResult<PublicKeyPem> {
        let keys = match self.key_manager.generate_key_pair().await {
            Ok(keys) => keys,
            Err(e) => {
                self.notify(format!("Key generation failed: {}", e), Severity::Error);
                return Err(e.into());
            }
        };

        let public_key = keys.public_key().clone();
        self.keys = Some(keys);
        self.notify("Keys generated", Severity::Success);

        self.announce_key().await?;
        Ok(public_key)
    }

    /// Send our public key to the peer again
    pub async fn announce_key(&mut self) -> SessionResult<()> {
        let public_key = match &self.keys {
            Some(keys) => keys.public_key().clone(),
            None => return Err(self.reject(SessionError::NoKeys, "Generate your keys first")),
        };

        if let Err(e) = self.relay.share_public_key(&self.config.peer, &public_key).await {
            warn!(identity = %self.config.identity, error = %e, "key announcement failed");
            self.notify(format!("Could not share public key: {}", e), Severity::Error);
            return Err(e.into());
        }

        debug!(peer = %self.config.peer, key = %public_key.fingerprint(), "public key announced");
        Ok(())
    }

    /// Sign `text` and send it to the peer
    ///
    /// The text is signed exactly as given. The local copy is stored before
    /// the relay is tried, so it survives a relay failure.
    pub async fn send_message(&mut self, text: &str) -> SessionResult<EnvelopeId> {
        let Some(keys) = self.keys.clone() else {
            return Err(self.reject(SessionError::NoKeys, "Generate your keys first"));
        };
        if text.trim().is_empty() {
            return Err(self.reject(SessionError::EmptyMessage, "Nothing to send"));
        }

        let envelope = MessageEnvelope::sign(
            self.ids.next_id(),
            text,
            &keys,
            self.config.identity.clone(),
            Some(self.config.peer.clone()),
        )?;
        let id = envelope.id();
        self.store.append(envelope.clone())?;

        if let Err(source) = self.relay.send_message(&self.config.peer, &envelope).await {
            warn!(%id, error = %source, "message not relayed");
            self.notify(format!("Message not delivered: {}", source), Severity::Error);
            return Err(SessionError::Undelivered { id, source });
        }

        info!(%id, peer = %self.config.peer, "message sent");
        Ok(id)
    }

    /// Wait for the next relay event addressed to us and apply it
    ///
    /// Returns the id of a newly stored envelope, or `None` for a key
    /// announcement.
    pub async fn receive_next(&mut self) -> SessionResult<Option<EnvelopeId>> {
        let event = match self.relay.next_event().await {
            Ok(event) => event,
            Err(e) => {
                self.notify(format!("Relay connection lost: {}", e), Severity::Error);
                return Err(e.into());
            }
        };
        self.handle_event(event)
    }

    /// Apply one relay event
    pub fn handle_event(&mut self, event: RelayEvent) -> SessionResult<Option<EnvelopeId>> {
        match event {
            RelayEvent::PublicKey { sender, public_key } => {
                info!(%sender, key = %public_key.fingerprint(), "peer public key received");
                self.peer_public_key = Some(public_key);
                self.notify(format!("Public key from {} received", sender), Severity::Info);
                Ok(None)
            }
            RelayEvent::Message { sender, envelope } => {
                let envelope = envelope.into_received(sender);
                let id = envelope.id();
                if let Err(e) = self.store.append(envelope) {
                    warn!(%id, error = %e, "received envelope rejected");
                    self.notify(format!("Message dropped: {}", e), Severity::Error);
                    return Err(e.into());
                }

                info!(%id, "message received");
                Ok(Some(id))
            }
        }
    }

    /// Verify a stored envelope and record the verdict
    ///
    /// Local envelopes are trusted without a check. Malformed data yields
    /// `Invalid` plus an error notification. The sink only hears about
    /// actual status changes, so repeating the call is harmless.
    pub fn verify(&self, id: EnvelopeId) -> SessionResult<VerificationStatus> {
        let Some(envelope) = self.store.get(id) else {
            return Err(self.reject(
                StoreError::UnknownEnvelope(id).into(),
                "Message not found",
            ));
        };

        let status = match VerificationEngine::check(&envelope) {
            Ok(()) => VerificationStatus::Valid,
            Err(CryptoError::SignatureVerificationFailed) => VerificationStatus::Invalid,
            Err(e) => {
                warn!(%id, error = %e, "verification failed on malformed data");
                self.notify("Verification failed: invalid data", Severity::Error);
                VerificationStatus::Invalid
            }
        };

        if let StatusChange::Changed { from } = self.store.record_status(id, status)? {
            debug!(%id, %from, to = %status, "verification status changed");
            self.sink.on_verification_status_changed(id, status);
        }
        Ok(status)
    }

    /// Leave the relay
    pub async fn disconnect(&mut self) -> SessionResult<()> {
        self.relay.disconnect().await?;
        Ok(())
    }

    fn notify(&self, message: impl Into<String>, severity: Severity) {
        let notification = Notification::new(message, severity).with_ttl(self.config.notification_ttl);
        self.sink.on_notify(&notification);
    }

    fn reject(&self, error: SessionError, message: &str) -> SessionError {
        self.notify(message, Severity::Error);
        error
    }
}
