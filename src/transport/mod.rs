//! Transport layer abstraction
//!
//! A transport moves opaque relay frames between this process and the
//! relay. Two implementations ship with the crate:
//! - In-memory, attached to a [`RelayHub`](crate::relay::RelayHub) (tests, embedding)
//! - WebSocket, connected to a relay server
//!
//! Transports know nothing about keys or envelopes; framing and recipient
//! filtering live in [`relay`](crate::relay).

use async_trait::async_trait;
use thiserror::Error;

pub mod websocket;
pub use websocket::WebSocketTransport;

/// Transport errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection closed
    #[error("Connection closed")]
    Disconnected,

    /// Send failed
    #[error("Failed to send: {0}")]
    SendFailed(String),

    /// Receive failed
    #[error("Failed to receive: {0}")]
    ReceiveFailed(String),

    /// Invalid data
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Abstract transport trait
///
/// Delivery is best effort: a frame sent while the other side is away is
/// simply lost.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one frame to the relay
    async fn send(&mut self, data: &[u8]) -> TransportResult<()>;

    /// Receive the next frame from the relay
    ///
    /// Waits until a frame is available or the connection is closed.
    async fn receive(&mut self) -> TransportResult<Vec<u8>>;

    /// Check if the transport is connected
    fn is_connected(&self) -> bool;

    /// Close the transport
    async fn close(&mut self) -> TransportResult<()>;
}

/// In-memory transport for testing
///
/// Each transport is one member of a shared [`RelayHub`]. Closing it leaves
/// the hub, so frames published while closed are never seen.
pub mod memory {
    use super::*;
    use crate::relay::{HubMember, RelayHub};

    /// In-memory transport endpoint
    pub struct MemoryTransport {
        member: Option<HubMember>,
    }

    impl MemoryTransport {
        /// Join `hub` as a new member
        pub fn connect(hub: &RelayHub) -> Self {
            MemoryTransport {
                member: Some(hub.join()),
            }
        }

        fn member(&mut self) -> TransportResult<&mut HubMember> {
            self.member.as_mut().ok_or(TransportError::Disconnected)
        }
    }

    #[async_trait]
    impl Transport for MemoryTransport {
        async fn send(&mut self, data: &[u8]) -> TransportResult<()> {
            let member = self.member()?;
            let frame =
                std::str::from_utf8(data).map_err(|e| TransportError::InvalidData(e.to_string()))?;

            member
                .publish(frame)
                .map(|_| ())
                .map_err(|e| TransportError::SendFailed(e.to_string()))
        }

        async fn receive(&mut self) -> TransportResult<Vec<u8>> {
            let member = self.member()?;
            match member.recv().await {
                Some(frame) => Ok(frame.into_bytes()),
                None => {
                    self.member = None;
                    Err(TransportError::Disconnected)
                }
            }
        }

        fn is_connected(&self) -> bool {
            self.member.is_some()
        }

        async fn close(&mut self) -> TransportResult<()> {
            self.member = None;
            Ok(())
        }
    }
}
