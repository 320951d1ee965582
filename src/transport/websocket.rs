//! WebSocket transport to a relay server
//!
//! Relay frames travel as WebSocket text messages, one JSON event per
//! message. The relay puts every client in one room on connect, so there is
//! no join step.

use super::{Transport, TransportError, TransportResult};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::debug;

/// WebSocket transport connected to a relay server
pub struct WebSocketTransport {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    connected: bool,
}

impl WebSocketTransport {
    /// Connect to a relay server
    pub async fn connect(relay_url: &str) -> TransportResult<Self> {
        let (ws, _) = connect_async(relay_url)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        debug!(relay_url, "connected to relay");
        Ok(WebSocketTransport {
            ws,
            connected: true,
        })
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, data: &[u8]) -> TransportResult<()> {
        if !self.connected {
            return Err(TransportError::Disconnected);
        }

        let text = String::from_utf8(data.to_vec())
            .map_err(|e| TransportError::InvalidData(e.to_string()))?;

        if let Err(e) = self.ws.send(Message::Text(text)).await {
            self.connected = false;
            return Err(TransportError::SendFailed(e.to_string()));
        }
        Ok(())
    }

    async fn receive(&mut self) -> TransportResult<Vec<u8>> {
        if !self.connected {
            return Err(TransportError::Disconnected);
        }

        loop {
            match self.ws.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text.into_bytes()),
                Some(Ok(Message::Binary(data))) => return Ok(data),
                Some(Ok(Message::Close(_))) | None => {
                    self.connected = false;
                    return Err(TransportError::Disconnected);
                }
                Some(Ok(Message::Ping(data))) => {
                    let _ = self.ws.send(Message::Pong(data)).await;
                }
                Some(Err(e)) => {
                    self.connected = false;
                    return Err(TransportError::ReceiveFailed(e.to_string()));
                }
                _ => continue,
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn close(&mut self) -> TransportResult<()> {
        self.connected = false;
        self.ws
            .close(None)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }
}
