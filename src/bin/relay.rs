//! sigrelay relay server
//!
//! A WebSocket relay that puts every client in one implicit room:
//! - `sharePublicKey` is delivered to everyone else as `receivePublicKey`
//! - `sendMessage` is delivered to everyone else as `receiveMessage`
//! - nothing is authenticated, stored or retried
//!
//! Usage:
//!   sigrelay-relay [--port 4000] [--host 0.0.0.0]

use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use sigrelay::relay::RelayHub;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// sigrelay relay server
#[derive(Parser)]
#[command(name = "sigrelay-relay")]
#[command(about = "Unauthenticated fan-out relay for signed chat messages")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "4000")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Frames buffered per client before the oldest are dropped
    #[arg(long, default_value_t = sigrelay::relay::hub::DEFAULT_CAPACITY)]
    capacity: usize,
}

/// Handle a single WebSocket connection
async fn handle_connection(stream: TcpStream, addr: SocketAddr, hub: RelayHub) {
    info!("New connection from: {}", addr);

    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            error!("WebSocket handshake failed for {}: {}", addr, e);
            return;
        }
    };

    let (mut write, mut read) = ws_stream.split();
    let mut member = hub.join();

    loop {
        tokio::select! {
            // Frames from this client
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(e) = member.publish(&text) {
                            warn!("Dropping frame from {}: {}", addr, e);
                        }
                    }

                    Some(Ok(Message::Close(_))) | None => {
                        info!("Client {} disconnected", addr);
                        break;
                    }

                    Some(Ok(Message::Ping(data))) => {
                        let _ = write.send(Message::Pong(data)).await;
                    }

                    Some(Err(e)) => {
                        error!("WebSocket error from {}: {}", addr, e);
                        break;
                    }

                    _ => {}
                }
            }

            // Frames from everyone else in the room
            frame = member.recv() => {
                match frame {
                    Some(frame) => {
                        if let Err(e) = write.send(Message::Text(frame)).await {
                            warn!("Failed to deliver to {}: {}", addr, e);
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let addr = format!("{}:{}", args.host, args.port);

    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    info!("sigrelay relay listening on ws://{}", addr);
    info!("All clients share one room; events are not authenticated");

    let hub = RelayHub::with_capacity(args.capacity);

    while let Ok((stream, addr)) = listener.accept().await {
        tokio::spawn(handle_connection(stream, addr, hub.clone()));
    }
}
