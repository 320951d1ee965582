//! Single-room fan-out
//!
//! Every member of a hub is in the same room. A frame published by one
//! member is translated into its delivery event and handed to every other
//! member; the publisher never gets its own frame back.
//!
//! Delivery is at most once. A member that falls more than the channel
//! capacity behind loses the oldest frames, and nobody is told except the
//! log. Frames from one publisher keep their order.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::{RawFrame, RelayResult};

/// Frames buffered per member before the oldest are dropped
pub const DEFAULT_CAPACITY: usize = 256;

/// Hub-local member number
pub type MemberId = u64;

#[derive(Clone, Debug)]
struct Frame {
    from: MemberId,
    payload: Arc<str>,
}

struct Shared {
    tx: broadcast::Sender<Frame>,
    next_id: AtomicU64,
    members: AtomicUsize,
}

/// The implicit global room
#[derive(Clone)]
pub struct RelayHub {
    shared: Arc<Shared>,
}

impl RelayHub {
    /// Create a hub with the default per-member buffer
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a hub buffering up to `capacity` frames per member
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        RelayHub {
            shared: Arc::new(Shared {
                tx,
                next_id: AtomicU64::new(1),
                members: AtomicUsize::new(0),
            }),
        }
    }

    /// Join the room
    ///
    /// The new member receives frames published from now on.
    pub fn join(&self) -> HubMember {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let rx = self.shared.tx.subscribe();
        let members = self.shared.members.fetch_add(1, Ordering::Relaxed) + 1;
        info!(member = id, members, "member joined");

        HubMember {
            id,
            shared: self.shared.clone(),
            rx,
        }
    }

    /// Members currently in the room
    pub fn member_count(&self) -> usize {
        self.shared.members.load(Ordering::Relaxed)
    }
}

impl Default for RelayHub {
    fn default() -> Self {
        Self::new()
    }
}

/// One connection's seat in the room
pub struct HubMember {
    id: MemberId,
    shared: Arc<Shared>,
    rx: broadcast::Receiver<Frame>,
}

impl HubMember {
    /// Member number
    pub fn id(&self) -> MemberId {
        self.id
    }

    /// Relay a client frame to every other member
    ///
    /// `sharePublicKey` goes out as `receivePublicKey` and `sendMessage` as
    /// `receiveMessage`, with `data` forwarded exactly as received. Returns
    /// how many members it was handed to, which is zero for a lone member.
    pub fn publish(&self, frame: &str) -> RelayResult<usize> {
        let delivery = RawFrame::parse(frame)?.into_delivery()?;
        let payload: Arc<str> = delivery.to_json()?.into();

        // the publisher's own receiver is counted by send()
        let others = match self.shared.tx.send(Frame {
            from: self.id,
            payload,
        }) {
            Ok(receivers) => receivers.saturating_sub(1),
            Err(_) => 0,
        };

        debug!(member = self.id, event = %delivery.event, recipients = others, "frame relayed");
        Ok(others)
    }

    /// Next frame published by another member
    ///
    /// Returns `None` once the hub is gone.
    pub async fn recv(&mut self) -> Option<String> {
        loop {
            match self.rx.recv().await {
                Ok(frame) if frame.from == self.id => continue,
                Ok(frame) => return Some(frame.payload.to_string()),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(member = self.id, skipped, "relay delivery gap, frames dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for HubMember {
    fn drop(&mut self) {
        let members = self.shared.members.fetch_sub(1, Ordering::Relaxed) - 1;
        info!(member = self.id, members, "member left");
    }
}
