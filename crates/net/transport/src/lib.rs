//! Channel transports.
//!
//! The protocol only needs a broadcast primitive with no delivery or ordering
//! guarantee: [`Transport::send`] puts a datagram on one of the three logical
//! channels, and every attached peer receives it on the matching stream of its
//! [`InboundStreams`].
//!
//! Two implementations are provided:
//! - [`MemoryHub`] - in-process fan-out, used by tests and simulations
//! - [`MulticastTransport`] - one IPv4 multicast group per channel

mod memory;
mod multicast;

use async_trait::async_trait;
use bytes::Bytes;
use cairn_net_codec::Message;
use cairn_primitives::ChannelId;
use tokio::sync::mpsc;

pub use memory::{MemoryHub, MemoryTransport};
pub use multicast::{MulticastConfig, MulticastTransport};

/// Capacity of each inbound stream. Datagrams beyond it are dropped, as a
/// full socket buffer would.
pub const INBOUND_CAPACITY: usize = 1024;

/// Errors from transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// IO error on a socket.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport was shut down.
    #[error("transport closed")]
    Closed,
}

/// A datagram received on a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub channel: ChannelId,
    pub payload: Bytes,
}

/// Receiving halves for the three channels.
#[derive(Debug)]
pub struct InboundStreams {
    pub control: mpsc::Receiver<Datagram>,
    pub push: mpsc::Receiver<Datagram>,
    pub pull: mpsc::Receiver<Datagram>,
}

/// Sending halves matching [`InboundStreams`].
#[derive(Debug, Clone)]
pub(crate) struct InboundSenders {
    control: mpsc::Sender<Datagram>,
    push: mpsc::Sender<Datagram>,
    pull: mpsc::Sender<Datagram>,
}

impl InboundSenders {
    pub(crate) fn channel(&self, channel: ChannelId) -> &mpsc::Sender<Datagram> {
        match channel {
            ChannelId::Control => &self.control,
            ChannelId::Push => &self.push,
            ChannelId::Pull => &self.pull,
        }
    }
}

/// Create a connected set of inbound senders and streams.
pub(crate) fn inbound_pair() -> (InboundSenders, InboundStreams) {
    let (control_tx, control) = mpsc::channel(INBOUND_CAPACITY);
    let (push_tx, push) = mpsc::channel(INBOUND_CAPACITY);
    let (pull_tx, pull) = mpsc::channel(INBOUND_CAPACITY);
    (
        InboundSenders {
            control: control_tx,
            push: push_tx,
            pull: pull_tx,
        },
        InboundStreams {
            control,
            push,
            pull,
        },
    )
}

/// Outbound side of a channel transport.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Broadcast a datagram on a channel.
    async fn send(&self, channel: ChannelId, datagram: Bytes) -> Result<(), TransportError>;

    /// Encode a message and broadcast it on the channel its kind travels on.
    async fn send_message(&self, message: &Message) -> Result<(), TransportError> {
        self.send(message.channel(), message.encode()).await
    }
}
