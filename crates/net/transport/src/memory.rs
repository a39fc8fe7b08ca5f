//! In-process broadcast hub.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use cairn_primitives::ChannelId;
use parking_lot::Mutex;
use tokio::sync::mpsc::error::TrySendError;
use tracing::trace;

use crate::{Datagram, InboundSenders, InboundStreams, Transport, TransportError, inbound_pair};

#[derive(Default)]
struct HubInner {
    endpoints: Vec<InboundSenders>,
    sent: Vec<Datagram>,
}

/// Fan-out hub standing in for the three multicast groups.
///
/// Every datagram sent by any attached endpoint is delivered to every
/// attached endpoint, the sender included, mirroring multicast loopback.
/// Endpoints whose streams were dropped are pruned on the next send.
#[derive(Clone, Default)]
pub struct MemoryHub {
    inner: Arc<Mutex<HubInner>>,
}

impl MemoryHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new endpoint.
    pub fn attach(&self) -> (MemoryTransport, InboundStreams) {
        let (senders, streams) = inbound_pair();
        self.inner.lock().endpoints.push(senders);
        (MemoryTransport { hub: self.clone() }, streams)
    }

    /// Every datagram sent through the hub so far, in send order.
    pub fn sent(&self) -> Vec<Datagram> {
        self.inner.lock().sent.clone()
    }

    /// Datagrams sent on one channel, in send order.
    pub fn sent_on(&self, channel: ChannelId) -> Vec<Bytes> {
        self.inner
            .lock()
            .sent
            .iter()
            .filter(|d| d.channel == channel)
            .map(|d| d.payload.clone())
            .collect()
    }

    /// Number of attached endpoints still listening.
    pub fn endpoint_count(&self) -> usize {
        self.inner.lock().endpoints.len()
    }

    fn broadcast(&self, datagram: Datagram) {
        let mut inner = self.inner.lock();
        inner.endpoints.retain(|endpoint| {
            match endpoint.channel(datagram.channel).try_send(datagram.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    trace!(channel = %datagram.channel, "Inbound stream full, dropping datagram");
                    true
                }
                Err(TrySendError::Closed(_)) => false,
            }
        });
        inner.sent.push(datagram);
    }
}

/// Endpoint handle returned by [`MemoryHub::attach`].
#[derive(Clone)]
pub struct MemoryTransport {
    hub: MemoryHub,
}

impl MemoryTransport {
    /// The hub this endpoint is attached to.
    pub fn hub(&self) -> &MemoryHub {
        &self.hub
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, channel: ChannelId, payload: Bytes) -> Result<(), TransportError> {
        self.hub.broadcast(Datagram { channel, payload });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fan_out_includes_sender() {
        let hub = MemoryHub::new();
        let (a, mut a_in) = hub.attach();
        let (_b, mut b_in) = hub.attach();

        a.send(ChannelId::Push, Bytes::from_static(b"hello"))
            .await
            .unwrap();

        let got_a = a_in.push.recv().await.unwrap();
        let got_b = b_in.push.recv().await.unwrap();
        assert_eq!(got_a.payload, Bytes::from_static(b"hello"));
        assert_eq!(got_b, got_a);
        assert!(a_in.control.try_recv().is_err());
        assert_eq!(hub.sent_on(ChannelId::Push).len(), 1);
        assert!(hub.sent_on(ChannelId::Control).is_empty());
    }

    #[tokio::test]
    async fn test_dropped_endpoint_is_pruned() {
        let hub = MemoryHub::new();
        let (a, _a_in) = hub.attach();
        let (_b, b_in) = hub.attach();
        drop(b_in);

        a.send(ChannelId::Control, Bytes::from_static(b"x"))
            .await
            .unwrap();
        assert_eq!(hub.endpoint_count(), 1);
    }
}
