//! UDP multicast transport.

use std::{
    io,
    net::{Ipv4Addr, SocketAddr, SocketAddrV4},
    sync::Arc,
};

use async_trait::async_trait;
use bytes::Bytes;
use cairn_net_codec::MAX_DATAGRAM_LEN;
use cairn_primitives::ChannelId;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::{net::UdpSocket, sync::mpsc};
use tracing::{debug, info, trace, warn};

use crate::{Datagram, InboundStreams, Transport, TransportError, inbound_pair};

/// Addresses of the three multicast groups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MulticastConfig {
    /// Control channel group.
    pub control: SocketAddrV4,
    /// Chunk-push channel group.
    pub push: SocketAddrV4,
    /// Chunk-pull channel group.
    pub pull: SocketAddrV4,
    /// Local interface to join the groups on.
    pub interface: Ipv4Addr,
    /// Multicast TTL for outgoing datagrams.
    pub ttl: u32,
}

impl MulticastConfig {
    /// Group address of a channel.
    pub fn group(&self, channel: ChannelId) -> SocketAddrV4 {
        match channel {
            ChannelId::Control => self.control,
            ChannelId::Push => self.push,
            ChannelId::Pull => self.pull,
        }
    }
}

/// Transport over three IPv4 multicast groups.
///
/// One socket per channel is bound to the group port and joined to the
/// group. Group sockets allow address reuse, so several peers on one host
/// can listen on the same groups; a receive task per socket forwards datagrams into the matching
/// inbound stream. Outgoing datagrams share a single unbound socket with
/// loopback enabled, so a peer hears its own announcements.
pub struct MulticastTransport {
    config: MulticastConfig,
    sender: UdpSocket,
}

impl MulticastTransport {
    /// Join the configured groups and start the receive loops.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn bind(
        config: MulticastConfig,
    ) -> Result<(Arc<Self>, InboundStreams), TransportError> {
        let (senders, streams) = inbound_pair();

        for channel in [ChannelId::Control, ChannelId::Push, ChannelId::Pull] {
            let group = config.group(channel);
            let socket = bind_shared(group.port())?;
            socket.join_multicast_v4(*group.ip(), config.interface)?;
            info!(%channel, %group, "Joined multicast group");
            tokio::spawn(receive_loop(
                channel,
                socket,
                senders.channel(channel).clone(),
            ));
        }

        let sender = UdpSocket::bind((config.interface, 0)).await?;
        sender.set_multicast_ttl_v4(config.ttl)?;
        sender.set_multicast_loop_v4(true)?;

        Ok((Arc::new(Self { config, sender }), streams))
    }
}

/// Bind a non-blocking UDP socket on `port` that other local sockets may
/// share.
fn bind_shared(port: u16) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))]
    socket.set_reuse_port(true)?;
    socket.set_nonblocking(true)?;
    let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port));
    socket.bind(&addr.into())?;
    UdpSocket::from_std(socket.into())
}

async fn receive_loop(channel: ChannelId, socket: UdpSocket, tx: mpsc::Sender<Datagram>) {
    let mut buf = vec![0u8; MAX_DATAGRAM_LEN];
    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, from)) => {
                let payload = Bytes::copy_from_slice(buf.get(..len).unwrap_or_default());
                if tx.send(Datagram { channel, payload }).await.is_err() {
                    debug!(%channel, "Inbound stream closed, stopping receive loop");
                    return;
                }
                trace!(%channel, %from, len, "Datagram received");
            }
            Err(e) => {
                warn!(%channel, %e, "Multicast receive failed");
            }
        }
    }
}

#[async_trait]
impl Transport for MulticastTransport {
    async fn send(&self, channel: ChannelId, datagram: Bytes) -> Result<(), TransportError> {
        self.sender
            .send_to(&datagram, self.config.group(channel))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_lookup() {
        let config = MulticastConfig {
            control: "224.0.0.1:8001".parse().unwrap(),
            push: "224.0.0.2:8002".parse().unwrap(),
            pull: "224.0.0.3:8003".parse().unwrap(),
            interface: Ipv4Addr::UNSPECIFIED,
            ttl: 1,
        };
        assert_eq!(config.group(ChannelId::Push).port(), 8002);
        assert_eq!(config.group(ChannelId::Pull).ip(), &Ipv4Addr::new(224, 0, 0, 3));
    }

    #[tokio::test]
    async fn test_group_ports_are_shared() {
        let first = bind_shared(0).unwrap();
        let port = first.local_addr().unwrap().port();
        let second = bind_shared(port).unwrap();
        assert_eq!(second.local_addr().unwrap().port(), port);
    }

    #[tokio::test]
    async fn test_two_peers_on_one_host() {
        let config = MulticastConfig {
            control: "239.255.42.1:47101".parse().unwrap(),
            push: "239.255.42.2:47102".parse().unwrap(),
            pull: "239.255.42.3:47103".parse().unwrap(),
            interface: Ipv4Addr::UNSPECIFIED,
            ttl: 0,
        };
        // Hosts without a multicast route cannot join at all.
        let Ok((_first, _first_in)) = MulticastTransport::bind(config.clone()).await else {
            return;
        };
        let (_second, _second_in) = MulticastTransport::bind(config).await.unwrap();
    }
}
