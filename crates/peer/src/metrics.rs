//! Peer metrics.

use metrics::Counter;

/// Dispatcher metrics.
#[derive(Clone, Debug)]
pub(crate) struct PeerMetrics {
    /// Datagrams read from any channel
    pub(crate) datagrams_received_total: Counter,
    /// Datagrams dropped because they did not decode
    pub(crate) datagrams_dropped_total: Counter,
    /// Chunk bodies stored for other peers
    pub(crate) chunks_stored_total: Counter,
    /// Chunk bodies sent in answer to `GETCHUNK`
    pub(crate) chunks_served_total: Counter,
    /// Chunks pushed again after a holder left
    pub(crate) chunks_republished_total: Counter,
}

impl Default for PeerMetrics {
    fn default() -> Self {
        Self {
            datagrams_received_total: metrics::counter!("peer.datagrams.received_total"),
            datagrams_dropped_total: metrics::counter!("peer.datagrams.dropped_total"),
            chunks_stored_total: metrics::counter!("peer.chunks.stored_total"),
            chunks_served_total: metrics::counter!("peer.chunks.served_total"),
            chunks_republished_total: metrics::counter!("peer.chunks.republished_total"),
        }
    }
}
