//! Handling of inbound protocol messages.

use std::sync::Arc;

use cairn_net_codec::{Chunk, Delete, GetChunk, Message, PutChunk, Removed, Stored};
use cairn_net_transport::{Datagram, Transport};
use cairn_replication::ReplicationHandle;
use cairn_storage::{ChunkStore, Ledger, LedgerEntry, StorageError, StorageResult};
use tokio::time::sleep;
use tracing::{debug, info, trace};

use crate::{PeerConfig, PeerError, metrics::PeerMetrics};

/// Reacts to every message a peer receives.
///
/// Cheap to clone; each inbound datagram is handled on its own task with its
/// own clone.
#[derive(Clone)]
pub struct Dispatcher {
    config: Arc<PeerConfig>,
    store: Arc<dyn ChunkStore>,
    ledger: Arc<Ledger>,
    replication: ReplicationHandle,
    transport: Arc<dyn Transport>,
    metrics: PeerMetrics,
}

impl Dispatcher {
    pub fn new(
        config: Arc<PeerConfig>,
        store: Arc<dyn ChunkStore>,
        ledger: Arc<Ledger>,
        replication: ReplicationHandle,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            config,
            store,
            ledger,
            replication,
            transport,
            metrics: PeerMetrics::default(),
        }
    }

    /// Decode and handle one datagram. Malformed datagrams are dropped.
    pub async fn handle_datagram(&self, datagram: Datagram) -> Result<(), PeerError> {
        self.metrics.datagrams_received_total.increment(1);
        match Message::decode(&datagram.payload) {
            Ok(message) => self.handle(message).await,
            Err(error) => {
                self.metrics.datagrams_dropped_total.increment(1);
                trace!(channel = %datagram.channel, %error, "Dropping malformed datagram");
                Ok(())
            }
        }
    }

    /// Handle one decoded message.
    pub async fn handle(&self, message: Message) -> Result<(), PeerError> {
        match message {
            Message::PutChunk(put) => self.on_put_chunk(put).await,
            Message::Stored(stored) => self.on_stored(stored).await,
            Message::GetChunk(get) => self.on_get_chunk(get).await,
            Message::Chunk(chunk) => {
                self.on_chunk(chunk);
                Ok(())
            }
            Message::Delete(delete) => self.on_delete(delete).await,
            Message::Removed(removed) => self.on_removed(removed).await,
        }
    }

    /// Store a chunk pushed by another peer and confirm it.
    async fn on_put_chunk(&self, put: PutChunk) -> Result<(), PeerError> {
        let local = self.config.local.clone();
        if put.sender == local {
            return Ok(());
        }

        let key = put.key.clone();
        let store = self.store.clone();
        let ledger = self.ledger.clone();
        let entry = LedgerEntry::new(put.sender.clone(), key.clone(), put.desired, local.clone());
        let body = put.body;
        let stored = blocking(move || {
            let stored = store.put(&entry.key, &body)?;
            ledger.record_stored(entry)?;
            Ok(stored)
        })
        .await?;
        if stored {
            self.metrics.chunks_stored_total.increment(1);
            debug!(%key, owner = %put.sender, desired = put.desired, "Stored chunk");
        }

        sleep(self.config.jitter()).await;
        self.transport
            .send_message(&Message::stored(local, key))
            .await?;
        Ok(())
    }

    /// Count a confirmation, both for our own backups and for chunks we hold.
    async fn on_stored(&self, stored: Stored) -> Result<(), PeerError> {
        let Stored { key, sender, .. } = stored;
        self.replication.confirm(key.clone(), sender.clone());

        let ledger = self.ledger.clone();
        let (k, s) = (key.clone(), sender.clone());
        if blocking(move || ledger.record_holder(&k, &s)).await? {
            trace!(%key, %sender, "Holder recorded");
        }
        Ok(())
    }

    /// Serve a chunk we hold.
    async fn on_get_chunk(&self, get: GetChunk) -> Result<(), PeerError> {
        let store = self.store.clone();
        let key = get.key.clone();
        let Some(body) = blocking(move || store.get(&key)).await? else {
            return Ok(());
        };

        sleep(self.config.jitter()).await;
        debug!(key = %get.key, requester = %get.sender, len = body.len(), "Serving chunk");
        self.transport
            .send_message(&Message::chunk(get.key, body))
            .await?;
        self.metrics.chunks_served_total.increment(1);
        Ok(())
    }

    fn on_chunk(&self, chunk: Chunk) {
        self.replication.chunk_received(chunk.key, chunk.body);
    }

    /// Drop every chunk of a deleted file.
    async fn on_delete(&self, delete: Delete) -> Result<(), PeerError> {
        let store = self.store.clone();
        let ledger = self.ledger.clone();
        let file_id = delete.file_id.clone();
        let (bodies, entries) = blocking(move || {
            let bodies = store.delete_file(&file_id)?;
            let entries = ledger.remove_by_file(&file_id)?;
            Ok((bodies.len(), entries.len()))
        })
        .await?;
        if bodies > 0 || entries > 0 {
            info!(file_id = %delete.file_id, chunks = bodies, "Deleted file chunks");
        }
        Ok(())
    }

    /// Account for a peer dropping a chunk, re-publishing it if that leaves it
    /// under-replicated.
    async fn on_removed(&self, removed: Removed) -> Result<(), PeerError> {
        let store = self.store.clone();
        let ledger = self.ledger.clone();
        let key = removed.key.clone();
        let sender = removed.sender.clone();
        let republish = blocking(move || {
            let Some(entry) = ledger.decrement_actual(&key, &sender)? else {
                return Ok(None);
            };
            Ok(store.get(&key)?.map(|body| (entry, body)))
        })
        .await?;
        let Some((entry, body)) = republish else {
            return Ok(());
        };

        sleep(self.config.jitter()).await;
        debug!(
            key = %entry.key,
            owner = %entry.owner,
            desired = entry.desired,
            actual = entry.actual,
            "Re-publishing under-replicated chunk"
        );
        let message = Message::put_chunk(entry.owner, entry.key, entry.desired, body);
        self.transport.send_message(&message).await?;
        self.metrics.chunks_republished_total.increment(1);
        Ok(())
    }
}

/// Run blocking storage work off the async threads.
pub(crate) async fn blocking<F, R>(f: F) -> Result<R, PeerError>
where
    F: FnOnce() -> StorageResult<R> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StorageError::Io(std::io::Error::other(e)))?
        .map_err(PeerError::from)
}
