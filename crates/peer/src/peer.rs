//! User-facing peer operations and the inbound loop.

use std::{
    fs::{self, File},
    io::{self, BufReader, BufWriter},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use bytes::Bytes;
use cairn_net_codec::{Message, PutChunk};
use cairn_net_transport::{Datagram, InboundStreams, Transport};
use cairn_primitives::{
    ChunkKey, ChunkNo, FileId, PROTOCOL_VERSION, PeerId, ReplicationDegree, chunk_count,
};
use cairn_replication::{
    ReplicationError, ReplicationHandle, ReplicationOutcome, ReplicationService,
};
use cairn_storage::{ChunkStore, Ledger, Manifest, ManifestEntry};
use futures::{Stream, StreamExt, TryStreamExt, stream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{Chunker, Dispatcher, PeerConfig, PeerError, RestoreAssembler, dispatch::blocking};

/// Times a `DELETE` is broadcast; delivery is not guaranteed.
pub const DELETE_REPEAT: usize = 3;

/// Pause between repeated `DELETE` broadcasts.
const DELETE_INTERVAL: Duration = Duration::from_millis(100);

/// Chunks with an open ticket at once during a backup or restore.
const MAX_IN_FLIGHT: usize = 16;

/// Result of a successful backup.
#[derive(Debug, Clone)]
pub struct BackupReport {
    pub file_id: FileId,
    /// One outcome per chunk, in chunk order.
    pub chunks: Vec<ReplicationOutcome>,
}

/// Result of a successful restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    pub file_id: FileId,
    pub chunks: u64,
    pub bytes: u64,
}

/// A running peer.
///
/// Cheap to clone. The background tasks keep running as long as the inbound
/// streams are open.
#[derive(Clone)]
pub struct Peer {
    config: Arc<PeerConfig>,
    store: Arc<dyn ChunkStore>,
    ledger: Arc<Ledger>,
    manifest: Arc<Manifest>,
    transport: Arc<dyn Transport>,
    replication: ReplicationHandle,
}

impl Peer {
    /// Assemble a peer without starting anything.
    ///
    /// Both returned services must be spawned for the peer to function; see
    /// [`spawn`](Self::spawn).
    pub fn new(
        config: PeerConfig,
        store: Arc<dyn ChunkStore>,
        ledger: Arc<Ledger>,
        manifest: Arc<Manifest>,
        transport: Arc<dyn Transport>,
        inbound: InboundStreams,
    ) -> (Self, PeerService, ReplicationService) {
        let config = Arc::new(config);
        let (replication_service, replication) =
            ReplicationService::new(config.replication, transport.clone());
        let dispatcher = Dispatcher::new(
            config.clone(),
            store.clone(),
            ledger.clone(),
            replication.clone(),
            transport.clone(),
        );
        let peer = Self {
            config,
            store,
            ledger,
            manifest,
            transport,
            replication,
        };
        let service = PeerService {
            dispatcher,
            inbound,
        };
        (peer, service, replication_service)
    }

    /// Assemble a peer and spawn its services on the current runtime.
    pub fn spawn(
        config: PeerConfig,
        store: Arc<dyn ChunkStore>,
        ledger: Arc<Ledger>,
        manifest: Arc<Manifest>,
        transport: Arc<dyn Transport>,
        inbound: InboundStreams,
    ) -> Self {
        let (peer, service, replication) =
            Self::new(config, store, ledger, manifest, transport, inbound);
        tokio::spawn(replication.run());
        tokio::spawn(service.run());
        peer
    }

    pub fn local(&self) -> &PeerId {
        &self.config.local
    }

    pub fn store(&self) -> &Arc<dyn ChunkStore> {
        &self.store
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    pub fn manifest(&self) -> &Arc<Manifest> {
        &self.manifest
    }

    /// Back up a file with the given replication degree.
    ///
    /// Chunks are read from disk as tickets free up, so at most
    /// `MAX_IN_FLIGHT` chunk bodies are held at once.
    ///
    /// Fails with [`ReplicationError::ReplicationShortfall`] if any chunk ends
    /// under-replicated; the manifest entry is kept either way so the chunks
    /// that did replicate stay restorable.
    pub async fn backup(
        &self,
        path: &Path,
        desired: ReplicationDegree,
    ) -> Result<BackupReport, PeerError> {
        if desired == 0 {
            return Err(PeerError::InvalidDegree(desired));
        }

        let owned = path.to_path_buf();
        let (file_id, total_chunks, chunker) = tokio::task::spawn_blocking(move || {
            let file_id = FileId::for_path(&owned)?;
            let size = fs::metadata(&owned)?.len();
            let chunker = Chunker::open(&owned)?;
            Ok::<_, io::Error>((file_id, chunk_count(size), chunker))
        })
        .await
        .map_err(io::Error::other)??;

        info!(path = %path.display(), %file_id, chunks = total_chunks, desired, "Backing up file");

        let manifest = self.manifest.clone();
        let entry = ManifestEntry {
            file_id: file_id.clone(),
            path: path.to_path_buf(),
            total_chunks,
            desired,
        };
        blocking(move || manifest.record(entry)).await?;

        let mut outcomes: Vec<ReplicationOutcome> = read_chunks(chunker)
            .zip(stream::iter(0..))
            .map(|(body, chunk_no)| {
                let put = body.map(|body| PutChunk {
                    version: PROTOCOL_VERSION.to_string(),
                    sender: self.config.local.clone(),
                    key: ChunkKey::new(file_id.clone(), chunk_no),
                    desired,
                    body,
                });
                async move { Ok::<_, PeerError>(self.replication.backup_chunk(put?).await?) }
            })
            .buffer_unordered(MAX_IN_FLIGHT)
            .try_collect()
            .await?;
        outcomes.sort_by(|a, b| a.key.cmp(&b.key));

        if outcomes.len() as u64 != total_chunks {
            warn!(%file_id, expected = total_chunks, read = outcomes.len(), "File changed during backup");
            return Err(io::Error::other("file changed during backup").into());
        }

        let shortfalls: Vec<_> = outcomes
            .iter()
            .filter(|o| !o.is_satisfied())
            .cloned()
            .collect();
        if !shortfalls.is_empty() {
            warn!(%file_id, under_replicated = shortfalls.len(), "Backup incomplete");
            return Err(ReplicationError::ReplicationShortfall { shortfalls }.into());
        }

        info!(%file_id, "Backup complete");
        Ok(BackupReport {
            file_id,
            chunks: outcomes,
        })
    }

    /// Restore a backed-up file into `out`.
    ///
    /// Chunks are written to a sibling `.part` file that replaces `out` only
    /// once every chunk arrived.
    pub async fn restore(&self, file_id: &FileId, out: &Path) -> Result<RestoreReport, PeerError> {
        let entry = self
            .manifest
            .get(file_id)
            .ok_or_else(|| PeerError::UnknownFile(file_id.clone()))?;
        info!(%file_id, chunks = entry.total_chunks, out = %out.display(), "Restoring file");

        let part = part_path(out);
        let writer = {
            let part = part.clone();
            tokio::task::spawn_blocking(move || File::create(part).map(BufWriter::new))
                .await
                .map_err(io::Error::other)??
        };
        let mut assembler = RestoreAssembler::new(writer, entry.total_chunks);

        let keys = (0..entry.total_chunks).filter_map(|n| ChunkNo::try_from(n).ok());
        let mut replies = stream::iter(keys)
            .map(|chunk_no| {
                let key = ChunkKey::new(file_id.clone(), chunk_no);
                async move {
                    let body = self
                        .replication
                        .restore_chunk(self.config.local.clone(), key.clone())
                        .await;
                    (key, body)
                }
            })
            .buffer_unordered(MAX_IN_FLIGHT);

        while let Some((key, body)) = replies.next().await {
            let body = match body {
                Ok(Some(body)) => body,
                Ok(None) => return self.abandon(&part, PeerError::ChunkUnavailable(key)).await,
                Err(e) => return self.abandon(&part, e.into()).await,
            };
            let written = tokio::task::spawn_blocking(move || {
                let accepted = assembler.accept(key.chunk_no, body);
                (assembler, accepted)
            })
            .await;
            match written {
                Ok((returned, Ok(_))) => assembler = returned,
                Ok((_, Err(e))) => return self.abandon(&part, e.into()).await,
                Err(e) => return self.abandon(&part, io::Error::other(e).into()).await,
            }
        }

        if !assembler.is_complete() {
            let error = io::Error::other("restore ended with chunks missing");
            return self.abandon(&part, error.into()).await;
        }
        let bytes = assembler.written();
        let out = out.to_path_buf();
        tokio::task::spawn_blocking(move || {
            assembler.finish()?;
            fs::rename(&part, &out)
        })
        .await
        .map_err(io::Error::other)??;

        info!(%file_id, bytes, "Restore complete");
        Ok(RestoreReport {
            file_id: file_id.clone(),
            chunks: entry.total_chunks,
            bytes,
        })
    }

    async fn abandon<T>(&self, part: &Path, error: PeerError) -> Result<T, PeerError> {
        warn!(%error, "Restore failed");
        let part = part.to_path_buf();
        let _ = tokio::task::spawn_blocking(move || fs::remove_file(part)).await;
        Err(error)
    }

    /// Ask every peer to drop the chunks of a backed-up file.
    ///
    /// The file id comes from the manifest when the path was backed up from
    /// here, otherwise from the file's current metadata.
    pub async fn delete(&self, path: &Path) -> Result<FileId, PeerError> {
        let file_id = match self.manifest.find_by_path(path) {
            Some(entry) => entry.file_id,
            None => {
                let owned = path.to_path_buf();
                tokio::task::spawn_blocking(move || FileId::for_path(&owned))
                    .await
                    .map_err(io::Error::other)??
            }
        };

        let message = Message::delete(file_id.clone());
        for round in 0..DELETE_REPEAT {
            if round > 0 {
                tokio::time::sleep(DELETE_INTERVAL).await;
            }
            self.transport.send_message(&message).await?;
        }

        let manifest = self.manifest.clone();
        let id = file_id.clone();
        blocking(move || manifest.remove(&id)).await?;
        info!(path = %path.display(), %file_id, "Deleted file");
        Ok(file_id)
    }

    /// Evict a locally held chunk and tell the network it is gone.
    ///
    /// Returns `false` if the chunk was not held.
    pub async fn reclaim(&self, key: &ChunkKey) -> Result<bool, PeerError> {
        let store = self.store.clone();
        let ledger = self.ledger.clone();
        let owned = key.clone();
        let held = blocking(move || {
            let held = store.delete(&owned)?;
            let recorded = ledger.remove(&owned)?.is_some();
            Ok(held || recorded)
        })
        .await?;
        if !held {
            debug!(%key, "Chunk not held, nothing to reclaim");
            return Ok(false);
        }

        self.transport
            .send_message(&Message::removed(self.config.local.clone(), key.clone()))
            .await?;
        info!(%key, "Reclaimed chunk");
        Ok(true)
    }
}

/// Chunk bodies of a file, each read on a blocking task when polled.
fn read_chunks(chunker: Chunker<BufReader<File>>) -> impl Stream<Item = io::Result<Bytes>> {
    stream::unfold(Some(chunker), |state| async move {
        let mut chunker = state?;
        match tokio::task::spawn_blocking(move || (chunker.next(), chunker)).await {
            Ok((Some(body), chunker)) => Some((body, Some(chunker))),
            Ok((None, _)) => None,
            Err(e) => Some((Err(io::Error::other(e)), None)),
        }
    })
}

fn part_path(out: &Path) -> PathBuf {
    let mut name = out.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    out.with_file_name(name)
}

/// Reads the inbound channels and hands every datagram to the dispatcher.
pub struct PeerService {
    dispatcher: Dispatcher,
    inbound: InboundStreams,
}

impl PeerService {
    /// Run until every inbound stream is closed.
    ///
    /// Each datagram is handled on its own task. Handler errors are logged
    /// and never stop the loop.
    pub async fn run(self) {
        let InboundStreams {
            control,
            push,
            pull,
        } = self.inbound;
        let (mut control, mut push, mut pull) = (Some(control), Some(push), Some(pull));

        loop {
            let datagram = tokio::select! {
                Some(d) = recv(&mut control) => d,
                Some(d) = recv(&mut push) => d,
                Some(d) = recv(&mut pull) => d,
                else => break,
            };
            let dispatcher = self.dispatcher.clone();
            tokio::spawn(async move {
                let channel = datagram.channel;
                if let Err(error) = dispatcher.handle_datagram(datagram).await {
                    warn!(%channel, %error, "Failed to handle message");
                }
            });
        }
        debug!("Inbound channels closed, peer service shutting down");
    }
}

/// Receive from a stream, closing it for good once it ends.
async fn recv(stream: &mut Option<mpsc::Receiver<Datagram>>) -> Option<Datagram> {
    let rx = stream.as_mut()?;
    let datagram = rx.recv().await;
    if datagram.is_none() {
        *stream = None;
    }
    datagram
}
