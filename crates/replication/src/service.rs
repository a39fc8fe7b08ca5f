//! Replication service task.
//!
//! The [`ReplicationService`] exclusively owns every open ticket. New tickets,
//! confirmations, received chunks and window expiries are all handled by its
//! single task, so a confirmation either lands before the window it belongs
//! to closes or finds no ticket at all.

use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};

use bytes::Bytes;
use cairn_net_codec::{Message, PutChunk};
use cairn_net_transport::Transport;
use cairn_primitives::{ChannelId, ChunkKey, PeerId};
use tokio::{
    sync::{mpsc, oneshot},
    time::{Instant, sleep_until},
};
use tracing::{debug, info, trace, warn};

use crate::{
    BackupTicket, ReplicationConfig, ReplicationError, ReplicationOutcome, ReplicationStatus,
    RestoreTicket, WindowOutcome, metrics::ReplicationMetrics,
};

/// Commands handled back to back before due windows are closed regardless.
const MAX_COMMAND_BURST: usize = 64;

type BackupReply = oneshot::Sender<Result<ReplicationOutcome, ReplicationError>>;
type RestoreReply = oneshot::Sender<Result<Option<Bytes>, ReplicationError>>;

/// Commands accepted by the service task.
enum Command {
    Backup { put: PutChunk, reply: BackupReply },
    Confirm { key: ChunkKey, peer: PeerId },
    Restore { sender: PeerId, key: ChunkKey, reply: RestoreReply },
    ChunkReceived { key: ChunkKey, body: Bytes },
}

/// Identity of an open ticket in the deadline queue.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum TicketId {
    Backup(ChunkKey),
    Restore(ChunkKey),
}

struct OpenBackup {
    ticket: BackupTicket,
    deadline: Instant,
    reply: BackupReply,
}

struct OpenRestore {
    ticket: RestoreTicket,
    deadline: Instant,
    reply: RestoreReply,
}

/// Handle for opening tickets and feeding them protocol events.
#[derive(Clone)]
pub struct ReplicationHandle {
    command_tx: mpsc::UnboundedSender<Command>,
}

impl ReplicationHandle {
    fn send_command(&self, command: Command) -> Result<(), ReplicationError> {
        self.command_tx
            .send(command)
            .map_err(|_| ReplicationError::ServiceStopped)
    }

    /// Push a chunk and wait until its ticket is satisfied or exhausted.
    ///
    /// An exhausted ticket is still `Ok`; callers inspect
    /// [`ReplicationOutcome::status`].
    pub async fn backup_chunk(
        &self,
        put: PutChunk,
    ) -> Result<ReplicationOutcome, ReplicationError> {
        let (reply, rx) = oneshot::channel();
        self.send_command(Command::Backup { put, reply })?;
        rx.await.map_err(|_| ReplicationError::ServiceStopped)?
    }

    /// Feed a `STORED` confirmation. Unknown chunks are ignored.
    pub fn confirm(&self, key: ChunkKey, peer: PeerId) {
        if self.send_command(Command::Confirm { key, peer }).is_err() {
            trace!("Replication service stopped, confirmation dropped");
        }
    }

    /// Ask the network for a chunk until one copy arrives.
    ///
    /// Returns `None` once the retry budget is spent without an answer.
    pub async fn restore_chunk(
        &self,
        sender: PeerId,
        key: ChunkKey,
    ) -> Result<Option<Bytes>, ReplicationError> {
        let (reply, rx) = oneshot::channel();
        self.send_command(Command::Restore { sender, key, reply })?;
        rx.await.map_err(|_| ReplicationError::ServiceStopped)?
    }

    /// Feed a received `CHUNK`. Chunks nobody asked for are ignored.
    pub fn chunk_received(&self, key: ChunkKey, body: Bytes) {
        if self.send_command(Command::ChunkReceived { key, body }).is_err() {
            trace!("Replication service stopped, chunk dropped");
        }
    }
}

/// Owner of all open backup and restore tickets.
pub struct ReplicationService {
    config: ReplicationConfig,
    transport: Arc<dyn Transport>,
    command_rx: mpsc::UnboundedReceiver<Command>,
    backups: HashMap<ChunkKey, OpenBackup>,
    restores: HashMap<ChunkKey, OpenRestore>,
    deadlines: BTreeSet<(Instant, TicketId)>,
    metrics: ReplicationMetrics,
}

impl ReplicationService {
    /// Create the service and a handle to it.
    ///
    /// The service does nothing until [`run`](Self::run) is spawned. It stops
    /// once every handle is dropped.
    pub fn new(
        config: ReplicationConfig,
        transport: Arc<dyn Transport>,
    ) -> (Self, ReplicationHandle) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let service = Self {
            config,
            transport,
            command_rx,
            backups: HashMap::new(),
            restores: HashMap::new(),
            deadlines: BTreeSet::new(),
            metrics: ReplicationMetrics::default(),
        };
        (service, ReplicationHandle { command_tx })
    }

    /// Run the ticket loop.
    pub async fn run(mut self) {
        let mut burst = 0;
        loop {
            if burst >= MAX_COMMAND_BURST {
                burst = 0;
                self.expire_due().await;
            }

            let next_deadline = self.deadlines.first().map(|(at, _)| *at);
            let expiry = async move {
                match next_deadline {
                    Some(at) => sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                // Commands already queued are handled before a due window
                // closes, so a confirmation that arrived in time is counted.
                biased;

                command = self.command_rx.recv() => match command {
                    Some(command) => {
                        burst += 1;
                        self.handle_command(command).await;
                    }
                    None => break,
                },
                () = expiry => {
                    burst = 0;
                    self.expire_due().await;
                }
            }
        }
        debug!(
            open_backups = self.backups.len(),
            open_restores = self.restores.len(),
            "Replication service shutting down"
        );
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Backup { put, reply } => self.open_backup(put, reply).await,
            Command::Confirm { key, peer } => self.confirm(key, peer),
            Command::Restore { sender, key, reply } => {
                self.open_restore(sender, key, reply).await
            }
            Command::ChunkReceived { key, body } => self.complete_restore(key, body),
        }
    }

    async fn open_backup(&mut self, put: PutChunk, reply: BackupReply) {
        let key = put.key.clone();
        if self.backups.contains_key(&key) {
            let _ = reply.send(Err(ReplicationError::TicketExists(key)));
            return;
        }

        let desired = put.desired;
        let payload = Message::PutChunk(put).encode();
        let mut ticket = BackupTicket::new(key.clone(), desired, payload, &self.config);
        let deadline = Instant::now() + ticket.window();

        self.send(ChannelId::Push, ticket.payload().clone()).await;
        ticket.armed();
        self.deadlines.insert((deadline, TicketId::Backup(key.clone())));
        self.metrics.backups_opened_total.increment(1);
        debug!(%key, desired, window_ms = ticket.window().as_millis(), "Backup ticket opened");

        self.backups.insert(
            key,
            OpenBackup {
                ticket,
                deadline,
                reply,
            },
        );
    }

    fn confirm(&mut self, key: ChunkKey, peer: PeerId) {
        match self.backups.get_mut(&key) {
            Some(open) => {
                if open.ticket.record_saver(peer.clone()) {
                    debug!(%key, %peer, actual = open.ticket.actual(), "Chunk confirmed");
                }
            }
            None => {
                self.metrics.unknown_ticket_total.increment(1);
                trace!(%key, %peer, "Confirmation for unknown ticket");
            }
        }
    }

    async fn open_restore(&mut self, sender: PeerId, key: ChunkKey, reply: RestoreReply) {
        if self.restores.contains_key(&key) {
            let _ = reply.send(Err(ReplicationError::TicketExists(key)));
            return;
        }

        let payload = Message::get_chunk(sender, key.clone()).encode();
        let ticket = RestoreTicket::new(key.clone(), payload, &self.config);
        let deadline = Instant::now() + ticket.window();

        self.send(ChannelId::Control, ticket.payload().clone()).await;
        self.deadlines.insert((deadline, TicketId::Restore(key.clone())));
        self.metrics.restores_opened_total.increment(1);
        debug!(%key, "Restore ticket opened");

        self.restores.insert(
            key,
            OpenRestore {
                ticket,
                deadline,
                reply,
            },
        );
    }

    fn complete_restore(&mut self, key: ChunkKey, body: Bytes) {
        let Some(open) = self.restores.remove(&key) else {
            self.metrics.unknown_ticket_total.increment(1);
            trace!(%key, "Chunk for unknown ticket");
            return;
        };
        self.deadlines
            .remove(&(open.deadline, TicketId::Restore(key.clone())));
        self.metrics.restores_completed_total.increment(1);
        debug!(%key, len = body.len(), sends = open.ticket.sends(), "Chunk restored");
        let _ = open.reply.send(Ok(Some(body)));
    }

    /// Close every window whose deadline has passed.
    async fn expire_due(&mut self) {
        let now = Instant::now();
        while let Some((at, id)) = self.deadlines.first().cloned() {
            if at > now {
                break;
            }
            self.deadlines.remove(&(at, id.clone()));
            match id {
                TicketId::Backup(key) => self.close_backup_window(key, now).await,
                TicketId::Restore(key) => self.close_restore_window(key, now).await,
            }
        }
    }

    async fn close_backup_window(&mut self, key: ChunkKey, now: Instant) {
        let Some(mut open) = self.backups.remove(&key) else {
            return;
        };
        if open.reply.is_closed() {
            trace!(%key, "Backup abandoned by caller, dropping ticket");
            return;
        }

        match open.ticket.on_window_closed() {
            WindowOutcome::Retry(window) => {
                debug!(
                    %key,
                    attempt = open.ticket.attempt(),
                    actual = open.ticket.actual(),
                    window_ms = window.as_millis(),
                    "Confirmation window closed short, pushing again"
                );
                self.metrics.retries_total.increment(1);
                self.send(ChannelId::Push, open.ticket.payload().clone()).await;
                open.ticket.armed();
                open.deadline = now + window;
                self.deadlines
                    .insert((open.deadline, TicketId::Backup(key.clone())));
                self.backups.insert(key, open);
            }
            WindowOutcome::Satisfied => {
                let outcome = open.ticket.outcome(ReplicationStatus::Satisfied);
                info!(%key, actual = outcome.actual, sends = outcome.sends, "Chunk replicated");
                self.metrics.backups_satisfied_total.increment(1);
                let _ = open.reply.send(Ok(outcome));
            }
            WindowOutcome::Exhausted => {
                let outcome = open.ticket.outcome(ReplicationStatus::Exhausted);
                warn!(
                    %key,
                    desired = outcome.desired,
                    actual = outcome.actual,
                    sends = outcome.sends,
                    "Chunk under-replicated after retries"
                );
                self.metrics.backups_exhausted_total.increment(1);
                let _ = open.reply.send(Ok(outcome));
            }
        }
    }

    async fn close_restore_window(&mut self, key: ChunkKey, now: Instant) {
        let Some(mut open) = self.restores.remove(&key) else {
            return;
        };
        if open.reply.is_closed() {
            trace!(%key, "Restore abandoned by caller, dropping ticket");
            return;
        }

        match open.ticket.on_window_closed() {
            WindowOutcome::Retry(window) => {
                debug!(%key, sends = open.ticket.sends(), window_ms = window.as_millis(), "Asking again for chunk");
                self.metrics.retries_total.increment(1);
                self.send(ChannelId::Control, open.ticket.payload().clone()).await;
                open.deadline = now + window;
                self.deadlines
                    .insert((open.deadline, TicketId::Restore(key.clone())));
                self.restores.insert(key, open);
            }
            WindowOutcome::Satisfied | WindowOutcome::Exhausted => {
                warn!(%key, sends = open.ticket.sends(), "No peer answered for chunk");
                self.metrics.restores_exhausted_total.increment(1);
                let _ = open.reply.send(Ok(None));
            }
        }
    }

    async fn send(&self, channel: ChannelId, payload: Bytes) {
        if let Err(error) = self.transport.send(channel, payload).await {
            warn!(%channel, %error, "Failed to send datagram");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use cairn_net_transport::{MemoryHub, MemoryTransport};
    use cairn_primitives::FileId;
    use tokio::time::sleep;

    use super::*;

    fn key(n: u32) -> ChunkKey {
        ChunkKey::new(FileId::from_digest([3; 32]), n)
    }

    fn peer(id: &str) -> PeerId {
        PeerId::new(id).unwrap()
    }

    fn put(n: u32, desired: u8) -> PutChunk {
        PutChunk {
            version: cairn_primitives::PROTOCOL_VERSION.to_string(),
            sender: peer("owner"),
            key: key(n),
            desired,
            body: Bytes::from_static(b"body"),
        }
    }

    fn spawn_service() -> (ReplicationHandle, MemoryHub) {
        spawn_service_with(ReplicationConfig::default())
    }

    fn spawn_service_with(config: ReplicationConfig) -> (ReplicationHandle, MemoryHub) {
        let hub = MemoryHub::new();
        let (transport, _inbound): (MemoryTransport, _) = hub.attach();
        let (service, handle) = ReplicationService::new(config, Arc::new(transport));
        tokio::spawn(service.run());
        (handle, hub)
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_savers_satisfy_degree_two() {
        let (handle, hub) = spawn_service();

        let backup = tokio::spawn({
            let handle = handle.clone();
            async move { handle.backup_chunk(put(0, 2)).await }
        });
        sleep(Duration::from_millis(50)).await;
        handle.confirm(key(0), peer("a"));
        handle.confirm(key(0), peer("a"));
        handle.confirm(key(0), peer("b"));

        let outcome = backup.await.unwrap().unwrap();
        assert_eq!(outcome.status, ReplicationStatus::Satisfied);
        assert_eq!(outcome.actual, 2);
        assert_eq!(outcome.sends, 1);
        assert_eq!(hub.sent_on(ChannelId::Push).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_saver_exhausts_after_five_pushes() {
        let (handle, hub) = spawn_service();
        let start = Instant::now();

        let backup = tokio::spawn({
            let handle = handle.clone();
            async move { handle.backup_chunk(put(0, 2)).await }
        });
        sleep(Duration::from_millis(50)).await;
        handle.confirm(key(0), peer("a"));

        let outcome = backup.await.unwrap().unwrap();
        assert_eq!(outcome.status, ReplicationStatus::Exhausted);
        assert_eq!(outcome.actual, 1);
        assert_eq!(outcome.sends, 5);

        let pushes = hub.sent_on(ChannelId::Push);
        assert_eq!(pushes.len(), 5);
        assert!(pushes.iter().all(|p| p == &pushes[0]));

        // 1 + 2 + 4 + 8 + 16 seconds of windows.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(31));
        assert!(elapsed < Duration::from_secs(32));
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirmation_in_retry_window_counts() {
        let (handle, hub) = spawn_service();

        let backup = tokio::spawn({
            let handle = handle.clone();
            async move { handle.backup_chunk(put(0, 2)).await }
        });
        sleep(Duration::from_millis(100)).await;
        handle.confirm(key(0), peer("a"));
        sleep(Duration::from_millis(1400)).await;
        assert_eq!(hub.sent_on(ChannelId::Push).len(), 2);
        handle.confirm(key(0), peer("b"));

        let outcome = backup.await.unwrap().unwrap();
        assert!(outcome.is_satisfied());
        assert_eq!(outcome.sends, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirmation_at_window_close() {
        let config = ReplicationConfig::default().with_max_attempts(0);
        let window = config.initial_window;
        let (handle, hub) = spawn_service_with(config);

        let backup = tokio::spawn({
            let handle = handle.clone();
            async move { handle.backup_chunk(put(0, 1)).await }
        });
        sleep(window).await;
        handle.confirm(key(0), peer("a"));

        // Either the confirmation made it into the window or it found no
        // ticket; it is never lost from a reported success.
        let outcome = backup.await.unwrap().unwrap();
        match outcome.status {
            ReplicationStatus::Satisfied => assert_eq!(outcome.actual, 1),
            ReplicationStatus::Exhausted => assert_eq!(outcome.actual, 0),
        }
        assert_eq!(outcome.sends, 1);
        assert_eq!(hub.sent_on(ChannelId::Push).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_commands_do_not_hold_window_open() {
        let config = ReplicationConfig::default().with_max_attempts(0);
        let window = config.initial_window;
        let (handle, _hub) = spawn_service_with(config);

        let backup = tokio::spawn({
            let handle = handle.clone();
            async move { handle.backup_chunk(put(0, 1)).await }
        });
        sleep(Duration::from_millis(10)).await;

        // The window runs out behind a long queue of unrelated commands with
        // the matching confirmation at its very end.
        for n in 0..1_000u32 {
            handle.confirm(key(1), PeerId::new(format!("p{n}")).unwrap());
        }
        handle.confirm(key(0), peer("late"));
        tokio::time::advance(window).await;

        let outcome = backup.await.unwrap().unwrap();
        assert_eq!(outcome.status, ReplicationStatus::Exhausted);
        assert_eq!(outcome.actual, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_restore_stops_asking() {
        let (handle, hub) = spawn_service();
        let restore = tokio::spawn({
            let handle = handle.clone();
            async move { handle.restore_chunk(peer("me"), key(4)).await }
        });
        sleep(Duration::from_millis(10)).await;
        restore.abort();

        sleep(Duration::from_secs(60)).await;
        assert_eq!(hub.sent_on(ChannelId::Control).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_ticket_rejected() {
        let (handle, _hub) = spawn_service();

        let first = tokio::spawn({
            let handle = handle.clone();
            async move { handle.backup_chunk(put(0, 1)).await }
        });
        sleep(Duration::from_millis(10)).await;

        let second = handle.backup_chunk(put(0, 1)).await;
        assert!(matches!(second, Err(ReplicationError::TicketExists(k)) if k == key(0)));

        handle.confirm(key(0), peer("a"));
        assert!(first.await.unwrap().unwrap().is_satisfied());
    }

    #[tokio::test(start_paused = true)]
    async fn test_independent_tickets() {
        let (handle, hub) = spawn_service();

        let tickets: Vec<_> = (0..3)
            .map(|n| {
                let handle = handle.clone();
                tokio::spawn(async move { handle.backup_chunk(put(n, 1)).await })
            })
            .collect();
        sleep(Duration::from_millis(10)).await;
        handle.confirm(key(1), peer("a"));

        let mut outcomes = Vec::new();
        for ticket in tickets {
            outcomes.push(ticket.await.unwrap().unwrap());
        }
        assert!(!outcomes[0].is_satisfied());
        assert!(outcomes[1].is_satisfied());
        assert!(!outcomes[2].is_satisfied());
        assert_eq!(hub.sent_on(ChannelId::Push).len(), 1 + 5 + 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restore_completes_on_first_chunk() {
        let (handle, hub) = spawn_service();

        let restore = tokio::spawn({
            let handle = handle.clone();
            async move { handle.restore_chunk(peer("me"), key(4)).await }
        });
        sleep(Duration::from_millis(2500)).await;
        handle.chunk_received(key(4), Bytes::from_static(b"data"));
        handle.chunk_received(key(4), Bytes::from_static(b"late"));

        let body = restore.await.unwrap().unwrap();
        assert_eq!(body, Some(Bytes::from_static(b"data")));
        // Initial ask plus one retry after the first window.
        assert_eq!(hub.sent_on(ChannelId::Control).len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restore_gives_up() {
        let (handle, hub) = spawn_service();
        let body = handle.restore_chunk(peer("me"), key(4)).await.unwrap();
        assert_eq!(body, None);
        assert_eq!(hub.sent_on(ChannelId::Control).len(), 5);
    }

    #[tokio::test]
    async fn test_stopped_service() {
        let hub = MemoryHub::new();
        let (transport, _inbound) = hub.attach();
        let (service, handle) =
            ReplicationService::new(ReplicationConfig::default(), Arc::new(transport));
        drop(service);

        let result = handle.backup_chunk(put(0, 1)).await;
        assert!(matches!(result, Err(ReplicationError::ServiceStopped)));
        handle.confirm(key(0), peer("a"));
    }
}
