//! Replication metrics.

use metrics::Counter;

/// Replication service metrics.
#[derive(Clone, Debug)]
pub(crate) struct ReplicationMetrics {
    /// Backup tickets opened
    pub(crate) backups_opened_total: Counter,
    /// Backup tickets that reached their desired degree
    pub(crate) backups_satisfied_total: Counter,
    /// Backup tickets that spent their retry budget
    pub(crate) backups_exhausted_total: Counter,
    /// Restore tickets opened
    pub(crate) restores_opened_total: Counter,
    /// Restore tickets that received their chunk
    pub(crate) restores_completed_total: Counter,
    /// Restore tickets that spent their retry budget
    pub(crate) restores_exhausted_total: Counter,
    /// Messages re-sent after a window closed
    pub(crate) retries_total: Counter,
    /// Confirmations or chunks matching no open ticket
    pub(crate) unknown_ticket_total: Counter,
}

impl Default for ReplicationMetrics {
    fn default() -> Self {
        Self {
            backups_opened_total: metrics::counter!("replication.backup.opened_total"),
            backups_satisfied_total: metrics::counter!("replication.backup.satisfied_total"),
            backups_exhausted_total: metrics::counter!("replication.backup.exhausted_total"),
            restores_opened_total: metrics::counter!("replication.restore.opened_total"),
            restores_completed_total: metrics::counter!("replication.restore.completed_total"),
            restores_exhausted_total: metrics::counter!("replication.restore.exhausted_total"),
            retries_total: metrics::counter!("replication.retries_total"),
            unknown_ticket_total: metrics::counter!("replication.unknown_ticket_total"),
        }
    }
}
