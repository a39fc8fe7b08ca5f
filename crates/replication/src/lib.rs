//! Replication tickets for cairn peers.
//!
//! Every chunk pushed for backup is tracked by a [`BackupTicket`] until enough
//! distinct peers confirmed storing it, or until its retry budget is spent.
//! Restores are tracked the same way by a [`RestoreTicket`] that re-asks for a
//! chunk until a copy arrives.
//!
//! Both ticket kinds live inside one [`ReplicationService`] task, driven by a
//! single time-ordered deadline queue. Other tasks talk to it through a
//! cloneable [`ReplicationHandle`].

mod backoff;
mod config;
mod error;
mod metrics;
mod service;
mod ticket;

pub use backoff::Backoff;
pub use config::{DEFAULT_INITIAL_WINDOW, DEFAULT_MAX_ATTEMPTS, ReplicationConfig};
pub use error::ReplicationError;
pub use service::{ReplicationHandle, ReplicationService};
pub use ticket::{
    BackupTicket, ReplicationOutcome, ReplicationStatus, RestoreTicket, TicketState, WindowOutcome,
};
