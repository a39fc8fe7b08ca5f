//! Shared plumbing for the cairn binary.
//!
//! - [`args`] - clap argument groups
//! - [`config`] - the TOML node configuration and its CLI overrides
//! - [`dirs`] - data directory layout
//! - [`logging`] - tracing subscriber setup

pub mod args;
pub mod config;
pub mod constants;
pub mod dirs;
pub mod logging;
