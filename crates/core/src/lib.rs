//! # replmgr-core
//!
//! Core value types for the replmgr replication manager: the WAL-position
//! codec, node identity, and the samples exchanged by monitoring and
//! elections.
//!
//! This is the embeddable library crate with zero async dependencies — the
//! daemon's I/O lives in `replmgr-daemon`.

/// Global configuration constants: intervals, retry budgets, defaults.
pub mod config;
/// Process exit codes shared between the daemon and its supervising scripts.
pub mod exit;
/// Node identity and role types.
pub mod identity;
/// Write-ahead-log position codec (`HEX/HEX` ↔ byte offsets).
pub mod lsn;
/// Lag samples and election peer snapshots.
pub mod types;

pub use identity::{NodeId, NodeIdentity, NodeRole};
pub use lsn::{Lsn, LsnParseError};
pub use types::{LagSample, PeerSnapshot};
