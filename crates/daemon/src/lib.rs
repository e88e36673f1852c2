//! replmgr-daemon — replication manager daemon.
//!
//! One instance runs alongside each database node: it measures replication
//! lag of the local standby, detects loss of the primary, and (when
//! configured) runs the distributed election that promotes the best
//! surviving standby. Core value types live in `replmgr-core`.

/// CLI arguments and config-file loading.
pub mod config;
/// Daemon orchestrator: startup identification, tick loop, shutdown.
pub mod daemon;
/// Cluster directory: registry tables and primary discovery.
pub mod directory;
/// Failover elector: quorum, candidate selection, promote/follow hand-off.
pub mod elector;
/// Error types and exit-code mapping.
pub mod error;
/// Prometheus metrics recording.
pub mod metrics;
/// Lag reporter: one tick of the monitoring loop.
pub mod monitor;
/// Database sessions: the `NodeSession` trait and its tokio-postgres
/// implementation.
pub mod session;
/// Primary supervisor: reconnect ladder and failover-mode escalation.
pub mod supervisor;
