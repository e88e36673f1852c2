//! Daemon error types.
//!
//! Two tiers: [`SessionError`] is a soft, per-query failure that is logged
//! and retried on the next tick; [`DaemonError`] terminates the process and
//! carries the exit code the service manager branches on.

use replmgr_core::exit;
use thiserror::Error;

/// A failure scoped to one session operation. Never fatal by itself.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("could not connect: {0}")]
    Connect(#[source] tokio_postgres::Error),
    #[error("session is not connected")]
    Disconnected,
    #[error("query failed: {0}")]
    Query(#[source] tokio_postgres::Error),
    #[error("unexpected result shape: {0}")]
    BadResult(String),
}

/// A condition the daemon cannot continue from.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("bad configuration: {0}")]
    BadConfig(String),
    #[error("database connection failed: {0}")]
    DbConnection(String),
    #[error("local query failed: {0}")]
    DbQuery(String),
    #[error("cluster registry query failed: {0}")]
    BadQuery(String),
    #[error("local node is no longer a standby")]
    Promoted,
    #[error("failover abandoned: {0}")]
    FailoverFail(String),
}

impl DaemonError {
    /// The process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            DaemonError::BadConfig(_) => exit::ERR_BAD_CONFIG,
            DaemonError::DbConnection(_) => exit::ERR_DB_CON,
            DaemonError::DbQuery(_) => exit::ERR_DB_QUERY,
            DaemonError::BadQuery(_) => exit::ERR_BAD_QUERY,
            DaemonError::Promoted => exit::ERR_PROMOTED,
            DaemonError::FailoverFail(_) => exit::ERR_FAILOVER_FAIL,
        }
    }
}

pub type DaemonResult<T> = Result<T, DaemonError>;
