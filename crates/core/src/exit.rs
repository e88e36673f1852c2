//! Process exit codes.
//!
//! The daemon is driven by service managers and operator scripts that branch
//! on these values, so they are stable and distinct.

/// Normal termination, including the primary-node no-op start.
pub const SUCCESS: i32 = 0;

/// Configuration missing, malformed, or inconsistent with the registry.
pub const ERR_BAD_CONFIG: i32 = 1;

/// A required database connection could not be (re)established.
pub const ERR_DB_CON: i32 = 2;

/// A query on the local node failed at a point the daemon cannot continue
/// from (e.g. reading the local replay location during an election).
pub const ERR_DB_QUERY: i32 = 3;

/// The cluster registry could not be read during an election.
pub const ERR_BAD_QUERY: i32 = 4;

/// The local node stopped being a standby; a fresh start is required.
pub const ERR_PROMOTED: i32 = 5;

/// An election was abandoned for lack of quorum; operator action required.
pub const ERR_FAILOVER_FAIL: i32 = 6;
