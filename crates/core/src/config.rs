//! Global tuning constants for replmgr.
//!
//! Scheduling intervals and retry budgets are defined here; per-node runtime
//! configuration (identity, conninfo, failover policy) comes from the config
//! file loaded by the daemon crate.

/// Seconds between monitoring ticks.
pub const MONITOR_INTERVAL_SECS: u64 = 3;

/// Reconnect attempts against a broken primary session before escalating.
pub const PRIMARY_RECONNECT_ATTEMPTS: u32 = 15;

/// Seconds slept between primary reconnect attempts.
///
/// 15 attempts at 20 s apart give the primary roughly five minutes to come
/// back before the failover policy is consulted.
pub const PRIMARY_RECONNECT_INTERVAL_SECS: u64 = 20;

/// Attempts to discover an operator-promoted primary under manual failover.
pub const REDISCOVERY_ATTEMPTS: u32 = 6;

/// Seconds slept between rediscovery attempts.
///
/// 6 attempts at 300 s apart give the operator roughly thirty minutes.
pub const REDISCOVERY_INTERVAL_SECS: u64 = 300;

/// Per-cluster schema name prefix; the cluster name is appended.
pub const SCHEMA_PREFIX: &str = "replmgr_";

/// Default path of the config file when `-f` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "./replmgr.conf";

/// Lowest supported server version (`server_version_num` form).
///
/// Standby introspection functions used by the monitor appear in 9.0.
pub const MIN_SERVER_VERSION_NUM: i64 = 90_000;
