//! Primary supervisor: owns the primary session and the reconnect ladder.
//!
//! When the primary session breaks, the supervisor first gives the primary a
//! bounded window to come back (reset-and-retry), then branches on the
//! failover policy: manual mode waits for an operator-promoted primary to
//! appear in the registry; automatic mode hands control to the elector.

use crate::directory::ClusterDirectory;
use crate::error::{DaemonError, DaemonResult};
use crate::metrics;
use crate::session::{Connector, NodeSession, SessionStatus};
use replmgr_core::config;
use replmgr_core::NodeId;
use std::time::Duration;

/// Failover policy, from the `failover` config key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailoverMode {
    Manual,
    Automatic,
}

/// A bounded retry schedule.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl RetryPolicy {
    /// Primary reconnect ladder: roughly five minutes.
    pub fn reconnect() -> Self {
        Self {
            attempts: config::PRIMARY_RECONNECT_ATTEMPTS,
            interval: Duration::from_secs(config::PRIMARY_RECONNECT_INTERVAL_SECS),
        }
    }

    /// Manual-failover rediscovery ladder: roughly thirty minutes.
    pub fn rediscovery() -> Self {
        Self {
            attempts: config::REDISCOVERY_ATTEMPTS,
            interval: Duration::from_secs(config::REDISCOVERY_INTERVAL_SECS),
        }
    }
}

/// The daemon's one binding to the current primary.
pub struct PrimaryBinding {
    pub session: Box<dyn NodeSession>,
    pub node_id: NodeId,
}

/// What `ensure_primary` concluded for this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// The binding is usable (possibly after reconnecting).
    Healthy,
    /// A different primary was discovered and adopted.
    Rebound,
    /// The primary is gone and policy allows an election.
    ElectionRequired,
}

pub struct PrimarySupervisor {
    reconnect: RetryPolicy,
    rediscovery: RetryPolicy,
}

impl PrimarySupervisor {
    pub fn new() -> Self {
        Self {
            reconnect: RetryPolicy::reconnect(),
            rediscovery: RetryPolicy::rediscovery(),
        }
    }

    /// Override the retry schedules (tests shrink the intervals).
    pub fn with_policies(reconnect: RetryPolicy, rediscovery: RetryPolicy) -> Self {
        Self {
            reconnect,
            rediscovery,
        }
    }

    /// Verify primary liveness at the start of a tick, climbing the
    /// reconnect ladder if the session is broken.
    pub async fn ensure_primary(
        &self,
        binding: &mut PrimaryBinding,
        directory: &ClusterDirectory,
        connector: &dyn Connector,
        local: &mut dyn NodeSession,
        mode: FailoverMode,
    ) -> DaemonResult<Liveness> {
        if binding.session.status() == SessionStatus::Ok {
            return Ok(Liveness::Healthy);
        }

        for _ in 0..self.reconnect.attempts {
            tracing::warn!("connection to the primary has been lost, trying to recover");
            metrics::record_reconnect_attempt();
            tokio::time::sleep(self.reconnect.interval).await;
            binding.session.reset().await;
            if binding.session.status() == SessionStatus::Ok {
                tracing::info!("connection to the primary has been restored, continuing monitoring");
                return Ok(Liveness::Healthy);
            }
        }

        match mode {
            FailoverMode::Manual => self.rediscover(binding, directory, connector, local).await,
            FailoverMode::Automatic => Ok(Liveness::ElectionRequired),
        }
    }

    /// Manual mode: poll the registry until an operator-promoted primary
    /// shows up, then adopt it.
    async fn rediscover(
        &self,
        binding: &mut PrimaryBinding,
        directory: &ClusterDirectory,
        connector: &dyn Connector,
        local: &mut dyn NodeSession,
    ) -> DaemonResult<Liveness> {
        tracing::error!("could not reconnect to the primary, checking whether another node has been promoted");
        for attempt in 1..=self.rediscovery.attempts {
            match directory.find_primary(connector, local).await {
                Ok(Some((session, node_id))) => {
                    tracing::info!("connected to node {}, continuing monitoring", node_id);
                    binding.session.close().await;
                    binding.session = session;
                    binding.node_id = node_id;
                    return Ok(Liveness::Rebound);
                }
                Ok(None) => {
                    tracing::error!("no new primary found yet (attempt {attempt}), waiting before retry");
                }
                Err(e) => {
                    tracing::error!("primary rediscovery failed (attempt {attempt}): {e}");
                }
            }
            tokio::time::sleep(self.rediscovery.interval).await;
        }
        Err(DaemonError::DbConnection(
            "no primary appeared within the rediscovery window".into(),
        ))
    }
}

impl Default for PrimarySupervisor {
    fn default() -> Self {
        Self::new()
    }
}
