//! Value types produced by monitoring ticks and election probes.

use crate::identity::NodeId;
use crate::lsn::Lsn;
use serde::{Deserialize, Serialize};

/// One lag measurement, produced per monitoring tick and appended to the
/// primary's `repl_monitor` table. Not retained locally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LagSample {
    pub primary_node: NodeId,
    pub standby_node: NodeId,
    /// Database-side timestamp text, passed through verbatim.
    pub ts: String,
    pub primary_lsn: Lsn,
    pub standby_received_lsn: Lsn,
    pub standby_applied_lsn: Lsn,
    pub receive_lag_bytes: u64,
    pub apply_lag_bytes: u64,
}

impl LagSample {
    /// Builds a sample, deriving both lag figures with clamping at zero.
    pub fn new(
        primary_node: NodeId,
        standby_node: NodeId,
        ts: String,
        primary_lsn: Lsn,
        standby_received_lsn: Lsn,
        standby_applied_lsn: Lsn,
    ) -> Self {
        Self {
            primary_node,
            standby_node,
            ts,
            primary_lsn,
            standby_received_lsn,
            standby_applied_lsn,
            receive_lag_bytes: primary_lsn.bytes_since(standby_received_lsn),
            apply_lag_bytes: standby_received_lsn.bytes_since(standby_applied_lsn),
        }
    }
}

/// What an election learned about one peer standby. Discarded when the
/// election ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerSnapshot {
    pub node_id: NodeId,
    /// The location the peer last published. `None` when the probe reached
    /// the peer but its published text did not parse.
    pub xlog_location: Option<Lsn>,
    /// Whether the peer may stand as a promotion candidate.
    pub is_ready: bool,
}

impl PeerSnapshot {
    /// A peer whose published location was read and parsed.
    pub fn ready(node_id: NodeId, xlog_location: Lsn) -> Self {
        Self {
            node_id,
            xlog_location: Some(xlog_location),
            is_ready: true,
        }
    }

    /// A peer that answered but cannot be considered for promotion.
    pub fn not_ready(node_id: NodeId) -> Self {
        Self {
            node_id,
            xlog_location: None,
            is_ready: false,
        }
    }
}
