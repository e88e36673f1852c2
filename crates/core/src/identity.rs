//! Node identity: who this daemon is within its cluster.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Registry identifier of a cluster member. Unique within a cluster.
pub type NodeId = i32;

/// Role of a database node as observed through its local session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeRole {
    /// The writable node of the cluster.
    Primary,
    /// A read-only replica streaming from the primary.
    Standby,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRole::Primary => write!(f, "primary"),
            NodeRole::Standby => write!(f, "standby"),
        }
    }
}

/// This daemon's identity, assembled from configuration at startup and
/// registered in `repl_nodes` on first run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeIdentity {
    pub node_id: NodeId,
    pub cluster_name: String,
    /// Opaque connection string with which peers reach this node.
    pub conninfo: String,
    pub role: NodeRole,
}
