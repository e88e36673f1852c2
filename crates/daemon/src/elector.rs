//! Failover elector: the distributed election run when the primary is lost.
//!
//! Every surviving standby runs the same procedure against the same shared
//! state: publish your own applied location, read everyone else's, and only
//! act if you can see enough of the cluster. The standby with the highest
//! applied location promotes itself; the rest re-parent to it. There is no
//! coordinator — the published-location register and the deterministic
//! candidate rule are the whole protocol.

use crate::directory::ClusterDirectory;
use crate::error::{DaemonError, DaemonResult, SessionError};
use crate::session::{Connector, NodeSession, SessionStatus};
use async_trait::async_trait;
use replmgr_core::{Lsn, NodeId, NodeIdentity, PeerSnapshot};

/// Runs operator-supplied actions through the process shell, verbatim.
#[async_trait]
pub trait ShellRunner: Send + Sync {
    async fn run(&self, command: &str);
}

/// Production shell hand-off. The command string is not split or inspected,
/// and its exit status is logged but never acted upon.
pub struct SystemShell;

#[async_trait]
impl ShellRunner for SystemShell {
    async fn run(&self, command: &str) {
        match tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .status()
            .await
        {
            Ok(status) => tracing::info!("command {:?} exited with {}", command, status),
            Err(e) => tracing::error!("command {:?} could not be run: {}", command, e),
        }
    }
}

/// Whether enough of the cluster is visible to act.
///
/// `visible` and `total` both count this node. The predicate is
/// `visible >= total / 2` with integer division, so a three-node cluster is
/// satisfied by any visible node and a four-node cluster needs two.
pub fn has_quorum(visible: usize, total: usize) -> bool {
    visible >= total / 2
}

/// Pick the promotion candidate.
///
/// The incumbent starts as this node and is replaced only by a ready peer
/// with a strictly greater location; on equal locations the incumbent wins.
/// `peers` must be in ascending node-id order, making the whole rule
/// deterministic: self first, then lower node ids, keep ties.
pub fn select_candidate(self_id: NodeId, self_lsn: Lsn, peers: &[PeerSnapshot]) -> NodeId {
    let mut best_id = self_id;
    let mut best_lsn = self_lsn;
    for peer in peers {
        if !peer.is_ready {
            continue;
        }
        if let Some(location) = peer.xlog_location {
            if location > best_lsn {
                best_id = peer.node_id;
                best_lsn = location;
            }
        }
    }
    best_id
}

pub struct FailoverElector<'a> {
    pub directory: &'a ClusterDirectory,
    pub connector: &'a dyn Connector,
    pub shell: &'a dyn ShellRunner,
    pub promote_command: &'a str,
    pub follow_command: &'a str,
}

impl FailoverElector<'_> {
    /// Run the election.
    ///
    /// On return this node has either promoted itself or re-parented to the
    /// winner, and `local` has been reopened; the supervisor rediscovers the
    /// new primary on its next tick. Fatal outcomes (crashed self-report,
    /// unreadable registry, lost quorum) are returned as errors.
    pub async fn run(
        &self,
        local: &mut Box<dyn NodeSession>,
        identity: &NodeIdentity,
    ) -> DaemonResult<()> {
        // Publish our own applied location first: peers running the same
        // election must be able to see us. If we cannot even read it, we
        // publish the zero sentinel so nobody elects a broken node, and get
        // out of the way.
        let self_lsn = match self.read_self_location(local.as_mut()).await {
            Ok(lsn) => lsn,
            Err(e) => {
                if let Err(publish_err) = self
                    .directory
                    .publish_standby_location(local.as_mut(), Lsn::ZERO)
                    .await
                {
                    tracing::warn!("could not publish zero location: {}", publish_err);
                }
                return Err(e);
            }
        };
        if let Err(e) = self
            .directory
            .publish_standby_location(local.as_mut(), self_lsn)
            .await
        {
            // Peers will fall back to whatever we published last; stale is
            // survivable, absent is not.
            tracing::warn!("could not publish standby location: {}", e);
        }

        let peers = self
            .directory
            .list_peer_standbys(local.as_mut(), identity.node_id)
            .await
            .map_err(|e| DaemonError::BadQuery(format!("cannot read cluster members: {e}")))?;

        let (snapshots, reachable) = self.probe_peers(&peers).await;

        let total = peers.len() + 1;
        let visible = reachable + 1;
        tracing::info!(
            visible,
            total,
            candidates = ?snapshots,
            "election state"
        );
        if !has_quorum(visible, total) {
            return Err(DaemonError::FailoverFail(format!(
                "only {visible} of {total} nodes visible; \
                 leaving the decision to the standbys that can see each other \
                 (manual action required to rejoin this node)"
            )));
        }

        let winner = select_candidate(identity.node_id, self_lsn, &snapshots);
        if winner == identity.node_id {
            tracing::info!("this node has the highest applied location, promoting");
            self.shell.run(self.promote_command).await;
        } else {
            tracing::info!("node {} wins, following it", winner);
            self.shell.run(self.follow_command).await;
        }

        // The action bounced the local server (promotion or re-parenting),
        // so the old session is gone either way.
        local.close().await;
        *local = self
            .connector
            .open(&identity.conninfo, true)
            .await
            .map_err(|e| DaemonError::DbConnection(format!("cannot reopen local session: {e}")))?;
        Ok(())
    }

    async fn read_self_location(&self, local: &mut dyn NodeSession) -> DaemonResult<Lsn> {
        let text = self
            .local_replay_location(local)
            .await
            .map_err(|e| DaemonError::DbQuery(format!("cannot read local replay location: {e}")))?;
        text.parse().map_err(|_| {
            DaemonError::DbQuery(format!("local replay location {text:?} is unusable"))
        })
    }

    async fn local_replay_location(
        &self,
        local: &mut dyn NodeSession,
    ) -> Result<String, SessionError> {
        let value = local
            .exec_scalar("SELECT pg_last_xlog_replay_location()")
            .await?;
        value.ok_or_else(|| SessionError::BadResult("null replay location".into()))
    }

    /// Probe every registered peer. Returns the snapshots (one per peer, in
    /// the given order) and the count of peers that answered.
    async fn probe_peers(&self, peers: &[NodeIdentity]) -> (Vec<PeerSnapshot>, usize) {
        let mut snapshots = Vec::with_capacity(peers.len());
        let mut reachable = 0;
        for peer in peers {
            let snapshot = self.probe_peer(peer, &mut reachable).await;
            snapshots.push(snapshot);
        }
        (snapshots, reachable)
    }

    async fn probe_peer(&self, peer: &NodeIdentity, reachable: &mut usize) -> PeerSnapshot {
        let mut session = match self.connector.open(&peer.conninfo, false).await {
            Ok(session) if session.status() == SessionStatus::Ok => session,
            Ok(_) | Err(_) => {
                tracing::info!("node {} is not reachable, skipping it", peer.node_id);
                return PeerSnapshot::not_ready(peer.node_id);
            }
        };

        let location = self.directory.read_standby_location(session.as_mut()).await;
        session.close().await;

        match location {
            Err(e) => {
                tracing::info!(
                    "cannot read the published location of node {}: {}",
                    peer.node_id,
                    e
                );
                PeerSnapshot::not_ready(peer.node_id)
            }
            Ok(text) => {
                // The peer answered, so it counts as visible even if what it
                // published is unusable.
                *reachable += 1;
                match text.as_deref().map(str::parse::<Lsn>) {
                    Some(Ok(location)) => PeerSnapshot::ready(peer.node_id, location),
                    _ => {
                        tracing::info!(
                            "node {} published an unusable location {:?}",
                            peer.node_id,
                            text
                        );
                        PeerSnapshot::not_ready(peer.node_id)
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lsn(text: &str) -> Lsn {
        text.parse().unwrap()
    }

    #[test]
    fn test_quorum_integer_semantics() {
        // total = 3: threshold is 1, any visible node passes.
        assert!(has_quorum(1, 3));
        assert!(has_quorum(2, 3));
        // total = 4: threshold is 2.
        assert!(!has_quorum(1, 4));
        assert!(has_quorum(2, 4));
        // total = 5: threshold is 2.
        assert!(!has_quorum(1, 5));
        assert!(has_quorum(2, 5));
        // Degenerate single-node cluster.
        assert!(has_quorum(1, 1));
    }

    #[test]
    fn test_candidate_highest_location_wins() {
        let peers = vec![
            PeerSnapshot::ready(2, lsn("0/300")),
            PeerSnapshot::ready(3, lsn("0/100")),
        ];
        assert_eq!(select_candidate(1, lsn("0/200"), &peers), 2);
    }

    #[test]
    fn test_candidate_self_wins_when_highest() {
        let peers = vec![
            PeerSnapshot::ready(2, lsn("0/300")),
            PeerSnapshot::ready(3, lsn("0/400")),
        ];
        assert_eq!(select_candidate(1, lsn("0/500"), &peers), 1);
    }

    #[test]
    fn test_candidate_tie_keeps_incumbent() {
        // Equal to self: self stays.
        let peers = vec![PeerSnapshot::ready(2, lsn("0/200"))];
        assert_eq!(select_candidate(1, lsn("0/200"), &peers), 1);

        // Equal between peers: the earlier (lower id) peer stays.
        let peers = vec![
            PeerSnapshot::ready(2, lsn("0/300")),
            PeerSnapshot::ready(3, lsn("0/300")),
        ];
        assert_eq!(select_candidate(1, lsn("0/100"), &peers), 2);
    }

    #[test]
    fn test_candidate_ignores_not_ready_peers() {
        let peers = vec![
            PeerSnapshot::not_ready(2),
            PeerSnapshot::ready(3, lsn("0/100")),
        ];
        assert_eq!(select_candidate(1, lsn("0/200"), &peers), 1);
    }
}
