//! Cluster directory: the registry tables that enumerate cluster members.
//!
//! All membership state lives in the database under a per-cluster schema:
//! `repl_nodes(id, cluster, conninfo)` is authoritative membership,
//! `repl_status(primary_node, standby_node, …)` the last known status per
//! standby. Only the primary writes the registry; a standby inserts its own
//! row exactly once, through its primary connection.

use crate::error::{DaemonError, DaemonResult, SessionError};
use crate::session::{Connector, NodeSession, SessionStatus};
use replmgr_core::config::SCHEMA_PREFIX;
use replmgr_core::{Lsn, NodeId, NodeIdentity, NodeRole};

/// SQL string literal with embedded quotes doubled.
pub(crate) fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Handle on one cluster's registry schema.
pub struct ClusterDirectory {
    cluster: String,
    schema: String,
}

impl ClusterDirectory {
    pub fn new(cluster_name: &str) -> Self {
        Self {
            cluster: cluster_name.to_owned(),
            schema: format!("{SCHEMA_PREFIX}{cluster_name}"),
        }
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Fatal check that the cluster registry exists where the config says it
    /// should. Catches both an unconfigured cluster and a conninfo pointing
    /// at the wrong database.
    pub async fn verify_schema(&self, session: &mut dyn NodeSession) -> DaemonResult<()> {
        let sql = format!(
            "SELECT oid FROM pg_class WHERE oid = {}::regclass",
            quote_literal(&format!("{}.repl_nodes", self.schema)),
        );
        let rows = session
            .exec(&sql)
            .await
            .map_err(|e| DaemonError::DbQuery(e.to_string()))?;
        if rows.is_empty() {
            return Err(DaemonError::BadConfig(format!(
                "replication cluster '{}' is not configured (missing {}.repl_nodes)",
                self.cluster, self.schema,
            )));
        }
        Ok(())
    }

    /// All members registered for this cluster, in node-id order.
    pub async fn list_members(
        &self,
        session: &mut dyn NodeSession,
    ) -> Result<Vec<NodeIdentity>, SessionError> {
        let sql = format!(
            "SELECT id, conninfo FROM {}.repl_nodes WHERE cluster = {} ORDER BY id",
            self.schema,
            quote_literal(&self.cluster),
        );
        let rows = session.exec(&sql).await?;
        self.collect_members(rows)
    }

    /// The election candidate set: registered standbys other than `exclude`,
    /// in node-id order.
    pub async fn list_peer_standbys(
        &self,
        session: &mut dyn NodeSession,
        exclude: NodeId,
    ) -> Result<Vec<NodeIdentity>, SessionError> {
        let sql = format!(
            "SELECT id, conninfo FROM {schema}.repl_nodes \
             WHERE id IN (SELECT standby_node FROM {schema}.repl_status WHERE standby_node <> {exclude}) \
             AND cluster = {cluster} ORDER BY id",
            schema = self.schema,
            exclude = exclude,
            cluster = quote_literal(&self.cluster),
        );
        let rows = session.exec(&sql).await?;
        self.collect_members(rows)
    }

    fn collect_members(
        &self,
        rows: crate::session::Rows,
    ) -> Result<Vec<NodeIdentity>, SessionError> {
        let mut members = Vec::with_capacity(rows.len());
        for row in rows {
            let id = row
                .first()
                .cloned()
                .flatten()
                .and_then(|v| v.parse::<NodeId>().ok())
                .ok_or_else(|| SessionError::BadResult("repl_nodes.id".into()))?;
            let conninfo = row
                .get(1)
                .cloned()
                .flatten()
                .ok_or_else(|| SessionError::BadResult("repl_nodes.conninfo".into()))?;
            members.push(NodeIdentity {
                node_id: id,
                cluster_name: self.cluster.clone(),
                conninfo,
                role: NodeRole::Standby,
            });
        }
        Ok(members)
    }

    /// Walk the registry and return a live session to whichever member is
    /// not in recovery, plus its node id. Members that cannot be reached or
    /// answer oddly are skipped.
    pub async fn find_primary(
        &self,
        connector: &dyn Connector,
        local: &mut dyn NodeSession,
    ) -> Result<Option<(Box<dyn NodeSession>, NodeId)>, SessionError> {
        let members = self.list_members(local).await?;
        for member in members {
            let mut candidate = match connector.open(&member.conninfo, false).await {
                Ok(session) => session,
                Err(e) => {
                    tracing::debug!("node {} unreachable: {}", member.node_id, e);
                    continue;
                }
            };
            if candidate.status() != SessionStatus::Ok {
                continue;
            }
            match candidate.is_standby().await {
                Ok(false) => {
                    tracing::info!("found primary at node {}", member.node_id);
                    return Ok(Some((candidate, member.node_id)));
                }
                Ok(true) => candidate.close().await,
                Err(e) => {
                    tracing::debug!("node {} role probe failed: {}", member.node_id, e);
                    candidate.close().await;
                }
            }
        }
        Ok(None)
    }

    /// Insert this node's registry row if it is not already there.
    /// Registry writes go through the primary.
    pub async fn ensure_self_registered(
        &self,
        primary: &mut dyn NodeSession,
        identity: &NodeIdentity,
    ) -> DaemonResult<()> {
        let lookup = format!(
            "SELECT id FROM {}.repl_nodes WHERE id = {} AND cluster = {}",
            self.schema,
            identity.node_id,
            quote_literal(&self.cluster),
        );
        let rows = primary
            .exec(&lookup)
            .await
            .map_err(|e| DaemonError::BadConfig(format!("node lookup failed: {e}")))?;
        if !rows.is_empty() {
            return Ok(());
        }

        tracing::info!(
            "registering node {} in cluster '{}'",
            identity.node_id,
            self.cluster
        );
        let insert = format!(
            "INSERT INTO {}.repl_nodes VALUES ({}, {}, {})",
            self.schema,
            identity.node_id,
            quote_literal(&self.cluster),
            quote_literal(&identity.conninfo),
        );
        primary
            .exec(&insert)
            .await
            .map_err(|e| DaemonError::BadConfig(format!("node registration failed: {e}")))?;
        Ok(())
    }

    /// Write this standby's latest applied location into the shared register
    /// peers read during elections. Last writer wins.
    pub async fn publish_standby_location(
        &self,
        session: &mut dyn NodeSession,
        lsn: Lsn,
    ) -> Result<(), SessionError> {
        let sql = format!("SELECT pg_update_standby_location({})", quote_literal(&lsn.to_string()));
        session.exec(&sql).await.map(|_| ())
    }

    /// Read the location a peer last published.
    pub async fn read_standby_location(
        &self,
        session: &mut dyn NodeSession,
    ) -> Result<Option<String>, SessionError> {
        session
            .exec_scalar("SELECT repmgr_get_last_standby_location()")
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_literal_doubles_quotes() {
        assert_eq!(quote_literal("plain"), "'plain'");
        assert_eq!(quote_literal("it's"), "'it''s'");
        assert_eq!(quote_literal(""), "''");
    }

    #[test]
    fn test_schema_name_carries_cluster() {
        let directory = ClusterDirectory::new("shop");
        assert_eq!(directory.schema(), "replmgr_shop");
    }
}
