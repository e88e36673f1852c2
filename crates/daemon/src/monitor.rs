//! Lag reporter: one tick of the monitoring loop.
//!
//! Each tick reads the standby's received/replayed locations and the
//! primary's current location, derives the byte lags, and appends a row to
//! the primary's `repl_monitor` table. The insert is sent asynchronously and
//! its outcome harvested at the start of the next tick, so a tick's wall time
//! is bounded by the two synchronous reads.

use crate::directory::quote_literal;
use crate::error::SessionError;
use crate::metrics;
use crate::session::NodeSession;
use replmgr_core::{LagSample, Lsn, NodeId};

pub struct LagReporter {
    schema: String,
    standby_node: NodeId,
}

impl LagReporter {
    pub fn new(schema: &str, standby_node: NodeId) -> Self {
        Self {
            schema: schema.to_owned(),
            standby_node,
        }
    }

    /// Run one measurement tick. A failure in any step aborts the tick; the
    /// next schedule retries from scratch.
    pub async fn tick(
        &self,
        local: &mut dyn NodeSession,
        primary: &mut dyn NodeSession,
        primary_node: NodeId,
    ) -> Result<(), SessionError> {
        // Harvest the previous tick's insert first; if it is somehow still
        // running, cancel it so the synchronous read below is not queued
        // behind it.
        if primary.is_busy() {
            primary.cancel_in_flight().await;
        }
        primary.drain_async().await;

        let rows = local
            .exec(
                "SELECT CURRENT_TIMESTAMP::text, pg_last_xlog_receive_location(), \
                 pg_last_xlog_replay_location()",
            )
            .await?;
        let row = rows
            .first()
            .ok_or_else(|| SessionError::BadResult("empty standby status row".into()))?;
        let ts = text_cell(row, 0, "timestamp")?;
        let received = lsn_cell(row, 1, "receive location")?;
        let applied = lsn_cell(row, 2, "replay location")?;

        let primary_text = primary
            .exec_scalar("SELECT pg_current_xlog_location()")
            .await?
            .ok_or_else(|| SessionError::BadResult("null primary location".into()))?;
        let primary_lsn: Lsn = primary_text
            .parse()
            .map_err(|_| SessionError::BadResult(format!("primary location {primary_text:?}")))?;

        let sample = LagSample::new(
            primary_node,
            self.standby_node,
            ts,
            primary_lsn,
            received,
            applied,
        );
        primary.send_async(&self.insert_sql(&sample));
        metrics::record_lag_sample(&sample);

        tracing::debug!(
            receive_lag_bytes = sample.receive_lag_bytes,
            apply_lag_bytes = sample.apply_lag_bytes,
            "lag sample sent"
        );
        Ok(())
    }

    fn insert_sql(&self, sample: &LagSample) -> String {
        format!(
            "INSERT INTO {}.repl_monitor \
             VALUES ({}, {}, {}::timestamp with time zone, {}, {}, {}, {})",
            self.schema,
            sample.primary_node,
            sample.standby_node,
            quote_literal(&sample.ts),
            quote_literal(&sample.primary_lsn.to_string()),
            quote_literal(&sample.standby_received_lsn.to_string()),
            sample.receive_lag_bytes,
            sample.apply_lag_bytes,
        )
    }
}

fn text_cell(row: &[Option<String>], idx: usize, what: &str) -> Result<String, SessionError> {
    row.get(idx)
        .cloned()
        .flatten()
        .ok_or_else(|| SessionError::BadResult(format!("null {what}")))
}

fn lsn_cell(row: &[Option<String>], idx: usize, what: &str) -> Result<Lsn, SessionError> {
    let text = text_cell(row, idx, what)?;
    text.parse()
        .map_err(|_| SessionError::BadResult(format!("{what} {text:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_sql_shape() {
        let reporter = LagReporter::new("replmgr_shop", 2);
        let sample = LagSample::new(
            1,
            2,
            "2026-08-02 10:00:00+00".into(),
            "0/1000000".parse().unwrap(),
            "0/F00000".parse().unwrap(),
            "0/E00000".parse().unwrap(),
        );
        assert_eq!(
            reporter.insert_sql(&sample),
            "INSERT INTO replmgr_shop.repl_monitor VALUES (1, 2, \
             '2026-08-02 10:00:00+00'::timestamp with time zone, \
             '0/1000000', '0/F00000', 1048576, 1048576)"
        );
    }

    #[test]
    fn test_lsn_cell_rejects_null_and_garbage() {
        let row = vec![None, Some("nonsense".to_string())];
        assert!(lsn_cell(&row, 0, "receive location").is_err());
        assert!(lsn_cell(&row, 1, "receive location").is_err());
    }
}
