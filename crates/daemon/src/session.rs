//! Thin session over a database connection.
//!
//! [`NodeSession`] is the interface the rest of the daemon is written
//! against; [`PgSession`] is the production implementation over
//! `tokio-postgres`. Results always travel in text form (the simple-query
//! protocol), which is all the monitoring queries need.
//!
//! Session operations are soft: a failed query is logged and surfaced as a
//! [`SessionError`], never a process exit. Escalation policy lives in the
//! supervisor and orchestrator.

use crate::error::SessionError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_postgres::{Client, NoTls, SimpleQueryMessage};

/// Result rows in text form. `None` cells are SQL NULLs.
pub type Rows = Vec<Vec<Option<String>>>;

/// Connection health as seen by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Ok,
    Broken,
}

/// One open session to a database node.
#[async_trait]
pub trait NodeSession: Send {
    fn status(&self) -> SessionStatus;

    /// Best-effort reconnect. Leaves the session broken on failure.
    async fn reset(&mut self);

    /// Run a query and collect its rows. Failures are soft.
    async fn exec(&mut self, sql: &str) -> Result<Rows, SessionError>;

    /// Fire a query without waiting for its result; the result is harvested
    /// by [`NodeSession::drain_async`] on a later tick.
    fn send_async(&mut self, sql: &str);

    /// Whether a previously sent async query is still in flight.
    fn is_busy(&self) -> bool;

    /// Ask the server to abandon the in-flight async query, if any.
    async fn cancel_in_flight(&mut self);

    /// Harvest the outcome of the last async query, logging any error.
    async fn drain_async(&mut self);

    /// Close the session, cancelling anything still in flight.
    async fn close(&mut self);

    /// First column of the first row of a single-row query.
    async fn exec_scalar(&mut self, sql: &str) -> Result<Option<String>, SessionError> {
        let rows = self.exec(sql).await?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| SessionError::BadResult("expected one row, got none".into()))?;
        row.into_iter()
            .next()
            .ok_or_else(|| SessionError::BadResult("expected one column, got none".into()))
    }

    /// Whether the node is currently in recovery (i.e. a standby).
    async fn is_standby(&mut self) -> Result<bool, SessionError> {
        let value = self.exec_scalar("SELECT pg_is_in_recovery()").await?;
        Ok(matches!(value.as_deref(), Some("t") | Some("true") | Some("on")))
    }

    /// Numeric server version (`server_version_num` form).
    async fn server_version_num(&mut self) -> Result<i64, SessionError> {
        let value = self
            .exec_scalar("SHOW server_version_num")
            .await?
            .ok_or_else(|| SessionError::BadResult("null server_version_num".into()))?;
        value
            .parse()
            .map_err(|_| SessionError::BadResult(format!("server_version_num {value:?}")))
    }
}

/// Opens sessions. Abstracted so elections and rediscovery can be exercised
/// against scripted sessions in tests.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a session to `conninfo`.
    ///
    /// When `required` is false a failed dial yields a closed sentinel
    /// session instead of an error; callers use [`NodeSession::status`] to
    /// tell the difference.
    async fn open(
        &self,
        conninfo: &str,
        required: bool,
    ) -> Result<Box<dyn NodeSession>, SessionError>;
}

/// Production session over `tokio-postgres`.
pub struct PgSession {
    conninfo: String,
    client: Option<Arc<Client>>,
    driver: Option<JoinHandle<()>>,
    pending: Option<JoinHandle<Result<(), tokio_postgres::Error>>>,
}

impl PgSession {
    /// Open a session to `conninfo`. See [`Connector::open`] for the
    /// `required` contract.
    pub async fn open(conninfo: &str, required: bool) -> Result<PgSession, SessionError> {
        let mut session = PgSession {
            conninfo: conninfo.to_owned(),
            client: None,
            driver: None,
            pending: None,
        };
        match session.dial().await {
            Ok(()) => Ok(session),
            Err(e) if required => Err(e),
            Err(e) => {
                tracing::warn!("could not connect to {}: {}", session.conninfo, e);
                Ok(session)
            }
        }
    }

    async fn dial(&mut self) -> Result<(), SessionError> {
        let (client, connection) = tokio_postgres::connect(&self.conninfo, NoTls)
            .await
            .map_err(SessionError::Connect)?;
        // The connection half pumps the socket until the client is dropped.
        let driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::debug!("connection closed: {}", e);
            }
        });
        if let Some(old) = self.driver.take() {
            old.abort();
        }
        self.client = Some(Arc::new(client));
        self.driver = Some(driver);
        Ok(())
    }
}

#[async_trait]
impl NodeSession for PgSession {
    fn status(&self) -> SessionStatus {
        match &self.client {
            Some(client) if !client.is_closed() => SessionStatus::Ok,
            _ => SessionStatus::Broken,
        }
    }

    async fn reset(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }
        self.client = None;
        if let Err(e) = self.dial().await {
            tracing::warn!("reconnect to {} failed: {}", self.conninfo, e);
        }
    }

    async fn exec(&mut self, sql: &str) -> Result<Rows, SessionError> {
        let client = self.client.as_ref().ok_or(SessionError::Disconnected)?;
        let messages = client
            .simple_query(sql)
            .await
            .map_err(SessionError::Query)?;
        let mut rows = Vec::new();
        for message in messages {
            if let SimpleQueryMessage::Row(row) = message {
                rows.push(
                    (0..row.len())
                        .map(|i| row.get(i).map(str::to_owned))
                        .collect(),
                );
            }
        }
        Ok(rows)
    }

    fn send_async(&mut self, sql: &str) {
        let Some(client) = self.client.clone() else {
            tracing::warn!("async query dropped, session is not connected");
            return;
        };
        let sql = sql.to_owned();
        self.pending = Some(tokio::spawn(async move {
            client.simple_query(&sql).await.map(|_| ())
        }));
    }

    fn is_busy(&self) -> bool {
        self.pending.as_ref().is_some_and(|task| !task.is_finished())
    }

    async fn cancel_in_flight(&mut self) {
        if let Some(client) = &self.client {
            if let Err(e) = client.cancel_token().cancel_query(NoTls).await {
                tracing::warn!("could not cancel in-flight query: {}", e);
            }
        }
    }

    async fn drain_async(&mut self) {
        if let Some(pending) = self.pending.take() {
            match pending.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!("async query failed: {}", e),
                Err(e) if e.is_cancelled() => {}
                Err(e) => tracing::warn!("async query task failed: {}", e),
            }
        }
    }

    async fn close(&mut self) {
        if self.is_busy() {
            self.cancel_in_flight().await;
        }
        self.drain_async().await;
        self.client = None;
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
    }
}

/// [`Connector`] producing [`PgSession`]s.
pub struct PgConnector;

#[async_trait]
impl Connector for PgConnector {
    async fn open(
        &self,
        conninfo: &str,
        required: bool,
    ) -> Result<Box<dyn NodeSession>, SessionError> {
        Ok(Box::new(PgSession::open(conninfo, required).await?))
    }
}
