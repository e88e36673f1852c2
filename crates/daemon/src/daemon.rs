//! Daemon orchestrator: startup self-identification, the periodic tick loop,
//! and clean shutdown.
//!
//! The daemon is meaningful only on a standby. A primary start logs and
//! exits; a standby enters the tick loop, where each tick verifies primary
//! liveness (supervisor), confirms the local node is still a standby, and
//! publishes one lag sample (reporter). Elections triggered by the
//! supervisor run inline in the tick.

use crate::config::DaemonConfig;
use crate::directory::ClusterDirectory;
use crate::elector::{FailoverElector, ShellRunner, SystemShell};
use crate::error::{DaemonError, DaemonResult};
use crate::metrics;
use crate::monitor::LagReporter;
use crate::session::{Connector, NodeSession, PgConnector};
use crate::supervisor::{Liveness, PrimaryBinding, PrimarySupervisor};
use replmgr_core::config::{MIN_SERVER_VERSION_NUM, MONITOR_INTERVAL_SECS};
use replmgr_core::NodeIdentity;
use std::time::Duration;

pub struct Daemon {
    config: DaemonConfig,
    identity: NodeIdentity,
    directory: ClusterDirectory,
    connector: Box<dyn Connector>,
    shell: Box<dyn ShellRunner>,
    supervisor: PrimarySupervisor,
}

impl Daemon {
    pub fn new(config: DaemonConfig) -> Self {
        let identity = config.identity();
        let directory = ClusterDirectory::new(&config.cluster_name);
        Self {
            config,
            identity,
            directory,
            connector: Box::new(PgConnector),
            shell: Box::new(SystemShell),
            supervisor: PrimarySupervisor::new(),
        }
    }

    /// Same daemon with injectable edges, for tests.
    pub fn with_parts(
        config: DaemonConfig,
        connector: Box<dyn Connector>,
        shell: Box<dyn ShellRunner>,
        supervisor: PrimarySupervisor,
    ) -> Self {
        let identity = config.identity();
        let directory = ClusterDirectory::new(&config.cluster_name);
        Self {
            config,
            identity,
            directory,
            connector,
            shell,
            supervisor,
        }
    }

    /// Run until a clean shutdown or a fatal condition.
    pub async fn run(&self) -> DaemonResult<()> {
        tracing::info!("connecting to the local database");
        let mut local = self
            .connector
            .open(&self.config.conninfo, true)
            .await
            .map_err(|e| DaemonError::DbConnection(e.to_string()))?;

        let version = local
            .server_version_num()
            .await
            .map_err(|e| DaemonError::BadConfig(format!("cannot read server version: {e}")))?;
        if version < MIN_SERVER_VERSION_NUM {
            local.close().await;
            return Err(DaemonError::BadConfig(format!(
                "server version {version} is too old; standby monitoring needs 9.0 or better"
            )));
        }

        let standby = local
            .is_standby()
            .await
            .map_err(|e| DaemonError::DbQuery(format!("cannot determine local role: {e}")))?;
        if !standby {
            tracing::info!("this is a primary node, monitoring is not needed here; exiting");
            local.close().await;
            return Ok(());
        }

        tracing::info!(
            "connecting to the primary for cluster '{}'",
            self.config.cluster_name
        );
        let mut binding = match self
            .directory
            .find_primary(self.connector.as_ref(), local.as_mut())
            .await
        {
            Ok(Some((session, node_id))) => PrimaryBinding { session, node_id },
            Ok(None) => {
                local.close().await;
                return Err(DaemonError::BadConfig(
                    "no reachable primary registered for this cluster".into(),
                ));
            }
            Err(e) => {
                local.close().await;
                return Err(DaemonError::BadConfig(format!(
                    "cannot discover the cluster primary: {e}"
                )));
            }
        };

        let startup = self.startup_checks(local.as_mut(), &mut binding).await;
        if let Err(e) = startup {
            self.shutdown_sessions(&mut local, &mut binding).await;
            return Err(e);
        }

        tracing::info!("starting continuous standby monitoring");
        let reporter = LagReporter::new(self.directory.schema(), self.identity.node_id);
        let result = self.tick_loop(&reporter, &mut local, &mut binding).await;
        self.shutdown_sessions(&mut local, &mut binding).await;
        result
    }

    async fn startup_checks(
        &self,
        local: &mut dyn NodeSession,
        binding: &mut PrimaryBinding,
    ) -> DaemonResult<()> {
        self.directory.verify_schema(local).await?;
        self.directory
            .ensure_self_registered(binding.session.as_mut(), &self.identity)
            .await
    }

    async fn tick_loop(
        &self,
        reporter: &LagReporter,
        local: &mut Box<dyn NodeSession>,
        binding: &mut PrimaryBinding,
    ) -> DaemonResult<()> {
        let shutdown = wait_for_signal();
        tokio::pin!(shutdown);

        // After an election the old binding is dead; the next tick starts by
        // rediscovering the new primary instead of climbing the ladder.
        let mut rediscover_pending = false;

        loop {
            let tick = self
                .tick(reporter, local, binding, &mut rediscover_pending)
                .await;
            metrics::record_tick(tick.is_ok());
            tick?;

            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("shutting down");
                    return Ok(());
                }
                _ = tokio::time::sleep(Duration::from_secs(MONITOR_INTERVAL_SECS)) => {}
            }
        }
    }

    /// One tick. `Ok` covers both a published sample and a soft abort;
    /// errors are fatal.
    async fn tick(
        &self,
        reporter: &LagReporter,
        local: &mut Box<dyn NodeSession>,
        binding: &mut PrimaryBinding,
        rediscover_pending: &mut bool,
    ) -> DaemonResult<()> {
        if *rediscover_pending {
            match self
                .directory
                .find_primary(self.connector.as_ref(), local.as_mut())
                .await
            {
                Ok(Some((session, node_id))) => {
                    tracing::info!("connected to the new primary, node {}", node_id);
                    binding.session.close().await;
                    binding.session = session;
                    binding.node_id = node_id;
                    *rediscover_pending = false;
                }
                Ok(None) | Err(_) => {
                    tracing::warn!("the new primary is not visible yet, retrying next tick");
                    return Ok(());
                }
            }
        }

        let liveness = self
            .supervisor
            .ensure_primary(
                binding,
                &self.directory,
                self.connector.as_ref(),
                local.as_mut(),
                self.config.failover,
            )
            .await?;

        if liveness == Liveness::ElectionRequired {
            self.check_still_standby(local.as_mut()).await?;
            let elector = FailoverElector {
                directory: &self.directory,
                connector: self.connector.as_ref(),
                shell: self.shell.as_ref(),
                promote_command: &self.config.promote_command,
                follow_command: &self.config.follow_command,
            };
            elector.run(local, &self.identity).await?;
            self.check_still_standby(local.as_mut()).await?;
            *rediscover_pending = true;
            return Ok(());
        }

        // We could have been promoted out-of-band; monitoring a cluster we
        // now lead is someone else's job.
        self.check_still_standby(local.as_mut()).await?;

        if let Err(e) = reporter
            .tick(local.as_mut(), binding.session.as_mut(), binding.node_id)
            .await
        {
            tracing::warn!("monitoring tick failed, will retry: {}", e);
        }
        Ok(())
    }

    async fn check_still_standby(&self, local: &mut dyn NodeSession) -> DaemonResult<()> {
        match local.is_standby().await {
            Ok(true) => Ok(()),
            Ok(false) => {
                tracing::error!("this node has been promoted, exiting standby monitoring");
                Err(DaemonError::Promoted)
            }
            Err(e) => {
                // Role unknown is not role changed; keep monitoring and let
                // the next tick decide.
                tracing::warn!("local role check failed: {}", e);
                Ok(())
            }
        }
    }

    async fn shutdown_sessions(
        &self,
        local: &mut Box<dyn NodeSession>,
        binding: &mut PrimaryBinding,
    ) {
        if binding.session.is_busy() {
            binding.session.cancel_in_flight().await;
        }
        binding.session.close().await;
        local.close().await;
    }
}

/// Resolves when the process is asked to stop (SIGINT or SIGTERM).
async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received SIGINT"),
        _ = terminate => tracing::info!("received SIGTERM"),
    }
}
