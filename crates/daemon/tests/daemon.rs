//! Daemon startup identification paths.

mod common;

use common::{RecordingShell, ScriptedConnector, ScriptedSession};
use replmgr_core::exit;
use replmgr_daemon::config::DaemonConfig;
use replmgr_daemon::daemon::Daemon;
use replmgr_daemon::supervisor::{FailoverMode, PrimarySupervisor};

fn config() -> DaemonConfig {
    DaemonConfig {
        node: 2,
        cluster_name: "shop".into(),
        conninfo: "host=local".into(),
        failover: FailoverMode::Manual,
        promote_command: String::new(),
        follow_command: String::new(),
        loglevel: None,
        logfacility: None,
        metrics_address: None,
    }
}

fn daemon_with(connector: ScriptedConnector) -> (Daemon, RecordingShell) {
    let shell = RecordingShell::new();
    let recorder = RecordingShell {
        commands: shell.commands.clone(),
    };
    let daemon = Daemon::with_parts(
        config(),
        Box::new(connector),
        Box::new(shell),
        PrimarySupervisor::new(),
    );
    (daemon, recorder)
}

#[tokio::test]
async fn test_primary_node_start_is_a_clean_no_op() {
    let connector = ScriptedConnector::new();
    connector.push(
        "host=local",
        ScriptedSession::new()
            .one("server_version_num", "90600")
            .one("pg_is_in_recovery", "f"),
    );

    let (daemon, shell) = daemon_with(connector);
    daemon.run().await.unwrap();
    assert!(shell.ran().is_empty());
}

#[tokio::test]
async fn test_old_server_version_is_a_config_error() {
    let connector = ScriptedConnector::new();
    connector.push(
        "host=local",
        ScriptedSession::new().one("server_version_num", "80400"),
    );

    let (daemon, _) = daemon_with(connector);
    let err = daemon.run().await.unwrap_err();
    assert_eq!(err.exit_code(), exit::ERR_BAD_CONFIG);
}

#[tokio::test]
async fn test_unreachable_local_database_is_fatal() {
    let (daemon, _) = daemon_with(ScriptedConnector::new());
    let err = daemon.run().await.unwrap_err();
    assert_eq!(err.exit_code(), exit::ERR_DB_CON);
}

#[tokio::test]
async fn test_standby_without_any_primary_is_a_config_error() {
    let connector = ScriptedConnector::new();
    connector.push(
        "host=local",
        ScriptedSession::new()
            .one("server_version_num", "90600")
            .one("pg_is_in_recovery", "t")
            .on("repl_nodes WHERE cluster", Vec::new()),
    );

    let (daemon, _) = daemon_with(connector);
    let err = daemon.run().await.unwrap_err();
    assert_eq!(err.exit_code(), exit::ERR_BAD_CONFIG);
}
