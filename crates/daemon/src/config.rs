//! CLI arguments and config-file loading.
//!
//! The config file is the plain `key = value` format the rest of the cluster
//! tooling writes (`#` comments, blank lines allowed). Everything is
//! validated up front so a bad file fails the process before any connection
//! is attempted.

use crate::error::{DaemonError, DaemonResult};
use crate::supervisor::FailoverMode;
use clap::Parser;
use replmgr_core::config::DEFAULT_CONFIG_FILE;
use replmgr_core::{NodeId, NodeIdentity, NodeRole};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(
    name = "replmgrd",
    version,
    about = "Replication manager daemon: monitors standby lag and runs automatic failover"
)]
pub struct Args {
    /// Configuration file
    #[arg(short = 'f', long = "config", default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Output verbose activity information
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

/// Runtime configuration of one daemon instance.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// This node's registry identity.
    pub node: NodeId,
    pub cluster_name: String,
    /// How this daemon reaches its local database.
    pub conninfo: String,
    pub failover: FailoverMode,
    /// Shell command performing the database-level promotion.
    pub promote_command: String,
    /// Shell command re-parenting the local standby to the new primary.
    pub follow_command: String,
    pub loglevel: Option<LogLevel>,
    /// Accepted for operators' syslog tooling; routing is left to the
    /// process supervisor.
    pub logfacility: Option<String>,
    /// Optional Prometheus exporter bind address.
    pub metrics_address: Option<SocketAddr>,
}

/// Log levels accepted in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Notice,
    Warning,
    Error,
}

impl LogLevel {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "notice" => Some(LogLevel::Notice),
            "warning" => Some(LogLevel::Warning),
            "err" | "error" => Some(LogLevel::Error),
            _ => None,
        }
    }

    /// The equivalent tracing filter directive.
    pub fn directive(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info | LogLevel::Notice => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl DaemonConfig {
    pub fn load(path: &Path) -> DaemonResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            DaemonError::BadConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> DaemonResult<Self> {
        let mut node = None;
        let mut cluster_name = None;
        let mut conninfo = None;
        let mut failover = FailoverMode::Manual;
        let mut promote_command = String::new();
        let mut follow_command = String::new();
        let mut loglevel = None;
        let mut logfacility = None;
        let mut metrics_address = None;

        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line.split_once('=').ok_or_else(|| {
                DaemonError::BadConfig(format!("line {}: expected key=value", lineno + 1))
            })?;
            let key = key.trim();
            let value = unquote(value.trim());

            match key {
                "node" => {
                    node = Some(value.parse::<NodeId>().map_err(|_| {
                        DaemonError::BadConfig(format!("node must be an integer, got {value:?}"))
                    })?);
                }
                "cluster_name" => cluster_name = Some(value.to_owned()),
                "conninfo" => conninfo = Some(value.to_owned()),
                "failover" => {
                    failover = match value.to_ascii_lowercase().as_str() {
                        "manual" => FailoverMode::Manual,
                        "automatic" => FailoverMode::Automatic,
                        _ => {
                            return Err(DaemonError::BadConfig(format!(
                                "failover must be manual or automatic, got {value:?}"
                            )))
                        }
                    };
                }
                "promote_command" => promote_command = value.to_owned(),
                "follow_command" => follow_command = value.to_owned(),
                "loglevel" => {
                    loglevel = Some(LogLevel::parse(value).ok_or_else(|| {
                        DaemonError::BadConfig(format!("unknown loglevel {value:?}"))
                    })?);
                }
                "logfacility" => logfacility = Some(value.to_owned()),
                "metrics_address" => {
                    metrics_address = Some(value.parse::<SocketAddr>().map_err(|_| {
                        DaemonError::BadConfig(format!(
                            "metrics_address must be host:port, got {value:?}"
                        ))
                    })?);
                }
                _ => tracing::warn!("ignoring unknown config key {:?}", key),
            }
        }

        let node = node.ok_or_else(|| {
            DaemonError::BadConfig("node information is missing; check the configuration file".into())
        })?;
        let cluster_name = cluster_name
            .filter(|name| !name.is_empty())
            .ok_or_else(|| DaemonError::BadConfig("cluster_name is missing".into()))?;
        if !cluster_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            // The name becomes a schema-name fragment.
            return Err(DaemonError::BadConfig(format!(
                "cluster_name {cluster_name:?} may only contain letters, digits and underscores"
            )));
        }
        let conninfo = conninfo
            .filter(|info| !info.is_empty())
            .ok_or_else(|| DaemonError::BadConfig("conninfo is missing".into()))?;
        if failover == FailoverMode::Automatic
            && (promote_command.is_empty() || follow_command.is_empty())
        {
            return Err(DaemonError::BadConfig(
                "automatic failover requires promote_command and follow_command".into(),
            ));
        }

        Ok(DaemonConfig {
            node,
            cluster_name,
            conninfo,
            failover,
            promote_command,
            follow_command,
            loglevel,
            logfacility,
            metrics_address,
        })
    }

    /// This daemon's identity as registered in the cluster directory.
    pub fn identity(&self) -> NodeIdentity {
        NodeIdentity {
            node_id: self.node,
            cluster_name: self.cluster_name.clone(),
            conninfo: self.conninfo.clone(),
            role: NodeRole::Standby,
        }
    }
}

fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2
        && (bytes[0] == b'\'' || bytes[0] == b'"')
        && bytes[bytes.len() - 1] == bytes[0]
    {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD: &str = "\
# cluster test
node = 2
cluster_name = shop
conninfo = 'host=10.0.0.2 dbname=shop user=replmgr'
failover = automatic
promote_command = '/usr/local/bin/promote.sh'
follow_command = '/usr/local/bin/follow.sh'
loglevel = NOTICE
";

    #[test]
    fn test_parse_full_config() {
        let config = DaemonConfig::parse(GOOD).unwrap();
        assert_eq!(config.node, 2);
        assert_eq!(config.cluster_name, "shop");
        assert_eq!(config.conninfo, "host=10.0.0.2 dbname=shop user=replmgr");
        assert_eq!(config.failover, FailoverMode::Automatic);
        assert_eq!(config.promote_command, "/usr/local/bin/promote.sh");
        assert_eq!(config.loglevel, Some(LogLevel::Notice));
        assert_eq!(config.loglevel.unwrap().directive(), "info");
        assert!(config.metrics_address.is_none());
    }

    #[test]
    fn test_missing_node_is_rejected() {
        let err = DaemonConfig::parse("cluster_name=shop\nconninfo=host=x\n").unwrap_err();
        assert!(err.to_string().contains("node information is missing"));
    }

    #[test]
    fn test_bad_failover_value_is_rejected() {
        let text = "node=1\ncluster_name=shop\nconninfo=host=x\nfailover=sometimes\n";
        assert!(DaemonConfig::parse(text).is_err());
    }

    #[test]
    fn test_automatic_requires_commands() {
        let text = "node=1\ncluster_name=shop\nconninfo=host=x\nfailover=automatic\n";
        assert!(DaemonConfig::parse(text).is_err());
    }

    #[test]
    fn test_manual_is_the_default_mode() {
        let config = DaemonConfig::parse("node=1\ncluster_name=shop\nconninfo=host=x\n").unwrap();
        assert_eq!(config.failover, FailoverMode::Manual);
        assert!(config.promote_command.is_empty());
    }

    #[test]
    fn test_cluster_name_must_be_schema_safe() {
        let text = "node=1\ncluster_name=shop; DROP\nconninfo=host=x\n";
        assert!(DaemonConfig::parse(text).is_err());
    }

    #[test]
    fn test_conninfo_value_may_contain_equals_signs() {
        let config =
            DaemonConfig::parse("node=1\ncluster_name=shop\nconninfo=host=x port=5433\n").unwrap();
        assert_eq!(config.conninfo, "host=x port=5433");
    }

    #[test]
    fn test_load_reads_a_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("replmgr.conf");
        std::fs::write(&path, GOOD).unwrap();
        let config = DaemonConfig::load(&path).unwrap();
        assert_eq!(config.node, 2);

        let missing = DaemonConfig::load(&dir.path().join("nope.conf"));
        assert!(missing.is_err());
    }
}
