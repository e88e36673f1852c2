use clap::Parser;
use replmgr_core::exit;
use replmgr_daemon::config::{Args, DaemonConfig};
use replmgr_daemon::daemon::Daemon;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match DaemonConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(e.exit_code());
        }
    };

    init_logging(&config, args.verbose);

    if let Some(addr) = config.metrics_address {
        match metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
        {
            Ok(()) => tracing::info!("metrics exporter listening on {}", addr),
            Err(e) => {
                tracing::error!("cannot start the metrics exporter on {}: {}", addr, e);
                std::process::exit(exit::ERR_BAD_CONFIG);
            }
        }
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        node = config.node,
        cluster = %config.cluster_name,
        failover = ?config.failover,
        "replmgrd starting"
    );

    let daemon = Daemon::new(config);
    match daemon.run().await {
        Ok(()) => std::process::exit(exit::SUCCESS),
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(e.exit_code());
        }
    }
}

fn init_logging(config: &DaemonConfig, verbose: bool) {
    let default = if verbose {
        "debug"
    } else {
        config
            .loglevel
            .map(|level| level.directive())
            .unwrap_or("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}
