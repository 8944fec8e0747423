use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vc_tracker::{Tracker, TrackerConfig};

/// Votechain tracker daemon.
#[derive(Parser, Debug)]
#[command(
    name = "vc-tracker",
    version,
    about = "Votechain tracker node",
    long_about = "Runs the votechain tracker: registers peers, assigns \
                  miner ids, maintains per-miner stake from heartbeat \
                  chain reports, and distributes the peer roster."
)]
struct Cli {
    /// Host address to listen on.
    host: String,

    /// TCP port to listen on.
    port: u16,

    /// Accepted for launcher compatibility; the tracker broadcasts to all
    /// active peers rather than topology neighbors.
    #[arg(default_value = "topology.dat")]
    topology_file: PathBuf,

    /// Suppress log output to stderr (run silently).
    #[arg(short, long, default_value_t = false, env = "VC_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Exit contract: 0 on clean shutdown, 1 on argument parse failure.
    let cli = Cli::try_parse().unwrap_or_else(|err| {
        let _ = err.print();
        std::process::exit(1);
    });

    let log_filter = if cli.quiet {
        EnvFilter::new("off")
    } else {
        EnvFilter::from_default_env()
            .add_directive("vc_tracker=info".parse()?)
            .add_directive("vc_net=info".parse()?)
    };
    tracing_subscriber::fmt().with_env_filter(log_filter).init();

    info!(
        host = %cli.host,
        port = cli.port,
        topology_file = %cli.topology_file.display(),
        "starting votechain tracker"
    );

    let tracker = Tracker::start(TrackerConfig {
        host: cli.host,
        port: cli.port,
    })
    .await?;

    tokio::signal::ctrl_c().await?;
    tracker.shutdown();
    Ok(())
}
