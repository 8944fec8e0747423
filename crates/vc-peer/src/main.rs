use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use vc_peer::{Node, PeerConfig};
use vc_transaction::DemoKeyVerifier;

/// Votechain peer node daemon.
#[derive(Parser, Debug)]
#[command(
    name = "vc-peer",
    version,
    about = "Votechain P2P peer node",
    long_about = "Runs a votechain peer that accepts votes from the local \
                  user, mines blocks under stake-modulated proof-of-work, \
                  gossips to its topology neighbors, and reports to the \
                  tracker."
)]
struct Cli {
    /// Host address to listen on.
    host: String,

    /// TCP port to listen on.
    port: u16,

    /// Tracker host.
    tracker_host: String,

    /// Tracker port.
    tracker_port: u16,

    /// Overlay topology file.
    #[arg(default_value = "topology.dat")]
    topology_file: PathBuf,

    /// Accepted for launcher compatibility; the effective difficulty is
    /// derived from this miner's tracker-maintained stake.
    #[arg(default_value_t = 4)]
    mining_difficulty: i64,

    /// Mine automatically whenever a transaction is admitted
    /// (`true`/`false`).
    #[arg(action = clap::ArgAction::Set, default_value_t = false)]
    auto_mine: bool,

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
            .add_directive("vc_peer=info".parse()?)
            .add_directive("vc_net=info".parse()?)
    };
    tracing_subscriber::fmt().with_env_filter(log_filter).init();

    let config = PeerConfig {
        host: cli.host,
        port: cli.port,
        tracker_host: cli.tracker_host,
        tracker_port: cli.tracker_port,
        topology_file: cli.topology_file,
        auto_mine: cli.auto_mine,
    };

    info!(
        port = config.port,
        tracker = %config.tracker_addr(),
        auto_mine = config.auto_mine,
        legacy_difficulty = cli.mining_difficulty,
        "starting votechain peer"
    );

    let (node, mut events) = Node::start(config, Arc::new(DemoKeyVerifier)).await?;

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            info!("node event: {event:?}");
        }
    });

    println!("Peer started. Commands:");
    println!("  create <choice>  - Cast this node's vote");
    println!("  mine             - Mine pending transactions");
    println!("  results          - Show voting results");
    println!("  info             - Show blockchain info");
    println!("  peers            - Show the known peer roster");
    println!("  proof <tx-id>    - Prove a committed vote's inclusion");
    println!("  exit             - Shut down this peer");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts.as_slice() {
            [] => {}
            ["create", choice] => {
                println!("Transaction created: {}", node.submit_vote(choice).await);
            }
            ["mine"] => {
                println!("Mining started: {}", node.mine_now().await);
            }
            ["results"] => {
                println!("Vote results:");
                for (choice, count) in node.results().await {
                    println!("  {choice}: {count} votes");
                }
            }
            ["info"] => {
                let info = node.chain_info().await;
                println!("Blockchain info:");
                println!("  chain_length: {}", info.chain_length);
                println!("  last_hash: {}", info.last_hash);
                println!("  pending_count: {}", info.pending_count);
                println!("  mining: {}", info.mining);
            }
            ["peers"] => {
                let peers = node.peers().await;
                println!("Known peers ({}):", peers.len());
                for (peer_id, addr) in peers {
                    println!("  {peer_id} -> {}:{}", addr.host, addr.port);
                }
            }
            ["proof", tx_id] => match tx_id.parse::<Uuid>() {
                Ok(tx_id) => match node.vote_proof(tx_id).await {
                    Some(proof) => {
                        let valid = proof.proof.verify(&proof.merkle_root);
                        println!(
                            "Committed in block {} (proof valid: {valid})",
                            proof.block_index
                        );
                    }
                    None => println!("Transaction is not committed on this node"),
                },
                Err(_) => println!("Not a transaction id: {tx_id}"),
            },
            ["exit"] => break,
            _ => println!("Unknown command"),
        }
    }

    node.shutdown();
    Ok(())
}
