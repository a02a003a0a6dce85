use std::thread;

use clap::Parser;
use owonero_core::DifficultyController;
use owonero_miner::constants::DEFAULT_NODE;
use owonero_miner::{run, MinerConfig};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "owonero-miner", about = "Owonero CPU miner")]
struct Args {
    /// Node to mine against, host:port
    #[arg(short, long, default_value = DEFAULT_NODE)]
    node: String,

    /// Payout address
    #[arg(short, long)]
    wallet: String,

    /// Worker threads (default: available cores)
    #[arg(short, long)]
    threads: Option<usize>,

    /// Stop after this many accepted blocks; 0 mines forever
    #[arg(short, long, default_value_t = 0)]
    blocks: u64,

    /// Submit shares to a pool node instead of blocks
    #[arg(long)]
    pool: bool,

    /// Target seconds between blocks; must match the node
    #[arg(long)]
    target_block_time: Option<i64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let threads = args
        .threads
        .unwrap_or_else(|| thread::available_parallelism().map_or(1, |n| n.get()));
    let controller = args
        .target_block_time
        .map_or_else(DifficultyController::default, DifficultyController::with_target_block_time);
    let config = MinerConfig {
        node: args.node,
        wallet: args.wallet,
        threads,
        blocks_to_mine: args.blocks,
        pool: args.pool,
        controller,
    };

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for ctrl-c");
            return;
        }
        info!("stopping miner");
        on_signal.cancel();
    });

    match run(config, cancel).await {
        Ok(summary) => {
            info!(accepted = summary.accepted, "done");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "mining failed");
            Err(e.into())
        }
    }
}
