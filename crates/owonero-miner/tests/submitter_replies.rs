use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use owonero_core::{genesis_block, Block, ChainDocument, DifficultyController};
use owonero_miner::{run, MinerConfig, MinerError};
use tokio::net::TcpListener;
use tokio_util::codec::{Framed, LinesCodec};
use tokio_util::sync::CancellationToken;

const DEADLINE: Duration = Duration::from_secs(60);

/// What the scripted node saw: every command, plus the submitted blocks.
#[derive(Default)]
struct Seen {
    commands: Vec<String>,
    submitted: Vec<Block>,
}

/// A node starting from genesis that answers block submissions from
/// `replies` in order, then with `ok`. Accepted blocks are appended as-is.
async fn scripted_node(replies: Vec<&'static str>) -> anyhow::Result<(SocketAddr, Arc<Mutex<Seen>>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let seen = Arc::new(Mutex::new(Seen::default()));
    let log = seen.clone();
    tokio::spawn(async move {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        let mut framed = Framed::new(stream, LinesCodec::new());
        let mut replies = replies.into_iter();
        let mut chain = vec![genesis_block()];
        if framed.send("owonero-daemon height=0").await.is_err() {
            return;
        }
        while let Some(Ok(cmd)) = framed.next().await {
            log.lock().unwrap().commands.push(cmd.clone());
            let reply = match cmd.as_str() {
                "mineractive" => "ok".to_string(),
                "getchain" => serde_json::to_string(&ChainDocument { chain: chain.clone() }).unwrap(),
                "getpending" => "[]".to_string(),
                "getheight" => (chain.len() - 1).to_string(),
                "submitblock" => {
                    let Some(Ok(payload)) = framed.next().await else {
                        return;
                    };
                    let block: Block = serde_json::from_str(&payload).unwrap();
                    log.lock().unwrap().submitted.push(block.clone());
                    let reply = replies.next().unwrap_or("ok");
                    if reply == "ok" {
                        chain.push(block);
                    }
                    reply.to_string()
                }
                other => format!("unknown command {other}"),
            };
            if framed.send(reply).await.is_err() {
                return;
            }
        }
    });
    Ok((addr, seen))
}

fn config(addr: SocketAddr, blocks: u64) -> MinerConfig {
    MinerConfig {
        node: addr.to_string(),
        wallet: "OWO-miner".into(),
        threads: 2,
        blocks_to_mine: blocks,
        pool: false,
        controller: DifficultyController::default(),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unexpected_reply_is_fatal() -> anyhow::Result<()> {
    let (addr, seen) = scripted_node(vec!["error: node unavailable"]).await?;
    let outcome = tokio::time::timeout(DEADLINE, run(config(addr, 0), CancellationToken::new())).await?;
    match outcome {
        Err(MinerError::Rejected(reply)) => assert_eq!(reply, "error: node unavailable"),
        other => panic!("expected a rejection, got {other:?}"),
    }
    assert_eq!(seen.lock().unwrap().submitted.len(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_invalid_block_refreshes_head() -> anyhow::Result<()> {
    let (addr, seen) = scripted_node(vec!["error: block invalid"]).await?;
    let summary = tokio::time::timeout(DEADLINE, run(config(addr, 1), CancellationToken::new())).await??;
    assert_eq!(summary.accepted, 1);

    let seen = seen.lock().unwrap();
    let fetches = seen.commands.iter().filter(|c| *c == "getchain").count();
    assert_eq!(fetches, 2, "rejection should re-fetch the chain once");
    assert_eq!(seen.submitted.len(), 2);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stale_candidates_are_not_submitted() -> anyhow::Result<()> {
    let (addr, seen) = scripted_node(vec![]).await?;
    let summary = tokio::time::timeout(DEADLINE, run(config(addr, 3), CancellationToken::new())).await??;
    assert_eq!(summary.accepted, 3);

    // Every submission builds on the one accepted before it; work left over
    // from an older head never reaches the node.
    let seen = seen.lock().unwrap();
    assert_eq!(seen.submitted.len(), 3);
    assert_eq!(seen.submitted[0].prev_hash, genesis_block().hash);
    for pair in seen.submitted.windows(2) {
        assert_eq!(pair[1].prev_hash, pair[0].hash);
        assert_eq!(pair[1].index, pair[0].index + 1);
    }
    Ok(())
}
