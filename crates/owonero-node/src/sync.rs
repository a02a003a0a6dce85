use std::time::Duration;

use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::NodeClient;
use crate::constants::{PEER_DISCOVERY_TIMEOUT, SYNC_CHUNK_SIZE};
use crate::error::{ClientError, SyncError};
use crate::NodeContext;

/// Outcome of one successful sync against one peer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub peer_height: i64,
    pub appended: u64,
    pub discovered: Vec<String>,
}

/// Grow the local chain to the peer's height.
///
/// Blocks are fetched in chunks and appended with proof of work skipped. The
/// first block that fails validation aborts the round; blocks appended before
/// it are kept and persisted.
pub async fn sync_with_peer(ctx: &NodeContext, peer: &str) -> Result<SyncReport, SyncError> {
    let mut client = NodeClient::connect(peer).await?;
    let peer_height = client.height().await?;
    let local = ctx.ledger.height().await?;

    let mut report = SyncReport {
        peer_height,
        ..SyncReport::default()
    };
    if local.is_some_and(|h| peer_height <= h as i64) || peer_height < 0 {
        debug!(peer, peer_height, local = ?local, "peer not ahead");
        return Ok(report);
    }

    let outcome = fetch_blocks(ctx, &mut client, local.map_or(0, |h| h + 1), peer_height as u64, &mut report).await;
    if report.appended > 0 {
        match ctx.ledger.persist().await? {
            Ok(()) => {}
            Err(e) => warn!(peer, error = %e, "failed to persist synced chain"),
        }
    }
    outcome?;

    report.discovered = discover_peers(ctx, &mut client, peer).await;
    info!(
        peer,
        peer_height,
        appended = report.appended,
        discovered = report.discovered.len(),
        "sync complete"
    );
    Ok(report)
}

async fn fetch_blocks(
    ctx: &NodeContext,
    client: &mut NodeClient,
    mut start: u64,
    peer_height: u64,
    report: &mut SyncReport,
) -> Result<(), SyncError> {
    while start <= peer_height {
        let end = (start + SYNC_CHUNK_SIZE - 1).min(peer_height);
        let blocks = client.blocks(start, end).await?;
        if blocks.is_empty() {
            return Err(SyncError::EmptyChunk { start, end });
        }
        debug!(start, end, received = blocks.len(), "fetched chunk");
        for block in blocks {
            let index = block.index;
            ctx.ledger.append_synced(block).await??;
            report.appended += 1;
            start = index + 1;
        }
    }
    Ok(())
}

/// Merge the peer's peer list into the registry. Best effort.
async fn discover_peers(ctx: &NodeContext, client: &mut NodeClient, peer: &str) -> Vec<String> {
    let listed = match timeout(PEER_DISCOVERY_TIMEOUT, client.peers()).await {
        Ok(Ok(listed)) => listed,
        Ok(Err(e)) => {
            debug!(peer, error = %e, "peer discovery failed");
            return Vec::new();
        }
        Err(_) => {
            debug!(peer, error = %ClientError::Timeout, "peer discovery failed");
            return Vec::new();
        }
    };
    listed
        .into_iter()
        .filter(|addr| !addr.trim().is_empty() && !ctx.is_self(addr))
        .filter(|addr| ctx.peers.add(addr))
        .collect()
}

/// One round over every known peer, in order. A failing peer is logged and
/// skipped; it stays registered.
pub async fn sync_with_peers(ctx: &NodeContext) -> Vec<(String, Result<SyncReport, SyncError>)> {
    let _round = ctx.sync_gate.lock().await;
    let mut results = Vec::new();
    for peer in ctx.peers.snapshot() {
        if ctx.is_self(&peer) {
            continue;
        }
        let outcome = sync_with_peer(ctx, &peer).await;
        if let Err(e) = &outcome {
            warn!(peer = %peer, error = %e, "sync with peer failed");
        }
        results.push((peer, outcome));
    }
    results
}

/// Run [`sync_with_peers`] every `every` until cancelled.
pub fn spawn_periodic(ctx: NodeContext, every: Duration, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    sync_with_peers(&ctx).await;
                }
            }
        }
        debug!("periodic sync stopped");
    })
}
