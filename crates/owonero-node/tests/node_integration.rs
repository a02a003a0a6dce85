mod helpers;

use futures::{SinkExt, StreamExt};
use helpers::{forked_chain, ledger_with, mined_chain, start_node};
use owonero_core::crypto::{generate_signing_key, public_key_pem, sign_transaction};
use owonero_core::pow::mine_block;
use owonero_core::{DifficultyController, Ledger, Transaction};
use owonero_node::protocol::{Command, Share};
use owonero_node::sync::{sync_with_peer, sync_with_peers};
use owonero_node::NodeClient;
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LinesCodec};

#[tokio::test]
async fn test_greeting_and_height() -> anyhow::Result<()> {
    let node = start_node(ledger_with(2), vec![]).await?;
    let mut client = NodeClient::connect(node.addr).await?;
    assert_eq!(client.greeting_height(), 2);
    assert_eq!(client.height().await?, 2);
    Ok(())
}

#[tokio::test]
async fn test_empty_node_reports_minus_one() -> anyhow::Result<()> {
    let node = start_node(Ledger::empty(DifficultyController::default()), vec![]).await?;
    let mut client = NodeClient::connect(node.addr).await?;
    assert_eq!(client.greeting_height(), -1);
    assert_eq!(client.height().await?, -1);
    assert!(client.chain().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_two_node_sync() -> anyhow::Result<()> {
    let a = start_node(ledger_with(5), vec!["10.9.9.9:6969".to_string()]).await?;
    let b = start_node(
        Ledger::empty(DifficultyController::default()),
        vec![a.addr_string()],
    )
    .await?;

    let results = sync_with_peers(&b.ctx).await;
    assert_eq!(results.len(), 1);
    let report = results[0].1.as_ref().expect("sync should succeed");
    assert_eq!(report.peer_height, 5);
    assert_eq!(report.appended, 6);

    assert_eq!(b.ctx.ledger.height().await?, Some(5));
    let chain_a = a.ctx.ledger.chain().await?;
    let chain_b = b.ctx.ledger.chain().await?;
    let hashes_a: Vec<_> = chain_a.iter().map(|blk| &blk.hash).collect();
    let hashes_b: Vec<_> = chain_b.iter().map(|blk| &blk.hash).collect();
    assert_eq!(hashes_a, hashes_b);

    // Synced blocks pass skip-PoW validation in order.
    let replayed = Ledger::verified(chain_b, DifficultyController::default())?;
    assert_eq!(replayed.height(), Some(5));

    // A's peer list was merged, without B adding itself.
    let peers = b.ctx.peers.snapshot();
    assert!(peers.contains(&"10.9.9.9:6969".to_string()));
    assert!(!peers.contains(&b.addr_string()));

    // The synced chain was persisted.
    let saved = owonero_storage::load_from_file(
        b.dir.path().join("blockchain.json"),
        DifficultyController::default(),
    )?;
    assert_eq!(saved.height(), Some(5));
    Ok(())
}

#[tokio::test]
async fn test_sync_catches_up_partial_chain() -> anyhow::Result<()> {
    let full = mined_chain(250);
    let a = start_node(
        Ledger::from_trusted(full.clone(), DifficultyController::default()),
        vec![],
    )
    .await?;
    let b = start_node(
        Ledger::from_trusted(full[..40].to_vec(), DifficultyController::default()),
        vec![],
    )
    .await?;

    let report = sync_with_peer(&b.ctx, &a.addr_string()).await?;
    assert_eq!(report.appended, 211);
    assert_eq!(b.ctx.ledger.tip().await?, full.last().cloned());

    // Already level: nothing to do.
    let again = sync_with_peer(&b.ctx, &a.addr_string()).await?;
    assert_eq!(again.appended, 0);
    Ok(())
}

#[tokio::test]
async fn test_sync_skips_unreachable_peer() -> anyhow::Result<()> {
    let a = start_node(ledger_with(3), vec![]).await?;
    let b = start_node(
        Ledger::empty(DifficultyController::default()),
        vec!["127.0.0.1:1".to_string(), a.addr_string()],
    )
    .await?;
    let results = sync_with_peers(&b.ctx).await;
    assert!(results[0].1.is_err());
    assert!(results[1].1.is_ok());
    assert_eq!(b.ctx.ledger.height().await?, Some(3));
    // A transient failure does not evict the peer.
    assert!(b.ctx.peers.snapshot().contains(&"127.0.0.1:1".to_string()));
    Ok(())
}

#[tokio::test]
async fn test_sync_aborts_on_forked_peer() -> anyhow::Result<()> {
    let ours = mined_chain(3);
    let theirs = forked_chain(6);
    let a = start_node(Ledger::from_trusted(theirs, DifficultyController::default()), vec![]).await?;
    let b = start_node(Ledger::from_trusted(ours.clone(), DifficultyController::default()), vec![]).await?;

    assert!(sync_with_peer(&b.ctx, &a.addr_string()).await.is_err());
    assert_eq!(b.ctx.ledger.chain().await?, ours);
    Ok(())
}

#[tokio::test]
async fn test_submit_block_with_wrong_parent() -> anyhow::Result<()> {
    let node = start_node(ledger_with(2), vec![]).await?;
    let mut client = NodeClient::connect(node.addr).await?;
    let tip_before = node.ctx.ledger.tip().await?.expect("tip");

    let stale_parent = mined_chain(1).remove(0);
    let mut block = mine_block(&stale_parent, vec![], 1, None, || false)
        .expect("mines")
        .block;
    block.index = tip_before.index + 1;
    block.prev_hash = "00".repeat(32);
    block.hash = block.compute_hash();

    assert_eq!(client.submit_block(&block).await?, "error: block invalid");
    assert_eq!(node.ctx.ledger.tip().await?, Some(tip_before));
    Ok(())
}

#[tokio::test]
async fn test_submit_valid_block() -> anyhow::Result<()> {
    let node = start_node(ledger_with(1), vec![]).await?;
    let mut client = NodeClient::connect(node.addr).await?;
    let tip = node.ctx.ledger.tip().await?.expect("tip");
    let block = mine_block(&tip, vec![Transaction::coinbase("OWO-a", 1)], 1, None, || false)
        .expect("mines")
        .block;
    assert_eq!(client.submit_block(&block).await?, "ok");
    assert_eq!(client.height().await?, 2);

    let wallet = client.wallet("OWO-a").await?;
    assert_eq!(wallet.balance, 1);
    assert_eq!(wallet.total_received, 1);
    Ok(())
}

#[tokio::test]
async fn test_protocol_errors_keep_connection_open() -> anyhow::Result<()> {
    let node = start_node(ledger_with(1), vec![]).await?;
    let stream = TcpStream::connect(node.addr).await?;
    let mut framed = Framed::new(stream, LinesCodec::new());
    let greeting = framed.next().await.expect("greeting")?;
    assert_eq!(greeting, "owonero-daemon height=1");

    framed.send("frobnicate").await?;
    let reply = framed.next().await.expect("reply")?;
    assert!(reply.starts_with("unknown command. supported: "));

    framed.send("submitblock").await?;
    framed.send("{not json").await?;
    let reply = framed.next().await.expect("reply")?;
    assert!(reply.starts_with("error: cannot parse block json"));

    framed.send("getblocks").await?;
    framed.send("9 2").await?;
    assert_eq!(framed.next().await.expect("reply")?, "error: invalid block range");

    framed.send("addpeer").await?;
    framed.send("").await?;
    assert_eq!(framed.next().await.expect("reply")?, "error: empty peer address");

    framed.send("getheight").await?;
    assert_eq!(framed.next().await.expect("reply")?, "1");
    Ok(())
}

#[tokio::test]
async fn test_getblocks_ranges() -> anyhow::Result<()> {
    let node = start_node(ledger_with(5), vec![]).await?;
    let mut client = NodeClient::connect(node.addr).await?;
    let blocks = client.blocks(1, 3).await?;
    assert_eq!(blocks.iter().map(|b| b.index).collect::<Vec<_>>(), vec![1, 2, 3]);
    assert_eq!(client.blocks(4, 100).await?.len(), 2);
    assert!(client.blocks(50, 60).await?.is_empty());
    let reply = client.request(Command::GetBlocks, Some("0 0")).await?;
    assert!(reply.starts_with("[{\"index\":0"));
    Ok(())
}

#[tokio::test]
async fn test_peer_commands() -> anyhow::Result<()> {
    let node = start_node(ledger_with(0), vec![]).await?;
    let mut client = NodeClient::connect(node.addr).await?;
    client.add_peer("10.0.0.5:6969").await?;
    client.add_peer("10.0.0.5:6969").await?;
    assert_eq!(client.peers().await?, vec!["10.0.0.5:6969".to_string()]);
    // A node never lists itself.
    client.add_peer(&node.addr_string()).await?;
    assert_eq!(client.peers().await?.len(), 1);
    client.remove_peer("10.0.0.5:6969").await?;
    assert!(client.peers().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_wallet_miner_and_sync_commands() -> anyhow::Result<()> {
    let node = start_node(ledger_with(1), vec![]).await?;
    let mut client = NodeClient::connect(node.addr).await?;
    assert_eq!(
        client.request(Command::GetWallet, Some("nobody")).await?,
        "error: wallet not found"
    );
    assert_eq!(
        client.request(Command::GetWallet, Some(" ")).await?,
        "error: empty wallet address"
    );
    client.miner_active().await?;
    assert_eq!(node.ctx.miners.snapshot(), vec!["127.0.0.1".to_string()]);
    assert_eq!(client.sync().await?, "sync initiated");
    Ok(())
}

#[tokio::test]
async fn test_sendtx_queues_verified_transactions() -> anyhow::Result<()> {
    let node = start_node(ledger_with(0), vec![]).await?;
    let mut client = NodeClient::connect(node.addr).await?;
    let key = generate_signing_key();
    let mut tx = Transaction {
        from: public_key_pem(&key)?,
        to: "OWO-b".into(),
        amount: 0,
        signature: String::new(),
    };
    sign_transaction(&mut tx, &key)?;
    client.send_tx(&tx).await?;

    let mut forged = tx.clone();
    forged.to = "OWO-thief".into();
    let reply = client
        .request(Command::SendTx, Some(&serde_json::to_string(&forged)?))
        .await?;
    assert_eq!(reply, "error: invalid transaction signature");
    assert_eq!(client.pending().await?, vec![tx]);
    Ok(())
}

#[tokio::test]
async fn test_submit_share() -> anyhow::Result<()> {
    let node = start_node(ledger_with(0), vec![]).await?;
    let mut client = NodeClient::connect(node.addr).await?;
    let tip = node.ctx.ledger.tip().await?.expect("tip");
    let block = mine_block(&tip, vec![Transaction::coinbase("pool", 100)], 1, None, || false)
        .expect("mines")
        .block;
    let share = Share {
        wallet: "OWO-worker".into(),
        nonce: block.nonce,
        attempts: 42,
        block: block.clone(),
    };
    assert_eq!(client.submit_share(&share).await?, "ok");
    assert_eq!(node.ctx.shares.snapshot().attempts["OWO-worker"], 42);
    // Difficulty 1 is also the network difficulty here, so the share became block 1.
    assert_eq!(node.ctx.ledger.tip().await?, Some(block));

    let mut bad = share;
    bad.block.prev_hash = "11".repeat(32);
    assert_eq!(client.submit_share(&bad).await?, "error: invalid share");
    Ok(())
}

#[tokio::test]
async fn test_share_below_network_difficulty_only_credits() -> anyhow::Result<()> {
    let controller = DifficultyController {
        min: 3,
        ..DifficultyController::default()
    };
    let node = start_node(Ledger::from_trusted(mined_chain(0), controller), vec![]).await?;
    assert_eq!(node.ctx.ledger.difficulty().await?, 3);
    let mut client = NodeClient::connect(node.addr).await?;
    let tip = node.ctx.ledger.tip().await?.expect("tip");

    // Share difficulty is 1; keep mining until the hash misses the full target.
    let weak = loop {
        let mined = mine_block(&tip, vec![Transaction::coinbase("pool", 100)], 1, None, || false)
            .expect("mines")
            .block;
        if !mined.hash.starts_with("000") {
            break mined;
        }
    };
    let share = Share {
        wallet: "OWO-small".into(),
        nonce: weak.nonce,
        attempts: 7,
        block: weak,
    };
    assert_eq!(client.submit_share(&share).await?, "ok");
    assert_eq!(node.ctx.ledger.height().await?, Some(0));
    assert_eq!(node.ctx.shares.snapshot().attempts["OWO-small"], 7);

    let strong = mine_block(&tip, vec![Transaction::coinbase("pool", 100)], 3, None, || false)
        .expect("mines")
        .block;
    let share = Share {
        wallet: "OWO-lucky".into(),
        nonce: strong.nonce,
        attempts: 9,
        block: strong.clone(),
    };
    assert_eq!(client.submit_share(&share).await?, "ok");
    assert_eq!(node.ctx.ledger.tip().await?, Some(strong));
    assert_eq!(node.ctx.shares.snapshot().total, 16);
    Ok(())
}
