use anyhow::Context;
use clap::Parser;
use owonero_core::Ledger;
use owonero_node::config::{Args, Settings};
use owonero_node::{pool, server, service, sync, NodeContext, PeerRegistry};
use owonero_storage::open_store;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Settings::resolve(Args::parse())?;
    let store = open_store(settings.store, &settings.chain_path)?;
    let ledger = if settings.no_init {
        info!("starting with an empty chain");
        Ledger::empty(settings.controller)
    } else {
        Ledger::load(store.as_ref(), settings.controller)
            .with_context(|| format!("loading chain from {}", settings.chain_path.display()))?
    };

    let handle = service::spawn(ledger, store);
    let ctx = NodeContext::new(handle, PeerRegistry::new(settings.peers.clone()), settings.bind_addr());
    let listener = tokio::net::TcpListener::bind(settings.bind_addr())
        .await
        .with_context(|| format!("binding {}", settings.bind_addr()))?;

    let cancel = CancellationToken::new();
    let server = tokio::spawn(server::serve(listener, ctx.clone(), cancel.clone()));

    if !ctx.peers.is_empty() {
        info!(peers = ctx.peers.len(), "initial sync");
        sync::sync_with_peers(&ctx).await;
    }
    if !settings.standalone {
        sync::spawn_periodic(ctx.clone(), settings.sync_interval, cancel.clone());
    }
    if settings.pool {
        tokio::spawn(pool::run_pool_miner(ctx.clone(), cancel.clone()));
    }

    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                warn!(error = %e, "cannot listen for ctrl-c");
            }
            info!("shutting down");
        }
        res = server => {
            res??;
        }
    }
    cancel.cancel();

    match ctx.ledger.persist().await {
        Ok(Ok(())) => info!("chain saved"),
        Ok(Err(e)) => warn!(error = %e, "final save failed"),
        Err(e) => warn!(error = %e, "ledger service unavailable at shutdown"),
    }
    Ok(())
}
