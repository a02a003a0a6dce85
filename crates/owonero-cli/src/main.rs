use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use owonero_core::crypto::{
    generate_signing_key, parse_signing_key, public_key_pem, sign_transaction, signing_key_pem,
};
use owonero_core::Transaction;
use owonero_node::NodeClient;
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "owonero-cli")]
#[command(about = "Command-line client for an owonero node")]
struct Cli {
    /// Node address, host:port
    #[arg(short, long, global = true, default_value = "127.0.0.1:6969")]
    node: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the node's chain height
    Height,
    /// List known peers
    Peers,
    /// Add a peer to the node's registry
    AddPeer { addr: String },
    /// Remove a peer from the node's registry
    RemovePeer { addr: String },
    /// Show balance and totals for an address
    Wallet { address: String },
    /// Ask the node to sync with its peers
    Sync,
    /// List transactions waiting to be mined
    Pending,
    /// Write a fresh P-256 key pair as PEM files
    Keygen {
        /// Private key output; the public key goes next to it with `.pub`
        #[arg(long, default_value = "wallet.pem")]
        out: PathBuf,
    },
    /// Sign a transfer with a private key and queue it on the node
    SendTx {
        /// PEM private key (PKCS#8 or SEC1)
        #[arg(long)]
        key: PathBuf,
        #[arg(long)]
        to: String,
        #[arg(long)]
        amount: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Command::Keygen { out } = &cli.cmd {
        return keygen(out);
    }

    let mut client = NodeClient::connect(cli.node.as_str())
        .await
        .with_context(|| format!("connecting to {}", cli.node))?;
    debug!(height = client.greeting_height(), "connected");

    match cli.cmd {
        Command::Height => println!("{}", client.height().await?),
        Command::Peers => {
            for peer in client.peers().await? {
                println!("{peer}");
            }
        }
        Command::AddPeer { addr } => {
            client.add_peer(&addr).await?;
            println!("added {addr}");
        }
        Command::RemovePeer { addr } => {
            client.remove_peer(&addr).await?;
            println!("removed {addr}");
        }
        Command::Wallet { address } => {
            let info = client.wallet(&address).await?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        Command::Sync => println!("{}", client.sync().await?),
        Command::Pending => println!("{}", serde_json::to_string_pretty(&client.pending().await?)?),
        Command::SendTx { key, to, amount } => {
            let tx = signed_transfer(&key, &to, amount)?;
            client.send_tx(&tx).await?;
            println!("queued {amount} to {to}");
        }
        Command::Keygen { out } => keygen(&out)?,
    }
    Ok(())
}

fn keygen(out: &Path) -> Result<()> {
    if out.exists() {
        bail!("{} already exists", out.display());
    }
    let key = generate_signing_key();
    let public = out.with_extension("pub");
    fs::write(out, signing_key_pem(&key)?).with_context(|| format!("writing {}", out.display()))?;
    fs::write(&public, public_key_pem(&key)?).with_context(|| format!("writing {}", public.display()))?;
    println!("private key: {}", out.display());
    println!("public key:  {}", public.display());
    Ok(())
}

/// A transfer from the key's public half, signed with the key.
fn signed_transfer(key_path: &Path, to: &str, amount: u64) -> Result<Transaction> {
    let pem = fs::read_to_string(key_path).with_context(|| format!("reading {}", key_path.display()))?;
    let key = parse_signing_key(&pem)?;
    let mut tx = Transaction {
        from: public_key_pem(&key)?,
        to: to.trim().to_string(),
        amount,
        signature: String::new(),
    };
    sign_transaction(&mut tx, &key)?;
    Ok(tx)
}
