//! ember-cli — command-line front end for the Ember ledger.
//!
//! Every subcommand derives its data directory, wallet file, and listen
//! address from the `NODE_ID` environment variable; there is no other
//! configuration surface.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use ember_core::address::Address;
use ember_core::constants::{MINING_REWARD, SEED_NODE};
use ember_core::types::Transaction;
use ember_network::protocol::{Message, TxPayload};
use ember_network::{client, server, Node};
use ember_store::{Chain, NodeConfig, UtxoIndex};
use ember_wallet::Wallets;

/// Ember command-line front end: wallets, chain queries, and node startup.
#[derive(Parser)]
#[command(name = "ember-cli")]
#[command(version, about = "A didactic proof-of-work cryptocurrency core")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new keypair and add it to this node's wallet file.
    CreateWallet,
    /// List every address held in this node's wallet file.
    ListAddresses,
    /// Create a brand-new chain, seeded with a genesis block paying the
    /// mining reward to `address`.
    CreateBlockchain(AddressArg),
    /// Print every block on the main chain, tip first.
    PrintChain,
    /// Sum the unspent outputs locked to `address`.
    GetBalance(AddressArg),
    /// Build, sign, and either mine locally or relay a spend.
    Send(SendArgs),
    /// Rebuild the UTXO index from the chain and report its size.
    ReindexUtxo,
    /// Start this node's peer listener, optionally mining on its own
    /// behalf.
    StartNode(StartNodeArgs),
}

#[derive(Args)]
struct AddressArg {
    /// Base58Check address.
    #[arg(long)]
    address: String,
}

#[derive(Args)]
struct SendArgs {
    /// Sender's Base58Check address; its wallet entry must be in this
    /// node's wallet file.
    #[arg(long)]
    from: String,
    /// Recipient's Base58Check address.
    #[arg(long)]
    to: String,
    /// Amount to transfer.
    #[arg(long)]
    amount: u64,
    /// Mine the transaction into a new block on this node immediately,
    /// instead of relaying it to the seed node's mempool.
    #[arg(long)]
    mine: bool,
}

#[derive(Args)]
struct StartNodeArgs {
    /// Address to mine rewards to. Only non-primary nodes configured
    /// with a miner address attempt to mine.
    #[arg(long)]
    miner: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = NodeConfig::from_env().context("NODE_ID must be set")?;

    match cli.command {
        Commands::CreateWallet => create_wallet(&config),
        Commands::ListAddresses => list_addresses(&config),
        Commands::CreateBlockchain(args) => create_blockchain(&config, args),
        Commands::PrintChain => print_chain(&config),
        Commands::GetBalance(args) => get_balance(&config, args),
        Commands::Send(args) => send(&config, args),
        Commands::ReindexUtxo => reindex_utxo(&config),
        Commands::StartNode(args) => start_node(config, args).await,
    }
}

fn parse_address(s: &str) -> Result<Address> {
    s.parse::<Address>()
        .map_err(|e| anyhow::anyhow!("invalid address {s}: {e}"))
}

fn create_wallet(config: &NodeConfig) -> Result<()> {
    let mut wallets = Wallets::load(config.wallet_path()).context("loading wallet file")?;
    let address = wallets.create_wallet().context("creating wallet")?;
    println!("{address}");
    Ok(())
}

fn list_addresses(config: &NodeConfig) -> Result<()> {
    let wallets = Wallets::load(config.wallet_path()).context("loading wallet file")?;
    for address in wallets.addresses() {
        println!("{address}");
    }
    Ok(())
}

fn create_blockchain(config: &NodeConfig, args: AddressArg) -> Result<()> {
    let address = parse_address(&args.address)?;
    Chain::init(config.store_path(), address.pubkey_hash()).context("creating blockchain")?;
    println!("blockchain created, genesis reward paid to {address}");
    Ok(())
}

fn print_chain(config: &NodeConfig) -> Result<()> {
    let chain = Chain::open(config.store_path()).context("opening chain")?;
    for block in chain.iter() {
        let block = block.context("reading block")?;
        println!(
            "height={} hash={} prev={} nonce={} txs={}",
            block.height,
            block.hash,
            block.prev_hash,
            block.nonce,
            block.transactions.len()
        );
        for tx in &block.transactions {
            println!(
                "  tx {} ({} in, {} out, coinbase={})",
                tx.id,
                tx.inputs.len(),
                tx.outputs.len(),
                tx.is_coinbase()
            );
        }
    }
    Ok(())
}

fn get_balance(config: &NodeConfig, args: AddressArg) -> Result<()> {
    let address = parse_address(&args.address)?;
    let chain = Chain::open(config.store_path()).context("opening chain")?;
    let utxo = UtxoIndex(&chain);
    let balance: u64 = utxo
        .find_unspent_outputs(&address.pubkey_hash())
        .context("scanning UTXO index")?
        .iter()
        .map(|o| o.value)
        .sum();
    println!("balance of {address}: {balance}");
    Ok(())
}

fn send(config: &NodeConfig, args: SendArgs) -> Result<()> {
    let from = parse_address(&args.from)?;
    let to = parse_address(&args.to)?;

    let wallets = Wallets::load(config.wallet_path()).context("loading wallet file")?;
    let from_key = wallets.lookup(&from).context("looking up sender's keypair")?;

    let chain = Chain::open(config.store_path()).context("opening chain")?;
    let tx = ember_store::new_transaction(&chain, from_key, &to, args.amount)
        .context("building transaction")?;

    if args.mine {
        let coinbase = Transaction::new_coinbase(
            from.pubkey_hash(),
            format!("send -from {} -to {}", args.from, args.to).into_bytes(),
            MINING_REWARD,
        );
        let block = chain
            .mine_block(vec![coinbase, tx])
            .context("mining transaction into a new block")?;
        println!("mined block {} at height {}", block.hash, block.height);
    } else {
        let msg = Message::Tx(Box::new(TxPayload {
            from_addr: config.listen_addr(),
            transaction: tx.clone(),
        }));
        tokio_block_on_send(&msg)?;
        println!("relayed transaction {} to {SEED_NODE}", tx.id);
    }
    Ok(())
}

/// `send`'s CLI entry point is synchronous (the rest of the command surface
/// never touches the network); bridge into the one async call it needs.
fn tokio_block_on_send(msg: &Message) -> Result<()> {
    let rt = tokio::runtime::Handle::try_current();
    match rt {
        Ok(handle) => handle.block_on(client::send_once(SEED_NODE, msg)).map_err(Into::into),
        Err(_) => {
            let rt = tokio::runtime::Runtime::new().context("starting network runtime")?;
            rt.block_on(client::send_once(SEED_NODE, msg)).map_err(Into::into)
        }
    }
}

fn reindex_utxo(config: &NodeConfig) -> Result<()> {
    let chain = Chain::open(config.store_path()).context("opening chain")?;
    let utxo = UtxoIndex(&chain);
    utxo.reindex().context("reindexing UTXO set")?;
    println!("done, {} transactions in the UTXO set", utxo.count_transactions());
    Ok(())
}

async fn start_node(config: NodeConfig, args: StartNodeArgs) -> Result<()> {
    let miner_address = args
        .miner
        .map(|s| parse_address(&s).map(|a| a.pubkey_hash()))
        .transpose()?;

    let chain = Arc::new(Chain::open(config.store_path()).context("opening chain")?);
    let node = Arc::new(Node::new(config.listen_addr(), Arc::clone(&chain), miner_address));

    if !config.is_primary() && miner_address.is_some() {
        tracing::info!(address = %config.listen_addr(), "this node will mine when its mempool fills");
    }

    tokio::select! {
        result = server::serve(Arc::clone(&node)) => {
            result.context("peer server exited")?;
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown requested, flushing store");
            chain.flush().context("flushing store on shutdown")?;
        }
    }
    Ok(())
}

/// Waits for SIGINT (Ctrl-C everywhere) or SIGTERM (Unix only), the single
/// process lifecycle hook this binary owns.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        if let Ok(mut sig) = signal(SignalKind::terminate()) {
            sig.recv().await;
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
