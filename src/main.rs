//! Multi-algorithm PoW chain node tool
//!
//! Inspects network parameters, genesis blocks and checkpoints, opens the
//! block index database and decodes merge-mining proofs submitted by miners.

use std::path::PathBuf;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use multipow_core::consensus::{difficulty, encode, Algorithm};
use multipow_core::node::{create_genesis_block, verify_genesis_hash, GenesisInfo, Network, NetworkParams};
use multipow_core::storage::db::IndexDb;

#[derive(Parser, Debug)]
#[command(name = "multipow-node")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Network parameters to use
    #[arg(short, long, value_enum, default_value_t = Network::Main)]
    network: Network,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the genesis block summary
    Genesis,
    /// Print the network parameters as JSON
    Params,
    /// Print the checkpoint table
    Checkpoints,
    /// Open (or create) a block index database and report the best tip
    Index {
        #[arg(short, long)]
        data_dir: PathBuf,
    },
    /// Decode a hex merge-mining proof for a child block of the given algorithm
    DecodeAuxpow {
        #[arg(short, long, default_value_t = Algorithm::Sha256d)]
        algo: Algorithm,
        hex: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let args = Args::parse();
    let params = NetworkParams::for_network(args.network);
    info!(network = %args.network, "multipow node starting");

    match args.command {
        Command::Genesis => {
            let genesis = create_genesis_block(args.network);
            if !verify_genesis_hash(&genesis, args.network) {
                return Err(format!("genesis block of {} does not match its known hash", args.network).into());
            }
            let info = GenesisInfo::new(args.network);
            println!("{}", serde_json::to_string_pretty(&info)?);
            println!("difficulty: {:.8}", difficulty(info.bits));
        }
        Command::Params => {
            println!("{}", serde_json::to_string_pretty(&params)?);
        }
        Command::Checkpoints => {
            for checkpoint in params.checkpoints.checkpoints() {
                println!("{:>8}  {}", checkpoint.height, checkpoint.hash);
            }
            println!("estimated blocks: {}", params.checkpoints.total_blocks_estimate());
        }
        Command::Index { data_dir } => {
            let db = IndexDb::open(data_dir)?;
            let state = db.load_state(params)?;
            if let Some(tip) = state.tip_node() {
                println!("height:     {}", tip.height);
                println!("tip:        {}", tip.hash);
                println!("chain work: {:#x}", tip.chain_work);
                println!("algorithm:  {}", tip.algorithm());
            }
            db.save_state(&state)?;
        }
        Command::DecodeAuxpow { algo, hex } => {
            let proof = encode::proof_from_hex(&hex, algo)?;
            println!("parent block:  {}", proof.parent_block_hash);
            println!("parent hash:   {}", proof.parent.hash());
            println!("coinbase hash: {}", proof.coinbase.hash());
            println!("chain index:   {}", proof.chain_index);
            println!("chain branch:  {} levels", proof.chain_branch.len());
            if let Some(header) = proof.parent.structured() {
                println!("parent difficulty: {:.8}", difficulty(header.bits));
            }
        }
    }

    Ok(())
}
