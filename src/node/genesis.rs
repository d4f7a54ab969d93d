//! Genesis blocks
//!
//! Rebuilds the genesis block of each network from its coinbase transaction.
//! The result must hash to the value every deployed node already knows.

use serde::Serialize;
use crate::consensus::{Block, BlockHeader};
use crate::constants::COIN;
use crate::crypto::{compute_merkle_root, Hash};
use crate::validation::{push_int, push_slice, Transaction, TxOut, OP_CHECKSIG};
use super::params::Network;

const MAIN_TIMESTAMP_TEXT: &str = "13/July/2014, with memory of the past, we look to the future. TDR";
const TEST_TIMESTAMP_TEXT: &str = "Testing Testnet";

/// Uncompressed public key paid by every genesis coinbase
const GENESIS_OUTPUT_PUBKEY: &str = "04f88a76429dad346a10ecb5d36fcbf50bc2e009870e20c1a6df8db743e0b994afc1f91e079be8acc380b0ee7765519906e3d781519e9db48259f64160104939d8";

const GENESIS_VERSION: u32 = 1;

/// Known genesis hashes
pub const MAIN_GENESIS_HASH: &str = "c1fb746e87e89ae75bdec2ef0639a1f6786744639ce3d0ece1dcf979b79137cb";
pub const TESTNET_GENESIS_HASH: &str = "45ccef675b070c6eae865e1fcd3978253ec52a960af9abbb91bd1d935513e5be";
pub const REGTEST_GENESIS_HASH: &str = "168329a349fc93768bfb02e536bbe1e1847d77a65764564552122fa9268d8841";

/// Header fields that differ per network: (time, bits, nonce)
fn header_fields(network: Network) -> (u32, u32, u32) {
    match network {
        Network::Main => (1_405_274_442, 0x1d00ffff, 14_385_103),
        Network::Testnet => (1_534_873_293, 0x1e0ffff0, 181_283),
        Network::Regtest => (1_405_274_400, 0x207fffff, 713_058),
    }
}

fn genesis_coinbase(text: &str) -> Transaction {
    let mut script_sig = Vec::new();
    push_int(&mut script_sig, 486_604_799);
    push_int(&mut script_sig, 4);
    push_slice(&mut script_sig, text.as_bytes());

    // constant hex, cannot fail
    let pubkey = hex::decode(GENESIS_OUTPUT_PUBKEY).unwrap_or_default();
    let mut script_pubkey = Vec::with_capacity(pubkey.len() + 2);
    push_slice(&mut script_pubkey, &pubkey);
    script_pubkey.push(OP_CHECKSIG);

    Transaction::coinbase(
        script_sig,
        vec![TxOut {
            value: 20 * COIN,
            script_pubkey,
        }],
    )
}

/// Create the genesis block of `network`
///
/// Byte-for-byte reproducible.
pub fn create_genesis_block(network: Network) -> Block {
    let text = match network {
        Network::Main => MAIN_TIMESTAMP_TEXT,
        Network::Testnet | Network::Regtest => TEST_TIMESTAMP_TEXT,
    };
    let coinbase = genesis_coinbase(text);
    let merkle_root = compute_merkle_root(&[coinbase.hash()]);
    let (time, bits, nonce) = header_fields(network);

    let header = BlockHeader::new(GENESIS_VERSION, Hash::zero(), merkle_root, time, bits, nonce);
    Block::new(header, vec![coinbase])
}

/// Hash every node of `network` expects for its genesis block
pub fn expected_genesis_hash(network: Network) -> Hash {
    let hex = match network {
        Network::Main => MAIN_GENESIS_HASH,
        Network::Testnet => TESTNET_GENESIS_HASH,
        Network::Regtest => REGTEST_GENESIS_HASH,
    };
    Hash::from_hex(hex).unwrap_or_default()
}

/// Verify genesis block matches expected hash
pub fn verify_genesis_hash(block: &Block, network: Network) -> bool {
    block.hash() == expected_genesis_hash(network)
}

/// Genesis block summary
#[derive(Debug, Clone, Serialize)]
pub struct GenesisInfo {
    pub network: Network,
    pub hash: Hash,
    pub merkle_root: Hash,
    pub time: u32,
    pub bits: u32,
    pub nonce: Option<u32>,
    pub reward: i64,
}

impl GenesisInfo {
    pub fn new(network: Network) -> Self {
        let genesis = create_genesis_block(network);
        Self {
            network,
            hash: genesis.hash(),
            merkle_root: genesis.header.merkle_root,
            time: genesis.header.time,
            bits: genesis.header.bits,
            nonce: genesis.header.compact_nonce(),
            reward: genesis.transactions.iter().map(Transaction::total_output_value).sum(),
        }
    }
}
