//! Network parameters
//!
//! One static parameter set per network. Nothing here is read from disk or
//! the environment; the binary only chooses which set to use.

use std::fmt;
use primitive_types::U256;
use serde::Serialize;
use crate::consensus::{Algorithm, BlockHeader, CheckpointSet};
use crate::crypto::Hash;
use super::genesis::create_genesis_block;

/// Network selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Main,
    Testnet,
    Regtest,
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Network::Main => "main",
            Network::Testnet => "testnet",
            Network::Regtest => "regtest",
        };
        f.write_str(name)
    }
}

/// Soft-fork activation rule
///
/// A block is post-fork when it is at least `height` and `required` of the
/// `window` blocks before it carry base version `min_version` or above.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ForkRule {
    pub height: u32,
    pub min_version: u32,
    pub required: u32,
    pub window: u32,
}

impl Default for ForkRule {
    fn default() -> Self {
        Self {
            height: 200,
            min_version: 4,
            required: 75,
            window: 100,
        }
    }
}

/// Consensus parameters of one network
#[derive(Debug, Clone, Serialize)]
pub struct NetworkParams {
    pub network: Network,
    pub genesis: BlockHeader,
    pub genesis_hash: Hash,
    /// Easiest allowed target, indexed by algorithm tag
    pow_limits: [U256; 8],
    /// Reject merge-mined blocks whose parent carries our own chain id
    pub strict_chain_id: bool,
    /// Chain id expected in merge-mined blocks
    pub auxpow_chain_id: u32,
    pub equihash_n: u32,
    pub equihash_k: u32,
    pub checkpoints: CheckpointSet,
    pub fork_rule: ForkRule,
}

impl NetworkParams {
    pub fn for_network(network: Network) -> Self {
        match network {
            Network::Main => Self::main(),
            Network::Testnet => Self::testnet(),
            Network::Regtest => Self::regtest(),
        }
    }

    pub fn main() -> Self {
        Self::build(Network::Main, 32, CheckpointSet::main())
    }

    pub fn testnet() -> Self {
        Self::build(Network::Testnet, 8, CheckpointSet::testnet())
    }

    pub fn regtest() -> Self {
        Self::build(Network::Regtest, 1, CheckpointSet::regtest())
    }

    fn build(network: Network, limit_shift: u32, checkpoints: CheckpointSet) -> Self {
        let genesis = create_genesis_block(network).header;
        let genesis_hash = genesis.hash();

        Self {
            network,
            genesis,
            genesis_hash,
            pow_limits: [U256::MAX >> limit_shift; 8],
            strict_chain_id: true,
            auxpow_chain_id: 0x5b,
            equihash_n: 200,
            equihash_k: 9,
            checkpoints,
            fork_rule: ForkRule::default(),
        }
    }

    /// Easiest target accepted for `algo`
    pub fn pow_limit(&self, algo: Algorithm) -> U256 {
        self.pow_limits[algo.tag() as usize]
    }

    pub fn set_pow_limit(&mut self, algo: Algorithm, limit: U256) {
        self.pow_limits[algo.tag() as usize] = limit;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_values() {
        for network in [Network::Main, Network::Testnet, Network::Regtest] {
            let params = NetworkParams::for_network(network);
            assert_eq!(params.network, network);
            assert!(params.strict_chain_id);
            assert_eq!(params.auxpow_chain_id, 0x5b);
            assert_eq!((params.equihash_n, params.equihash_k), (200, 9));
            assert_eq!(params.checkpoints.get(0), Some(params.genesis_hash));
        }
    }

    #[test]
    fn test_pow_limits() {
        let main = NetworkParams::main();
        let regtest = NetworkParams::regtest();
        for algo in Algorithm::ALL {
            assert_eq!(main.pow_limit(algo), U256::MAX >> 32);
            assert_eq!(regtest.pow_limit(algo), U256::MAX >> 1);
        }
        assert_eq!(NetworkParams::testnet().pow_limit(Algorithm::Argon2), U256::MAX >> 8);

        let mut params = NetworkParams::main();
        params.set_pow_limit(Algorithm::X17, U256::MAX >> 20);
        assert_eq!(params.pow_limit(Algorithm::X17), U256::MAX >> 20);
        assert_eq!(params.pow_limit(Algorithm::Scrypt), U256::MAX >> 32);
    }

    #[test]
    fn test_network_display() {
        assert_eq!(Network::Main.to_string(), "main");
        assert_eq!(Network::Regtest.to_string(), "regtest");
    }

    #[test]
    fn test_params_serialize() {
        let json = serde_json::to_value(NetworkParams::regtest()).unwrap();
        assert_eq!(json["network"], "regtest");
        assert_eq!(json["auxpow_chain_id"], 0x5b);
    }
}
