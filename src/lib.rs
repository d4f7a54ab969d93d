//! Multi-algorithm PoW Chain Core Library
//!
//! Consensus-validation core for a chain that accepts blocks mined with eight
//! interchangeable hashing algorithms and merge-mined (auxpow) against a
//! foreign parent chain.
//!
//! The crate covers the header data model, the merge-mining proof protocol,
//! the weighted-work block index, the active chain view and the checkpoint
//! table. Hash algorithm implementations are supplied by the caller through
//! [`consensus::PowHasher`] and [`consensus::EquihashVerifier`].

pub mod consensus;
pub mod crypto;
pub mod validation;
pub mod storage;
pub mod node;

/// Protocol constants - HARD-CODED, NEVER CONFIGURABLE
pub mod constants {
    /// Merge-mining marker that precedes the chain merkle root in a parent coinbase
    pub const MERGED_MINING_HEADER: [u8; 4] = [0xfa, 0xbe, b'm', b'm'];

    /// Maximum number of levels in the chain merkle branch of an auxpow
    pub const MAX_CHAIN_MERKLE_BRANCH: usize = 30;

    /// Without a marker, the chain root must start within this many bytes of the script
    pub const LEGACY_ROOT_MAX_OFFSET: usize = 20;

    /// Upper bound for opaque parent headers and raw coinbase payloads
    pub const MAX_OPAQUE_PAYLOAD: usize = 1000;

    /// Number of blocks used for the median-time-past
    pub const MEDIAN_TIME_SPAN: usize = 11;

    /// Window for the average block work diagnostic
    pub const AVERAGE_WORK_WINDOW: usize = 50;

    /// Equihash solution length for (n, k) = (200, 9)
    pub const EQUIHASH_SOLUTION_SIZE: usize = 1344;

    /// Size of the canonical Equihash header with a full solution
    pub const EQUIHASH_HEADER_SIZE: usize = 1487;

    /// Size of the canonical Equihash header when the solution is absent
    pub const EQUIHASH_DEGRADED_HEADER_SIZE: usize = 141;

    /// Size of the structured header prefix hashed by most algorithms
    pub const HEADER_SIZE: usize = 80;

    /// Base units per coin
    pub const COIN: i64 = 100_000_000;

    /// Expected post-checkpoint slowdown of transaction verification
    pub const SIGCHECK_VERIFICATION_FACTOR: f64 = 5.0;
}
