//! Block header structures
//!
//! The version word packs several fields:
//! bits 0-7 base version, bit 8 auxpow flag, bits 9-11 algorithm tag,
//! bit 12 update-scaling-factor flag, bits 16 and up chain id.

use serde::{Deserialize, Serialize};
use crate::constants::{EQUIHASH_SOLUTION_SIZE, HEADER_SIZE};
use crate::crypto::{sha256d, Hash};
use crate::validation::Transaction;
use super::algorithm::{Algorithm, PowHasher};
use super::auxpow::MergeMineProof;
use super::encode::write_compact_size;

/// Auxpow-present flag
pub const VERSION_AUXPOW: u32 = 1 << 8;
/// Shift of the 3-bit algorithm tag
pub const VERSION_ALGO_SHIFT: u32 = 9;
/// Mask of the algorithm tag
pub const VERSION_ALGO_MASK: u32 = 7 << VERSION_ALGO_SHIFT;
/// Update-scaling-factor flag
pub const VERSION_UPDATE_SSF: u32 = 1 << 12;
/// Shift of the chain id
pub const VERSION_CHAIN_SHIFT: u32 = 16;

/// Nonce material of a structured header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PowNonce {
    /// 32-bit nonce used by every algorithm except Equihash
    Compact(u32),
    /// Equihash parent headers: 256-bit nonce, solution and reserved hash
    Equihash {
        reserved: Hash,
        nonce: Hash,
        solution: Vec<u8>,
    },
}

/// Block header
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockHeader {
    /// Packed version word
    pub version: u32,
    /// Hash of the previous block
    pub prev_hash: Hash,
    /// Merkle root of all transactions
    pub merkle_root: Hash,
    /// Block timestamp (seconds since Unix epoch)
    pub time: u32,
    /// Difficulty target (compact representation)
    pub bits: u32,
    /// Nonce, or Equihash nonce and solution
    pub nonce: PowNonce,
}

impl BlockHeader {
    /// Create a new header with a 32-bit nonce
    pub fn new(
        version: u32,
        prev_hash: Hash,
        merkle_root: Hash,
        time: u32,
        bits: u32,
        nonce: u32,
    ) -> Self {
        Self {
            version,
            prev_hash,
            merkle_root,
            time,
            bits,
            nonce: PowNonce::Compact(nonce),
        }
    }

    /// The standard version number (low 8 bits)
    pub fn base_version(&self) -> u32 {
        self.version & 0xff
    }

    /// Algorithm named by the version bits
    pub fn algorithm(&self) -> Algorithm {
        Algorithm::from_tag((self.version & VERSION_ALGO_MASK) >> VERSION_ALGO_SHIFT)
    }

    pub fn set_algorithm(&mut self, algo: Algorithm) {
        self.version = (self.version & !VERSION_ALGO_MASK) | (algo.tag() << VERSION_ALGO_SHIFT);
    }

    pub fn is_auxpow(&self) -> bool {
        self.version & VERSION_AUXPOW != 0
    }

    pub fn set_auxpow(&mut self, auxpow: bool) {
        if auxpow {
            self.version |= VERSION_AUXPOW;
        } else {
            self.version &= !VERSION_AUXPOW;
        }
    }

    pub fn is_update_ssf(&self) -> bool {
        self.version & VERSION_UPDATE_SSF != 0
    }

    pub fn set_update_ssf(&mut self) {
        self.version |= VERSION_UPDATE_SSF;
    }

    /// Merge-mining chain id (bits 16 and up)
    pub fn chain_id(&self) -> u32 {
        self.version >> VERSION_CHAIN_SHIFT
    }

    /// Replace the chain id, keeping the low 16 bits
    pub fn set_chain_id(&mut self, id: u32) {
        self.version %= 1 << VERSION_CHAIN_SHIFT;
        self.version |= id << VERSION_CHAIN_SHIFT;
    }

    /// 32-bit nonce, if this header has one
    pub fn compact_nonce(&self) -> Option<u32> {
        match self.nonce {
            PowNonce::Compact(n) => Some(n),
            PowNonce::Equihash { .. } => None,
        }
    }

    /// Serialize the header for hashing
    ///
    /// 80 bytes for a 32-bit nonce. Equihash headers use the extended
    /// layout: version, prev, merkle, reserved, time, bits, 256-bit nonce,
    /// then the length-prefixed solution. A solution of any other length
    /// than 1344 bytes is replaced by a single zero byte.
    pub fn to_bytes(&self) -> Vec<u8> {
        match &self.nonce {
            PowNonce::Compact(nonce) => {
                let mut bytes = Vec::with_capacity(HEADER_SIZE);
                self.write_prefix(&mut bytes, None);
                bytes.extend_from_slice(&nonce.to_le_bytes());
                bytes
            }
            PowNonce::Equihash { solution, .. } => {
                let mut bytes = self.equihash_input().unwrap_or_default();
                if solution.len() == EQUIHASH_SOLUTION_SIZE {
                    write_compact_size(&mut bytes, solution.len() as u64);
                    bytes.extend_from_slice(solution);
                } else {
                    bytes.push(0);
                }
                bytes
            }
        }
    }

    /// The 140-byte Equihash seed state (header without the solution)
    pub fn equihash_input(&self) -> Option<Vec<u8>> {
        match &self.nonce {
            PowNonce::Compact(_) => None,
            PowNonce::Equihash { reserved, nonce, .. } => {
                let mut bytes = Vec::with_capacity(140);
                self.write_prefix(&mut bytes, Some(reserved));
                bytes.extend_from_slice(&nonce.0);
                Some(bytes)
            }
        }
    }

    /// Equihash solution bytes
    pub fn solution(&self) -> Option<&[u8]> {
        match &self.nonce {
            PowNonce::Compact(_) => None,
            PowNonce::Equihash { solution, .. } => Some(solution),
        }
    }

    fn write_prefix(&self, bytes: &mut Vec<u8>, reserved: Option<&Hash>) {
        bytes.extend_from_slice(&self.version.to_le_bytes());
        bytes.extend_from_slice(&self.prev_hash.0);
        bytes.extend_from_slice(&self.merkle_root.0);
        if let Some(reserved) = reserved {
            bytes.extend_from_slice(&reserved.0);
        }
        bytes.extend_from_slice(&self.time.to_le_bytes());
        bytes.extend_from_slice(&self.bits.to_le_bytes());
    }

    /// Block identity: SHA-256d of the serialized header
    pub fn hash(&self) -> Hash {
        sha256d(&self.to_bytes())
    }

    /// Proof-of-work hash under `algo`
    ///
    /// SHA-256d and Equihash use the identity hash; everything else goes
    /// through the supplied hasher.
    pub fn pow_hash<H: PowHasher + ?Sized>(&self, algo: Algorithm, hasher: &H) -> Hash {
        match algo {
            Algorithm::Sha256d | Algorithm::Equihash => self.hash(),
            _ => hasher.pow_hash(algo, &self.to_bytes()),
        }
    }

    pub fn block_time(&self) -> i64 {
        self.time as i64
    }
}

/// A parent-chain header: either structured or the parent's native bytes
///
/// Opaque headers only support byte searches and hashing over the raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeaderBody {
    Structured(BlockHeader),
    Opaque(Vec<u8>),
}

impl HeaderBody {
    pub fn structured(&self) -> Option<&BlockHeader> {
        match self {
            HeaderBody::Structured(header) => Some(header),
            HeaderBody::Opaque(_) => None,
        }
    }

    pub fn opaque(&self) -> Option<&[u8]> {
        match self {
            HeaderBody::Structured(_) => None,
            HeaderBody::Opaque(bytes) => Some(bytes),
        }
    }

    /// Chain id of a structured parent; opaque parents carry none
    pub fn chain_id(&self) -> Option<u32> {
        self.structured().map(BlockHeader::chain_id)
    }

    pub fn hash(&self) -> Hash {
        match self {
            HeaderBody::Structured(header) => header.hash(),
            HeaderBody::Opaque(bytes) => sha256d(bytes),
        }
    }

    /// Proof-of-work hash under the child block's algorithm
    pub fn pow_hash<H: PowHasher + ?Sized>(&self, algo: Algorithm, hasher: &H) -> Hash {
        match self {
            HeaderBody::Structured(header) => header.pow_hash(algo, hasher),
            HeaderBody::Opaque(bytes) => match algo {
                Algorithm::Sha256d | Algorithm::Equihash => sha256d(bytes),
                _ => hasher.pow_hash(algo, bytes),
            },
        }
    }
}

/// A complete block: header, optional merge-mining proof and transactions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    /// Block header
    pub header: BlockHeader,
    /// Merge-mining proof, present iff the header's auxpow flag is set
    pub auxpow: Option<MergeMineProof>,
    /// List of transactions in this block
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Create a new block
    pub fn new(header: BlockHeader, transactions: Vec<Transaction>) -> Self {
        Self { header, auxpow: None, transactions }
    }

    /// Attach or remove a merge-mining proof, keeping the version flag in step
    pub fn set_auxpow(&mut self, auxpow: Option<MergeMineProof>) {
        self.header.set_auxpow(auxpow.is_some());
        self.auxpow = auxpow;
    }

    /// Get the block hash
    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    /// Merkle root over the transaction hashes
    pub fn compute_merkle_root(&self) -> Hash {
        let hashes: Vec<Hash> = self.transactions.iter().map(Transaction::hash).collect();
        crate::crypto::compute_merkle_root(&hashes)
    }

    /// Check if this is the genesis block
    pub fn is_genesis(&self) -> bool {
        self.header.prev_hash == Hash::zero()
    }
}
