//! Merge-mining proofs (auxpow)
//!
//! A block on this chain can be mined as a side effect of mining a block on
//! a parent chain. The parent's coinbase commits to the root of a "chain
//! merkle tree" whose leaves are the block hashes of every merge-mined
//! chain. The proof carries the coinbase, its branch into the parent block,
//! the chain branch and the parent header.

use serde::{Deserialize, Serialize};
use tracing::debug;
use crate::constants::{
    LEGACY_ROOT_MAX_OFFSET, MAX_CHAIN_MERKLE_BRANCH, MAX_OPAQUE_PAYLOAD, MERGED_MINING_HEADER,
};
use crate::crypto::{check_merkle_branch, Hash, MerkleHasher};
use crate::node::NetworkParams;
use crate::validation::CoinbaseTx;
use super::algorithm::Algorithm;
use super::block::HeaderBody;
use super::validation::ValidationError;

/// Wire layout of a proof, chosen from the child block's algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProofFormat {
    /// Bitcoin-style coinbase and 80-byte parent header
    Bitcoin,
    /// Raw coinbase bytes and an Equihash parent header
    Equihash,
    /// Raw coinbase hashed with Keccak and an opaque parent header
    Cryptonight,
}

impl ProofFormat {
    pub fn for_algorithm(algo: Algorithm) -> Self {
        match algo {
            Algorithm::Equihash => ProofFormat::Equihash,
            Algorithm::Cryptonight => ProofFormat::Cryptonight,
            _ => ProofFormat::Bitcoin,
        }
    }
}

/// Proof that a block was merge-mined inside a parent-chain block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeMineProof {
    /// The parent block's coinbase
    pub coinbase: CoinbaseTx,
    /// Parent block hash as recorded by the miner (informational)
    pub parent_block_hash: Hash,
    /// Branch from the coinbase to the parent's merkle root
    pub merkle_branch: Vec<Hash>,
    /// Position of the coinbase in the parent block, must be 0
    pub index: i32,
    /// Branch from our block hash to the chain merkle root
    pub chain_branch: Vec<Hash>,
    /// Slot of our block in the chain merkle tree
    pub chain_index: i32,
    /// Header of the parent block carrying the actual work
    pub parent: HeaderBody,
}

impl MergeMineProof {
    /// Verify the proof's merkle commitments for `aux_hash` on chain `chain_id`
    ///
    /// This does not check the parent's proof of work.
    pub fn check(
        &self,
        aux_hash: Hash,
        chain_id: u32,
        params: &NetworkParams,
    ) -> Result<(), ValidationError> {
        if self.index != 0 {
            debug!(index = self.index, "auxpow coinbase is not a generate transaction");
            return Err(ValidationError::InvalidProofIndex(self.index));
        }

        if params.strict_chain_id && self.parent.chain_id() == Some(chain_id) {
            debug!(chain_id, "auxpow parent has our chain id");
            return Err(ValidationError::ChainIdCollision(chain_id));
        }

        let height = self.chain_branch.len();
        if height > MAX_CHAIN_MERKLE_BRANCH {
            debug!(height, "auxpow chain merkle branch too long");
            return Err(ValidationError::BranchTooLong(height));
        }

        let root = check_merkle_branch(aux_hash, &self.chain_branch, self.chain_index, MerkleHasher::Sha256d);
        // scripts carry the root in display byte order
        let root_bytes = root.reversed();

        self.check_parent_inclusion()?;

        let script = self.coinbase.script();
        if self.coinbase.is_raw() && script.len() > MAX_OPAQUE_PAYLOAD {
            debug!(len = script.len(), "auxpow raw coinbase too large");
            return Err(ValidationError::ScriptTooLarge(script.len()));
        }

        let root_pos = find(script, &root_bytes).ok_or_else(|| {
            debug!("auxpow chain merkle root not in parent coinbase");
            ValidationError::RootNotInCoinbase
        })?;

        match find(script, &MERGED_MINING_HEADER) {
            Some(head) => {
                let after = head + 1;
                if find(&script[after..], &MERGED_MINING_HEADER).is_some() {
                    debug!("multiple merged mining headers in coinbase");
                    return Err(ValidationError::DuplicateMarker);
                }
                if head + MERGED_MINING_HEADER.len() != root_pos {
                    debug!(head, root_pos, "merged mining header is not just before chain merkle root");
                    return Err(ValidationError::MarkerNotAdjacent);
                }
            }
            None => {
                if root_pos > LEGACY_ROOT_MAX_OFFSET {
                    debug!(root_pos, "auxpow chain merkle root must start in the first 20 bytes");
                    return Err(ValidationError::RootNotEarlyEnough(root_pos));
                }
            }
        }

        let tail = &script[root_pos + root_bytes.len()..];
        if tail.len() < 8 {
            debug!("auxpow missing chain merkle tree size and nonce");
            return Err(ValidationError::MissingSizeAndNonce);
        }

        let size = i32::from_le_bytes([tail[0], tail[1], tail[2], tail[3]]);
        let expected_size = 1i64 << height;
        if size as i64 != expected_size {
            debug!(size, expected_size, "auxpow merkle branch size does not match parent coinbase");
            return Err(ValidationError::SizeMismatch { declared: size, expected: expected_size });
        }

        let nonce = u32::from_le_bytes([tail[4], tail[5], tail[6], tail[7]]);
        let expected = expected_index(nonce, chain_id, height as u32);
        if self.chain_index as i64 != expected as i64 {
            debug!(
                nonce,
                chain_id,
                height,
                chain_index = self.chain_index,
                expected,
                "auxpow wrong index"
            );
            return Err(ValidationError::WrongSlotIndex {
                got: self.chain_index,
                expected,
            });
        }

        Ok(())
    }

    /// The coinbase must sit at index 0 of the parent's transaction tree
    fn check_parent_inclusion(&self) -> Result<(), ValidationError> {
        let tx_hash = self.coinbase.hash();

        match &self.parent {
            HeaderBody::Opaque(raw) => {
                if raw.len() > MAX_OPAQUE_PAYLOAD {
                    debug!(len = raw.len(), "auxpow parent header too big");
                    return Err(ValidationError::ParentHeaderTooLarge(raw.len()));
                }
                let branch_hash = check_merkle_branch(tx_hash, &self.merkle_branch, self.index, MerkleHasher::Keccak);
                if find(raw, &branch_hash.0).is_none() {
                    debug!("auxpow merkle root not found in opaque parent");
                    return Err(ValidationError::MerkleRootMismatch);
                }
            }
            HeaderBody::Structured(parent) => {
                let branch_hash = check_merkle_branch(tx_hash, &self.merkle_branch, self.index, MerkleHasher::Sha256d);
                if branch_hash != parent.merkle_root {
                    debug!(%branch_hash, merkle_root = %parent.merkle_root, "auxpow merkle root incorrect");
                    return Err(ValidationError::MerkleRootMismatch);
                }
            }
        }

        Ok(())
    }

    /// Parent proof-of-work hash under the child block's algorithm
    pub fn parent_pow_hash<H: super::PowHasher + ?Sized>(&self, algo: Algorithm, hasher: &H) -> Hash {
        self.parent.pow_hash(algo, hasher)
    }
}

/// Pseudo-random slot of a chain in a merkle tree of height `h`
///
/// Fixed for a (nonce, chain id, height) triple, so the same work cannot be
/// placed at two slots for one chain.
pub fn expected_index(nonce: u32, chain_id: u32, h: u32) -> u32 {
    let mut rand = nonce;
    rand = rand.wrapping_mul(1_103_515_245).wrapping_add(12_345);
    rand = rand.wrapping_add(chain_id);
    rand = rand.wrapping_mul(1_103_515_245).wrapping_add(12_345);

    if h >= 32 {
        rand
    } else {
        rand % (1u32 << h)
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
