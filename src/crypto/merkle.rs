//! Merkle tree implementation
//!
//! Used for transaction merkle roots in parent blocks and for the chain
//! merkle tree that binds merge-mined block hashes into a parent coinbase.

use super::{hash_pair, keccak_pair, Hash};
use serde::{Deserialize, Serialize};

/// Two-child hash used when folding a merkle branch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MerkleHasher {
    /// SHA-256d, the default for bitcoin-style parents and the chain tree
    Sha256d,
    /// Keccak-256, used by CryptoNight-style parent chains
    Keccak,
}

impl MerkleHasher {
    /// Combine a left and right node
    pub fn combine(&self, left: &Hash, right: &Hash) -> Hash {
        match self {
            MerkleHasher::Sha256d => hash_pair(left, right),
            MerkleHasher::Keccak => keccak_pair(left, right),
        }
    }
}

/// Compute the merkle root of a list of hashes
///
/// If the list is empty, returns zero hash.
/// If odd number of elements, duplicates the last element.
pub fn compute_merkle_root(hashes: &[Hash]) -> Hash {
    build_merkle_tree(hashes).last().copied().unwrap_or_else(Hash::zero)
}

/// Build the flattened merkle tree: leaves first, root last
pub fn build_merkle_tree(hashes: &[Hash]) -> Vec<Hash> {
    let mut tree: Vec<Hash> = hashes.to_vec();
    let mut level_start = 0;
    let mut size = hashes.len();

    while size > 1 {
        for i in (0..size).step_by(2) {
            let i2 = (i + 1).min(size - 1);
            let combined = hash_pair(&tree[level_start + i], &tree[level_start + i2]);
            tree.push(combined);
        }
        level_start += size;
        size = (size + 1) / 2;
    }

    tree
}

/// Extract the sibling path of the leaf at `index`
///
/// Returns an empty branch for out-of-range indices.
pub fn merkle_branch(hashes: &[Hash], mut index: usize) -> Vec<Hash> {
    if index >= hashes.len() {
        return Vec::new();
    }

    let tree = build_merkle_tree(hashes);
    let mut branch = Vec::new();
    let mut level_start = 0;
    let mut size = hashes.len();

    while size > 1 {
        let sibling = (index ^ 1).min(size - 1);
        branch.push(tree[level_start + sibling]);
        index >>= 1;
        level_start += size;
        size = (size + 1) / 2;
    }

    branch
}

/// Fold `leaf` up through `branch`; the bits of `index` (least significant
/// first) say whether the running hash is the right child at each level.
///
/// An index of -1 marks an unset branch and yields the zero hash.
pub fn check_merkle_branch(leaf: Hash, branch: &[Hash], index: i32, hasher: MerkleHasher) -> Hash {
    if index == -1 {
        return Hash::zero();
    }

    let mut hash = leaf;
    let mut index = index;
    for sibling in branch {
        hash = if index & 1 != 0 {
            hasher.combine(sibling, &hash)
        } else {
            hasher.combine(&hash, sibling)
        };
        index >>= 1;
    }

    hash
}
