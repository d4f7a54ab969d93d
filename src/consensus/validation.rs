//! Proof-of-work validation
//!
//! Stateless checks of a header and its optional merge-mining proof against
//! difficulty and network rules.

use primitive_types::U256;
use thiserror::Error;
use tracing::{debug, trace};
use crate::consensus::{
    Algorithm, BlockHeader, Compact, EquihashVerifier, HeaderBody, MergeMineProof, PowHasher,
};
use crate::crypto::Hash;
use crate::node::NetworkParams;

/// Validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("auxpow coinbase index {0} is not a generate transaction")]
    InvalidProofIndex(i32),

    #[error("auxpow parent has our chain id {0}")]
    ChainIdCollision(u32),

    #[error("auxpow chain merkle branch too long ({0} levels)")]
    BranchTooLong(usize),

    #[error("auxpow merkle root incorrect")]
    MerkleRootMismatch,

    #[error("auxpow missing chain merkle root in parent coinbase")]
    RootNotInCoinbase,

    #[error("multiple merged mining headers in coinbase")]
    DuplicateMarker,

    #[error("merged mining header is not just before chain merkle root")]
    MarkerNotAdjacent,

    #[error("auxpow chain merkle root starts at byte {0}, must be within the first 20")]
    RootNotEarlyEnough(usize),

    #[error("auxpow missing chain merkle tree size and nonce in parent coinbase")]
    MissingSizeAndNonce,

    #[error("auxpow merkle tree size {declared} does not match branch ({expected})")]
    SizeMismatch { declared: i32, expected: i64 },

    #[error("auxpow wrong index: got {got}, expected {expected}")]
    WrongSlotIndex { got: i32, expected: u32 },

    #[error("auxpow parent header too big ({0} bytes)")]
    ParentHeaderTooLarge(usize),

    #[error("auxpow coinbase script too big ({0} bytes)")]
    ScriptTooLarge(usize),

    #[error("target of bits {0:#010x} out of range")]
    TargetOutOfRange(u32),

    #[error("hash {hash} does not meet target of bits {bits:#010x}")]
    HashExceedsTarget { hash: Hash, bits: u32 },

    #[error("equihash solution invalid")]
    EquihashSolutionInvalid,

    #[error("checkpoint mismatch at height {height}")]
    CheckpointMismatch { height: u32 },

    #[error("no auxpow on block with auxpow version")]
    MissingProof,

    #[error("auxpow on block with non-auxpow version")]
    UnexpectedProof,

    #[error("block does not have our chain id (got {got}, expected {expected})")]
    WrongChainId { got: u32, expected: u32 },

    #[error("previous block {0} not found")]
    UnknownParent(Hash),

    #[error("previous block {0} is marked invalid")]
    FailedParent(Hash),
}

/// Check `hash` against the target encoded in `bits`
///
/// The target must be positive and no easier than the network limit for
/// `algo`. Hashes compare as little-endian 256-bit integers.
pub fn check_proof_of_work(
    hash: Hash,
    bits: u32,
    algo: Algorithm,
    params: &NetworkParams,
) -> Result<(), ValidationError> {
    let target = match Compact(bits).to_target() {
        Some(target) if target <= params.pow_limit(algo) => target,
        _ => {
            debug!(bits, %algo, "nBits below minimum work");
            return Err(ValidationError::TargetOutOfRange(bits));
        }
    };

    if !meets_target(&hash, target) {
        debug!(%hash, target = %Hash::from_u256(target), "hash doesn't match nBits");
        return Err(ValidationError::HashExceedsTarget { hash, bits });
    }

    Ok(())
}

/// Full proof-of-work check of a header and its optional merge-mining proof
pub fn check_header_proof_of_work<H, V>(
    header: &BlockHeader,
    auxpow: Option<&MergeMineProof>,
    params: &NetworkParams,
    hasher: &H,
    verifier: &V,
) -> Result<(), ValidationError>
where
    H: PowHasher + ?Sized,
    V: EquihashVerifier + ?Sized,
{
    let algo = header.algorithm();

    if header.version > 3
        && header.is_auxpow()
        && params.strict_chain_id
        && header.chain_id() != params.auxpow_chain_id
    {
        debug!(got = header.chain_id(), expected = params.auxpow_chain_id, "block does not have our chain id");
        return Err(ValidationError::WrongChainId {
            got: header.chain_id(),
            expected: params.auxpow_chain_id,
        });
    }

    let proof = match auxpow {
        None => {
            if header.is_auxpow() {
                debug!("no auxpow on block with auxpow version");
                return Err(ValidationError::MissingProof);
            }
            return check_proof_of_work(header.pow_hash(algo, hasher), header.bits, algo, params);
        }
        Some(proof) => proof,
    };

    if !header.is_auxpow() {
        debug!("auxpow on block with non-auxpow version");
        return Err(ValidationError::UnexpectedProof);
    }

    proof.check(header.hash(), header.chain_id(), params)?;

    let parent_hash = proof.parent_pow_hash(algo, hasher);
    trace!(%parent_hash, bits = header.bits, "auxpow proof-of-work submitted");

    if algo == Algorithm::Equihash {
        check_equihash_solution(&proof.parent, params, verifier)?;
    }

    check_proof_of_work(parent_hash, header.bits, algo, params)
}

/// Run the Equihash verifier over a parent header
pub fn check_equihash_solution<V: EquihashVerifier + ?Sized>(
    parent: &HeaderBody,
    params: &NetworkParams,
    verifier: &V,
) -> Result<(), ValidationError> {
    let header = parent.structured();
    let input = header.and_then(BlockHeader::equihash_input);
    let solution = header.and_then(BlockHeader::solution);

    match (input, solution) {
        (Some(input), Some(solution))
            if verifier.verify(params.equihash_n, params.equihash_k, &input, solution) =>
        {
            Ok(())
        }
        _ => {
            debug!("auxpow equihash solution failed");
            Err(ValidationError::EquihashSolutionInvalid)
        }
    }
}

/// Hashes compare as little-endian 256-bit integers
fn meets_target(hash: &Hash, target: U256) -> bool {
    hash.to_u256() <= target
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::{PowNonce, ProofFormat};
    use crate::crypto::{check_merkle_branch, compute_merkle_root, sha256d, MerkleHasher};
    use crate::validation::{CoinbaseTx, RawTxHash};
    use crate::constants::MERGED_MINING_HEADER;
    use crate::consensus::expected_index;

    struct Sha256Hasher;

    impl PowHasher for Sha256Hasher {
        fn pow_hash(&self, _algo: Algorithm, bytes: &[u8]) -> Hash {
            sha256d(bytes)
        }
    }

    struct FixedVerifier(bool);

    impl EquihashVerifier for FixedVerifier {
        fn verify(&self, n: u32, k: u32, state: &[u8], _solution: &[u8]) -> bool {
            assert_eq!((n, k), (200, 9));
            assert_eq!(state.len(), 140);
            self.0
        }
    }

    fn mine(header: &mut BlockHeader, params: &NetworkParams) {
        let target = Compact(header.bits).to_target().unwrap();
        let algo = header.algorithm();
        for nonce in 0.. {
            header.nonce = PowNonce::Compact(nonce);
            if meets_target(&header.pow_hash(algo, &Sha256Hasher), target) {
                break;
            }
        }
        assert!(check_proof_of_work(header.pow_hash(algo, &Sha256Hasher), header.bits, algo, params).is_ok());
    }

    #[test]
    fn test_target_range() {
        let params = NetworkParams::main();
        assert_eq!(
            check_proof_of_work(Hash::zero(), 0, Algorithm::Scrypt, &params),
            Err(ValidationError::TargetOutOfRange(0))
        );
        // easier than the mainnet limit
        assert_eq!(
            check_proof_of_work(Hash::zero(), 0x207fffff, Algorithm::Scrypt, &params),
            Err(ValidationError::TargetOutOfRange(0x207fffff))
        );
        // negative
        assert_eq!(
            check_proof_of_work(Hash::zero(), 0x1d80ffff, Algorithm::Scrypt, &params),
            Err(ValidationError::TargetOutOfRange(0x1d80ffff))
        );
        assert!(check_proof_of_work(Hash::zero(), 0x1d00ffff, Algorithm::Scrypt, &params).is_ok());
    }

    #[test]
    fn test_hash_above_target() {
        let params = NetworkParams::main();
        let hash = Hash::from_u256(U256::MAX);
        assert!(matches!(
            check_proof_of_work(hash, 0x1d00ffff, Algorithm::Sha256d, &params),
            Err(ValidationError::HashExceedsTarget { .. })
        ));
    }

    #[test]
    fn test_plain_header() {
        let params = NetworkParams::regtest();
        let mut header = BlockHeader::new(4, Hash::zero(), Hash::zero(), 1, 0x207fffff, 0);
        header.set_algorithm(Algorithm::X17);
        mine(&mut header, &params);
        assert_eq!(
            check_header_proof_of_work(&header, None, &params, &Sha256Hasher, &FixedVerifier(true)),
            Ok(())
        );

        header.set_auxpow(true);
        header.set_chain_id(params.auxpow_chain_id);
        assert_eq!(
            check_header_proof_of_work(&header, None, &params, &Sha256Hasher, &FixedVerifier(true)),
            Err(ValidationError::MissingProof)
        );
    }

    #[test]
    fn test_wrong_chain_id() {
        let params = NetworkParams::regtest();
        let mut header = BlockHeader::new(4, Hash::zero(), Hash::zero(), 1, 0x207fffff, 0);
        header.set_auxpow(true);
        header.set_chain_id(7);
        assert_eq!(
            check_header_proof_of_work(&header, None, &params, &Sha256Hasher, &FixedVerifier(true)),
            Err(ValidationError::WrongChainId { got: 7, expected: params.auxpow_chain_id })
        );

        let mut lax = params.clone();
        lax.strict_chain_id = false;
        assert_eq!(
            check_header_proof_of_work(&header, None, &lax, &Sha256Hasher, &FixedVerifier(true)),
            Err(ValidationError::MissingProof)
        );
    }

    /// Child header plus a one-leaf chain tree committed in a raw Equihash coinbase
    fn equihash_block(params: &NetworkParams) -> (BlockHeader, MergeMineProof) {
        let mut header = BlockHeader::new(4, Hash::zero(), sha256d(b"txs"), 1, 0x207fffff, 0);
        header.set_algorithm(Algorithm::Equihash);
        header.set_auxpow(true);
        header.set_chain_id(params.auxpow_chain_id);
        assert_eq!(ProofFormat::for_algorithm(header.algorithm()), ProofFormat::Equihash);

        let nonce = 5u32;
        let index = expected_index(nonce, params.auxpow_chain_id, 0);
        let root = check_merkle_branch(header.hash(), &[], index as i32, MerkleHasher::Sha256d);
        let mut script = MERGED_MINING_HEADER.to_vec();
        script.extend_from_slice(&root.reversed());
        script.extend_from_slice(&1u32.to_le_bytes());
        script.extend_from_slice(&nonce.to_le_bytes());
        let coinbase = CoinbaseTx::Raw { bytes: script, hashing: RawTxHash::Sha256d };

        let mut parent = BlockHeader {
            version: 4,
            prev_hash: Hash::zero(),
            merkle_root: compute_merkle_root(&[coinbase.hash()]),
            time: 1,
            bits: 0x207fffff,
            nonce: PowNonce::Equihash {
                reserved: Hash::zero(),
                nonce: Hash::zero(),
                solution: vec![1; 1344],
            },
        };
        let target = Compact(header.bits).to_target().unwrap();
        for n in 0u32.. {
            if let PowNonce::Equihash { nonce, .. } = &mut parent.nonce {
                nonce.0[..4].copy_from_slice(&n.to_le_bytes());
            }
            if meets_target(&parent.hash(), target) {
                break;
            }
        }

        let proof = MergeMineProof {
            coinbase,
            parent_block_hash: parent.hash(),
            merkle_branch: vec![],
            index: 0,
            chain_branch: vec![],
            chain_index: index as i32,
            parent: HeaderBody::Structured(parent),
        };
        (header, proof)
    }

    #[test]
    fn test_equihash_auxpow() {
        let params = NetworkParams::regtest();
        let (header, proof) = equihash_block(&params);

        assert_eq!(
            check_header_proof_of_work(&header, Some(&proof), &params, &Sha256Hasher, &FixedVerifier(true)),
            Ok(())
        );
        assert_eq!(
            check_header_proof_of_work(&header, Some(&proof), &params, &Sha256Hasher, &FixedVerifier(false)),
            Err(ValidationError::EquihashSolutionInvalid)
        );

        let mut plain = header.clone();
        plain.set_auxpow(false);
        assert_eq!(
            check_header_proof_of_work(&plain, Some(&proof), &params, &Sha256Hasher, &FixedVerifier(true)),
            Err(ValidationError::UnexpectedProof)
        );
    }

    #[test]
    fn test_hash_equal_to_target_passes() {
        let params = NetworkParams::regtest();
        let target = Compact(0x207fffff).to_target().unwrap();
        assert!(meets_target(&Hash::from_u256(target), target));
        assert_eq!(
            check_proof_of_work(Hash::from_u256(target), 0x207fffff, Algorithm::Scrypt, &params),
            Ok(())
        );
        let above = Hash::from_u256(target + U256::one());
        assert_eq!(
            check_proof_of_work(above, 0x207fffff, Algorithm::Scrypt, &params),
            Err(ValidationError::HashExceedsTarget { hash: above, bits: 0x207fffff })
        );
    }
}
