//! End-to-end scenarios: mining, merge-mining, checkpoints, reorganization
//! and median time.

use multipow_core::consensus::{
    check_header_proof_of_work, check_proof_of_work, expected_index, Algorithm, BlockHeader,
    CheckpointSet, EquihashVerifier, HeaderBody, MergeMineProof, PowHasher, PowNonce,
    ValidationError,
};
use multipow_core::constants::MERGED_MINING_HEADER;
use multipow_core::crypto::{check_merkle_branch, compute_merkle_root, hash_pair, sha256d, Hash, MerkleHasher};
use multipow_core::node::NetworkParams;
use multipow_core::storage::{ActiveChain, ChainState, NodeId};
use multipow_core::validation::{push_slice, CoinbaseTx, Transaction, TxOut};

const REGTEST_BITS: u32 = 0x207fffff;

/// Stand-in for the external hash implementations
struct MockPow;

impl PowHasher for MockPow {
    fn pow_hash(&self, algo: Algorithm, bytes: &[u8]) -> Hash {
        let mut data = bytes.to_vec();
        data.push(algo.tag() as u8);
        sha256d(&data)
    }
}

impl EquihashVerifier for MockPow {
    fn verify(&self, _n: u32, _k: u32, _state: &[u8], solution: &[u8]) -> bool {
        !solution.is_empty()
    }
}

fn regtest() -> NetworkParams {
    let mut params = NetworkParams::regtest();
    params.checkpoints.enabled = false;
    params
}

fn mine(params: &NetworkParams, mut header: BlockHeader) -> BlockHeader {
    for nonce in 0u32.. {
        header.nonce = PowNonce::Compact(nonce);
        if check_header_proof_of_work(&header, None, params, &MockPow, &MockPow).is_ok() {
            break;
        }
    }
    header
}

fn extend(state: &mut ChainState, from: Hash, count: usize, salt: u8) -> Vec<NodeId> {
    let mut prev = from;
    let mut ids = Vec::new();
    for i in 0..count {
        let header = BlockHeader::new(1, prev, Hash([salt; 32]), 1000 + i as u32, REGTEST_BITS, 0);
        let header = mine(state.params(), header);
        let id = state.accept_header(&header, None, &MockPow, &MockPow).unwrap();
        prev = state.index().hash(id);
        ids.push(id);
    }
    ids
}

// ============================================================================
// SCENARIO A: SCRYPT HEADER WITHOUT AUXPOW
// ============================================================================

#[test]
fn test_mined_scrypt_header_validates() {
    let params = regtest();
    let mut header = BlockHeader::new(1, params.genesis_hash, sha256d(b"txs"), 1_600_000_000, REGTEST_BITS, 0);
    header.set_algorithm(Algorithm::Scrypt);
    let header = mine(&params, header);

    assert_eq!(check_header_proof_of_work(&header, None, &params, &MockPow, &MockPow), Ok(()));

    // flip the top bit of the PoW hash: now far above the target
    let mut hash = header.pow_hash(Algorithm::Scrypt, &MockPow);
    hash.0[31] ^= 0x80;
    assert!(matches!(
        check_proof_of_work(hash, header.bits, Algorithm::Scrypt, &params),
        Err(ValidationError::HashExceedsTarget { .. })
    ));
}

#[test]
fn test_target_above_limit_rejected() {
    let params = NetworkParams::main();
    let header = BlockHeader::new(1, Hash::zero(), Hash::zero(), 0, REGTEST_BITS, 0);
    assert_eq!(
        check_header_proof_of_work(&header, None, &params, &MockPow, &MockPow),
        Err(ValidationError::TargetOutOfRange(REGTEST_BITS))
    );
}

// ============================================================================
// SCENARIO B: MERGE-MINED BLOCK
// ============================================================================

/// Branch whose every sibling equals the running hash, so the root does not
/// depend on the slot index
fn symmetric_branch(leaf: Hash, h: usize) -> Vec<Hash> {
    let mut branch = Vec::with_capacity(h);
    let mut current = leaf;
    for _ in 0..h {
        branch.push(current);
        current = hash_pair(&current, &current);
    }
    branch
}

fn coinbase_with_root(root: Hash, h: usize, nonce: u32) -> Transaction {
    let mut script = Vec::new();
    push_slice(&mut script, b"parent height");
    script.extend_from_slice(&MERGED_MINING_HEADER);
    script.extend_from_slice(&root.reversed());
    script.extend_from_slice(&(1u32 << h).to_le_bytes());
    script.extend_from_slice(&nonce.to_le_bytes());
    Transaction::coinbase(script, vec![TxOut { value: 50, script_pubkey: vec![0x51] }])
}

fn merge_mined_proof(aux_hash: Hash, chain_id: u32, h: usize, nonce: u32, bits: u32, params: &NetworkParams) -> MergeMineProof {
    let chain_index = expected_index(nonce, chain_id, h as u32) as i32;
    let chain_branch = symmetric_branch(aux_hash, h);
    let root = check_merkle_branch(aux_hash, &chain_branch, chain_index, MerkleHasher::Sha256d);

    let coinbase = coinbase_with_root(root, h, nonce);
    let sibling = sha256d(b"parent payment");
    let mut parent = BlockHeader::new(
        2,
        sha256d(b"parent prev"),
        compute_merkle_root(&[coinbase.hash(), sibling]),
        1_600_000_000,
        bits,
        0,
    );
    // grind the parent until it carries enough work for the child
    for n in 0u32.. {
        parent.nonce = PowNonce::Compact(n);
        if check_proof_of_work(parent.hash(), bits, Algorithm::Sha256d, params).is_ok() {
            break;
        }
    }

    MergeMineProof {
        coinbase: CoinbaseTx::Structured(coinbase),
        parent_block_hash: parent.hash(),
        merkle_branch: vec![sibling],
        index: 0,
        chain_branch,
        chain_index,
        parent: HeaderBody::Structured(parent),
    }
}

#[test]
fn test_merge_mine_proof_slot_index() {
    let params = regtest();
    let aux = sha256d(b"child block");
    let proof = merge_mined_proof(aux, 0x5b, 3, 0x1234_5678, REGTEST_BITS, &params);
    assert_eq!(proof.check(aux, 0x5b, &params), Ok(()));

    let mut moved = proof.clone();
    moved.chain_index = (proof.chain_index + 1) % 8;
    assert!(matches!(
        moved.check(aux, 0x5b, &params),
        Err(ValidationError::WrongSlotIndex { .. })
    ));
}

#[test]
fn test_chain_branch_length_limit() {
    let params = regtest();
    let aux = sha256d(b"child block");
    let thirty = merge_mined_proof(aux, 0x5b, 30, 99, REGTEST_BITS, &params);
    assert_eq!(thirty.check(aux, 0x5b, &params), Ok(()));

    let thirty_one = merge_mined_proof(aux, 0x5b, 31, 99, REGTEST_BITS, &params);
    assert_eq!(thirty_one.check(aux, 0x5b, &params), Err(ValidationError::BranchTooLong(31)));
}

#[test]
fn test_merge_mined_header_accepted() {
    let params = regtest();
    let mut state = ChainState::new(params.clone());

    let mut child = BlockHeader::new(4, params.genesis_hash, sha256d(b"child txs"), 1_600_000_100, REGTEST_BITS, 0);
    child.set_algorithm(Algorithm::Sha256d);
    child.set_chain_id(params.auxpow_chain_id);
    child.set_auxpow(true);

    let proof = merge_mined_proof(child.hash(), params.auxpow_chain_id, 2, 7, REGTEST_BITS, &params);
    let id = state.accept_header(&child, Some(&proof), &MockPow, &MockPow).unwrap();
    assert_eq!(state.tip(), Some(id));
    assert!(state.index().get(id).is_auxpow());

    // the same header without its proof
    let mut bare = child.clone();
    bare.time += 1;
    assert_eq!(
        state.accept_header(&bare, None, &MockPow, &MockPow),
        Err(ValidationError::MissingProof)
    );
}

#[test]
fn test_parent_with_our_chain_id_rejected() {
    let params = regtest();
    let aux = sha256d(b"child block");
    let mut proof = merge_mined_proof(aux, 0x5b, 1, 3, REGTEST_BITS, &params);
    if let HeaderBody::Structured(parent) = &mut proof.parent {
        parent.set_chain_id(0x5b);
    }
    assert_eq!(proof.check(aux, 0x5b, &params), Err(ValidationError::ChainIdCollision(0x5b)));
}

// ============================================================================
// SCENARIO C: CHECKPOINTS
// ============================================================================

#[test]
fn test_main_checkpoint_at_11571() {
    let checkpoints = CheckpointSet::main();
    let correct = Hash::from_hex("ec7fa58c5659476f5bafc1ff70d41188a73cdaa6deffb0fc42b7054815225f21").unwrap();
    let wrong = sha256d(b"not the block");

    assert!(checkpoints.check_block(11571, &correct));
    assert!(!checkpoints.check_block(11571, &wrong));
    assert!(checkpoints.check_block(11572, &wrong));
}

// ============================================================================
// REORGANIZATION
// ============================================================================

#[test]
fn test_three_block_reorg() {
    let mut state = ChainState::new(regtest());
    let genesis = state.params().genesis_hash;
    let main = extend(&mut state, genesis, 5, 1);
    assert_eq!(state.height(), Some(5));
    let old_locator = state.locator();

    // fork after height 2, replacing heights 3..=5
    let fork_hash = state.index().hash(main[1]);
    let side = extend(&mut state, fork_hash, 4, 2);
    assert_eq!(state.tip(), Some(side[3]));
    assert_eq!(state.height(), Some(6));

    let fork = state.find_fork(&old_locator).unwrap();
    assert_eq!(fork, main[1]);
    assert_eq!(state.index().height(fork), 2);
    for old in &main[2..] {
        assert!(!state.chain().contains(state.index(), *old));
    }
}

#[test]
fn test_set_tip_reports_fork_point() {
    let mut state = ChainState::new(regtest());
    let genesis = state.params().genesis_hash;
    let main = extend(&mut state, genesis, 5, 1);
    let fork_hash = state.index().hash(main[1]);
    let side = extend(&mut state, fork_hash, 3, 2);

    // equal work does not move the tip
    assert_eq!(state.tip(), Some(main[4]));

    let mut chain = ActiveChain::new();
    chain.set_tip(state.index(), Some(main[4]));
    let fork = chain.set_tip(state.index(), Some(side[2]));
    assert_eq!(fork, Some(main[1]));
    assert_eq!(chain.tip(), Some(side[2]));
}

// ============================================================================
// MEDIAN TIME
// ============================================================================

fn chain_with_times(times: &[u32]) -> (ChainState, Vec<NodeId>) {
    let mut state = ChainState::new(regtest());
    let mut prev = state.params().genesis_hash;
    let mut ids = Vec::new();
    for &time in times {
        let header = mine(state.params(), BlockHeader::new(1, prev, Hash::zero(), time, REGTEST_BITS, 0));
        let id = state.accept_header(&header, None, &MockPow, &MockPow).unwrap();
        prev = state.index().hash(id);
        ids.push(id);
    }
    (state, ids)
}

#[test]
fn test_median_time_past_of_eleven() {
    let (state, ids) = chain_with_times(&[1010, 1003, 1007, 1001, 1011, 1005, 1002, 1009, 1004, 1008, 1006]);
    assert_eq!(state.median_time_past(ids[10]), 1006);
}

#[test]
fn test_median_time_past_short_chain() {
    let (state, _) = chain_with_times(&[]);
    let genesis = state.tip().unwrap();
    assert_eq!(state.median_time_past(genesis), state.params().genesis.time as i64);

    let (state, ids) = chain_with_times(&[2_000_000_000]);
    // genesis and one child: the later of the two
    assert_eq!(state.median_time_past(ids[0]), 2_000_000_000);
}
