//! Block checkpoints
//!
//! Hard-coded known-good (height, hash) pairs per network, plus the data
//! used to estimate verification progress during initial sync.

use serde::{Deserialize, Serialize};
use crate::constants::SIGCHECK_VERIFICATION_FACTOR;
use crate::crypto::Hash;
use crate::storage::ChainNode;
use super::validation::ValidationError;

const SECONDS_PER_DAY: f64 = 86_400.0;

const MAIN_CHECKPOINTS: [(u32, &str); 12] = [
    (0, "c1fb746e87e89ae75bdec2ef0639a1f6786744639ce3d0ece1dcf979b79137cb"),
    (4918, "79aa44255b446aedb3cd9d765c4c7fc51b9c4a82e7d8639bf97ba42a73e61aec"),
    (11571, "ec7fa58c5659476f5bafc1ff70d41188a73cdaa6deffb0fc42b7054815225f21"),
    (17500, "812f6ba1879ef23d3210c831b2572b411ee272f16317a541461fddfda5d2ebbf"),
    (27050, "2ef099e35b775661d748296da1a43cdd62b7bf34f1f347cb7e14855841064560"),
    (33298, "ce5bc23644c83868038f6b08a9e6db3120613404036d2da371524ad168ad2413"),
    (38290, "984b6bd2c102bbeda7cef322f4b76109f6b42b64b2ae4beadc12d70614ffeeda"),
    (42020, "c795bf104a235632bd768d82c8d5097358247d59aed3cc7dccb04df651a08fa9"),
    (44750, "d33f726c5771bcae22580cdbf40cee2e2414c7196dacbffd34a09cb852f31ca3"),
    (46190, "926dfff0792133f87c497327c1bfdc1245af8c4ea41f9795edab042b0676b52c"),
    (46519, "5f0daab303063ec6bf2ee63bc666ac37f36647cbd2018280df845ab87169744a"),
    (363838, "43ecdc8de768235547f834ffa670304aca28c46b83385adbe59477f2409f68c6"),
];

const TESTNET_CHECKPOINTS: [(u32, &str); 1] = [
    (0, "45ccef675b070c6eae865e1fcd3978253ec52a960af9abbb91bd1d935513e5be"),
];

const REGTEST_CHECKPOINTS: [(u32, &str); 1] = [
    (0, "168329a349fc93768bfb02e536bbe1e1847d77a65764564552122fa9268d8841"),
];

/// A known-good block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub height: u32,
    pub hash: Hash,
}

/// Checkpoint table of one network, strictly increasing by height
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointSet {
    checkpoints: Vec<Checkpoint>,
    /// UNIX timestamp of the last checkpoint block
    pub time_last_checkpoint: i64,
    /// Transactions between genesis and the last checkpoint
    pub transactions_last_checkpoint: u64,
    /// Estimated transactions per day after the last checkpoint
    pub transactions_per_day: f64,
    /// A disabled set accepts every block
    pub enabled: bool,
}

impl CheckpointSet {
    /// Build a table; entries are sorted by height, later duplicates win
    pub fn new(
        entries: &[(u32, Hash)],
        time_last_checkpoint: i64,
        transactions_last_checkpoint: u64,
        transactions_per_day: f64,
    ) -> Self {
        let mut checkpoints: Vec<Checkpoint> = Vec::with_capacity(entries.len());
        let mut sorted = entries.to_vec();
        sorted.sort_by_key(|(height, _)| *height);
        for (height, hash) in sorted {
            match checkpoints.last_mut() {
                Some(last) if last.height == height => last.hash = hash,
                _ => checkpoints.push(Checkpoint { height, hash }),
            }
        }

        Self {
            checkpoints,
            time_last_checkpoint,
            transactions_last_checkpoint,
            transactions_per_day,
            enabled: true,
        }
    }

    fn from_table(
        table: &[(u32, &str)],
        time_last_checkpoint: i64,
        transactions_last_checkpoint: u64,
        transactions_per_day: f64,
    ) -> Self {
        let entries: Vec<(u32, Hash)> = table
            .iter()
            .map(|(height, hex)| (*height, Hash::from_hex(hex).unwrap_or_default()))
            .collect();
        Self::new(&entries, time_last_checkpoint, transactions_last_checkpoint, transactions_per_day)
    }

    pub fn main() -> Self {
        Self::from_table(&MAIN_CHECKPOINTS, 1_512_634_233, 992_137, 2500.0)
    }

    pub fn testnet() -> Self {
        Self::from_table(&TESTNET_CHECKPOINTS, 1_405_274_408, 0, 300.0)
    }

    pub fn regtest() -> Self {
        Self::from_table(&REGTEST_CHECKPOINTS, 0, 0, 0.0)
    }

    pub fn checkpoints(&self) -> &[Checkpoint] {
        &self.checkpoints
    }

    /// Expected hash at `height`, if checkpointed
    pub fn get(&self, height: u32) -> Option<Hash> {
        self.checkpoints
            .binary_search_by_key(&height, |c| c.height)
            .ok()
            .map(|i| self.checkpoints[i].hash)
    }

    /// False only if `height` is checkpointed with a different hash
    pub fn check_block(&self, height: u32, hash: &Hash) -> bool {
        if !self.enabled {
            return true;
        }
        self.get(height).map_or(true, |expected| expected == *hash)
    }

    /// [`check_block`](Self::check_block) as a validation result
    pub fn verify(&self, height: u32, hash: &Hash) -> Result<(), ValidationError> {
        if self.check_block(height, hash) {
            Ok(())
        } else {
            Err(ValidationError::CheckpointMismatch { height })
        }
    }

    /// Height of the last checkpoint, 0 when disabled
    pub fn total_blocks_estimate(&self) -> u32 {
        if !self.enabled {
            return 0;
        }
        self.checkpoints.last().map_or(0, |c| c.height)
    }

    /// Highest checkpoint that `lookup` knows, scanning from the top
    pub fn last_checkpoint<T, F>(&self, lookup: F) -> Option<T>
    where
        F: Fn(&Hash) -> Option<T>,
    {
        if !self.enabled {
            return None;
        }
        self.checkpoints.iter().rev().find_map(|c| lookup(&c.hash))
    }

    /// Estimated fraction of verification work done at `node`
    ///
    /// Transactions up to the last checkpoint count 1.0 each, later ones
    /// count `sigcheck_factor`. Work still to come is extrapolated from
    /// `now` at the table's transactions-per-day rate.
    pub fn estimate_progress(&self, node: Option<&ChainNode>, sigcheck_factor: f64, now: i64) -> f64 {
        let node = match node {
            Some(node) => node,
            None => return 0.0,
        };

        let chain_tx = node.chain_tx as f64;
        let last_tx = self.transactions_last_checkpoint as f64;

        let (work_before, work_after) = if node.chain_tx <= self.transactions_last_checkpoint {
            let expensive_after =
                (now - self.time_last_checkpoint) as f64 / SECONDS_PER_DAY * self.transactions_per_day;
            (chain_tx, last_tx - chain_tx + expensive_after * sigcheck_factor)
        } else {
            let expensive_before = chain_tx - last_tx;
            let expensive_after =
                (now - node.time as i64) as f64 / SECONDS_PER_DAY * self.transactions_per_day;
            (
                last_tx + expensive_before * sigcheck_factor,
                expensive_after * sigcheck_factor,
            )
        };

        let total = work_before + work_after;
        if total <= 0.0 {
            // no transactions known on either side
            return 1.0;
        }
        work_before / total
    }

    /// [`estimate_progress`](Self::estimate_progress) with the default factor
    pub fn guess_verification_progress(&self, node: Option<&ChainNode>, sigchecks: bool, now: i64) -> f64 {
        let factor = if sigchecks { SIGCHECK_VERIFICATION_FACTOR } else { 1.0 };
        self.estimate_progress(node, factor, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::BlockHeader;

    fn node_with(chain_tx: u64, time: u32) -> ChainNode {
        let header = BlockHeader::new(1, Hash::zero(), Hash::zero(), time, 0x1d00ffff, 0);
        let mut node = ChainNode::from_header(&header);
        node.chain_tx = chain_tx;
        node
    }

    #[test]
    fn test_main_table() {
        let set = CheckpointSet::main();
        assert_eq!(set.checkpoints().len(), 12);
        assert!(set.checkpoints().iter().all(|c| !c.hash.is_zero()));
        assert!(set.checkpoints().windows(2).all(|w| w[0].height < w[1].height));
        assert_eq!(set.total_blocks_estimate(), 363838);
    }

    #[test]
    fn test_check_block() {
        let set = CheckpointSet::main();
        let good = Hash::from_hex("ec7fa58c5659476f5bafc1ff70d41188a73cdaa6deffb0fc42b7054815225f21").unwrap();
        let bad = Hash::from_hex("ec7fa58c5659476f5bafc1ff70d41188a73cdaa6deffb0fc42b7054815225f22").unwrap();

        assert!(set.check_block(11571, &good));
        assert!(!set.check_block(11571, &bad));
        assert!(set.check_block(11572, &bad));
        assert_eq!(set.verify(11571, &bad), Err(ValidationError::CheckpointMismatch { height: 11571 }));
    }

    #[test]
    fn test_disabled_set() {
        let mut set = CheckpointSet::main();
        set.enabled = false;
        assert!(set.check_block(11571, &Hash::zero()));
        assert_eq!(set.total_blocks_estimate(), 0);
        assert_eq!(set.last_checkpoint(|h| Some(*h)), None);
    }

    #[test]
    fn test_last_checkpoint_scans_from_top() {
        let set = CheckpointSet::main();
        let known = [set.get(4918).unwrap(), set.get(17500).unwrap()];
        let found = set.last_checkpoint(|h| known.contains(h).then_some(*h));
        assert_eq!(found, set.get(17500));
        assert_eq!(set.last_checkpoint(|_| None::<Hash>), None);
    }

    #[test]
    fn test_new_sorts_and_dedups() {
        let a = Hash([1; 32]);
        let b = Hash([2; 32]);
        let set = CheckpointSet::new(&[(10, a), (5, a), (10, b)], 0, 0, 0.0);
        assert_eq!(set.checkpoints().len(), 2);
        assert_eq!(set.get(10), Some(b));
        assert_eq!(set.get(7), None);
    }

    #[test]
    fn test_progress_estimate() {
        let set = CheckpointSet::main();
        assert_eq!(set.estimate_progress(None, 5.0, 0), 0.0);

        // at the last checkpoint, on the same instant
        let node = node_with(992_137, 1_512_634_233);
        let progress = set.estimate_progress(Some(&node), 5.0, 1_512_634_233);
        assert!((progress - 1.0).abs() < 1e-12);

        // halfway through the cheap part, one day after the checkpoint
        let node = node_with(496_068, 0);
        let now = 1_512_634_233 + 86_400;
        let before = 496_068.0;
        let after = (992_137.0 - 496_068.0) + 2500.0 * 5.0;
        let progress = set.guess_verification_progress(Some(&node), true, now);
        assert!((progress - before / (before + after)).abs() < 1e-12);

        // past the checkpoint
        let node = node_with(1_000_137, 1_600_000_000);
        let progress = set.estimate_progress(Some(&node), 1.0, 1_600_000_000 + 86_400);
        let before = 992_137.0 + 8_000.0;
        assert!((progress - before / (before + 2500.0)).abs() < 1e-12);
        assert!(progress > 0.0 && progress < 1.0);
    }

    #[test]
    fn test_progress_without_transaction_data() {
        let set = CheckpointSet::regtest();
        assert_eq!(set.estimate_progress(Some(&node_with(0, 1_600_000_000)), 5.0, 1_700_000_000), 1.0);
        assert_eq!(set.guess_verification_progress(Some(&node_with(0, 0)), false, 0), 1.0);
    }
}
