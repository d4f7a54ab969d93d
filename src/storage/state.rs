//! Chain state
//!
//! [`ChainState`] bundles the block index, the active chain and the network
//! parameters. Share it between threads behind a [`ChainLock`]: mutation
//! takes the write lock, and readers hold one read guard for the whole of a
//! derived computation (median time, locator) so they never see half a
//! reorganization.

use std::sync::Arc;
use parking_lot::RwLock;
use tracing::{debug, warn};
use crate::consensus::{
    check_header_proof_of_work, BlockHeader, EquihashVerifier, MergeMineProof, PowHasher,
    ValidationError,
};
use crate::constants::MEDIAN_TIME_SPAN;
use crate::crypto::Hash;
use crate::node::NetworkParams;
use super::chain::{ActiveChain, Locator};
use super::index::{BlockIndex, ChainNode, NodeId};

/// The chain lock
pub type ChainLock = RwLock<ChainState>;

/// Block index, active chain and parameters of one chain instance
#[derive(Debug, Clone)]
pub struct ChainState {
    index: BlockIndex,
    chain: ActiveChain,
    params: NetworkParams,
}

impl ChainState {
    /// Chain holding only the network's genesis block
    pub fn new(params: NetworkParams) -> Self {
        let mut index = BlockIndex::new(params.fork_rule);
        let mut chain = ActiveChain::new();
        // the genesis header has a zero predecessor and always links
        if let Ok(genesis) = index.insert(&params.genesis) {
            chain.set_tip(&index, Some(genesis));
        }
        Self { index, chain, params }
    }

    /// Chain rebuilt from a loaded index and the stored best tip
    ///
    /// Falls back to the most-work node when `best` is unknown.
    pub fn restore(params: NetworkParams, index: BlockIndex, best: Option<Hash>) -> Self {
        let tip = best
            .and_then(|hash| index.lookup(&hash))
            .filter(|&id| !index.get(id).status.is_failed())
            .or_else(|| {
                index
                    .iter()
                    .filter(|(_, node)| !node.status.is_failed())
                    .max_by_key(|(_, node)| node.chain_work)
                    .map(|(id, _)| id)
            });
        let mut chain = ActiveChain::new();
        chain.set_tip(&index, tip);
        Self { index, chain, params }
    }

    /// Wrap in a shareable chain lock
    pub fn into_shared(self) -> Arc<ChainLock> {
        Arc::new(RwLock::new(self))
    }

    pub fn index(&self) -> &BlockIndex {
        &self.index
    }

    pub fn index_mut(&mut self) -> &mut BlockIndex {
        &mut self.index
    }

    pub fn chain(&self) -> &ActiveChain {
        &self.chain
    }

    pub fn params(&self) -> &NetworkParams {
        &self.params
    }

    pub fn tip(&self) -> Option<NodeId> {
        self.chain.tip()
    }

    pub fn tip_node(&self) -> Option<&ChainNode> {
        self.chain.tip().map(|id| self.index.get(id))
    }

    pub fn height(&self) -> Option<u32> {
        self.chain.height()
    }

    pub fn node(&self, hash: &Hash) -> Option<&ChainNode> {
        self.index.lookup(hash).map(|id| self.index.get(id))
    }

    /// Validate `header` and add it to the index
    ///
    /// The active chain moves to the new node when it carries more weighted
    /// work than the current tip. Headers already known are returned as is.
    pub fn accept_header<H, V>(
        &mut self,
        header: &BlockHeader,
        auxpow: Option<&MergeMineProof>,
        hasher: &H,
        verifier: &V,
    ) -> Result<NodeId, ValidationError>
    where
        H: PowHasher + ?Sized,
        V: EquihashVerifier + ?Sized,
    {
        let hash = header.hash();
        if let Some(id) = self.index.lookup(&hash) {
            return Ok(id);
        }

        check_header_proof_of_work(header, auxpow, &self.params, hasher, verifier)?;

        let parent = self
            .index
            .lookup(&header.prev_hash)
            .ok_or(ValidationError::UnknownParent(header.prev_hash))?;
        if self.index.get(parent).status.is_failed() {
            warn!(%hash, parent = %header.prev_hash, "header extends a failed block");
            return Err(ValidationError::FailedParent(header.prev_hash));
        }

        let height = self.index.height(parent) + 1;
        self.params.checkpoints.verify(height, &hash).map_err(|e| {
            warn!(height, %hash, "checkpoint mismatch");
            e
        })?;

        let id = self.index.insert(header)?;
        debug!(height, %hash, algo = %header.algorithm(), "header accepted");

        self.update_tip(id);
        Ok(id)
    }

    /// Re-tip to `id` if it has more work than the current tip
    ///
    /// Returns the fork point when the tip moved.
    pub fn update_tip(&mut self, id: NodeId) -> Option<NodeId> {
        let better = match self.chain.tip() {
            Some(tip) => self.index.chain_work(id) > self.index.chain_work(tip),
            None => true,
        };
        if better && !self.index.get(id).status.is_failed() {
            self.chain.set_tip(&self.index, Some(id))
        } else {
            None
        }
    }

    /// Point the active chain at `id` regardless of work
    pub fn set_tip(&mut self, id: NodeId) -> Option<NodeId> {
        self.chain.set_tip(&self.index, Some(id))
    }

    /// Median time past of `id`
    pub fn median_time_past(&self, id: NodeId) -> i64 {
        self.index.median_time_past(id)
    }

    /// Median time centred on `id`
    ///
    /// Walks 5 blocks forward along the active chain and takes the median time
    /// past there. If the chain ends first, `id`'s own time is used.
    pub fn median_time(&self, id: NodeId) -> i64 {
        let mut cursor = id;
        for _ in 0..MEDIAN_TIME_SPAN / 2 {
            match self.chain.next(&self.index, cursor) {
                Some(next) => cursor = next,
                None => return self.index.get(id).block_time(),
            }
        }
        self.index.median_time_past(cursor)
    }

    /// Locator from the active tip
    pub fn locator(&self) -> Locator {
        self.chain.locator(&self.index, None)
    }

    /// Best common block with a peer's locator
    pub fn find_fork(&self, locator: &Locator) -> Option<NodeId> {
        self.chain.find_fork(&self.index, locator)
    }

    /// Highest checkpoint present in the index
    pub fn last_checkpoint(&self) -> Option<NodeId> {
        self.params.checkpoints.last_checkpoint(|hash| self.index.lookup(hash))
    }

    /// Verification progress of the active tip at time `now`
    pub fn verification_progress(&self, now: i64) -> f64 {
        self.params
            .checkpoints
            .guess_verification_progress(self.tip_node(), true, now)
    }
}
