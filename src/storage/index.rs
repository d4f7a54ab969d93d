//! Block index
//!
//! Every known header gets one [`ChainNode`] in an arena owned by
//! [`BlockIndex`]. Predecessor links are [`NodeId`] handles into the arena,
//! so the tree of known blocks needs no reference counting. Nodes are never
//! removed.

use std::collections::HashMap;
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use crate::constants::{AVERAGE_WORK_WINDOW, MEDIAN_TIME_SPAN};
use crate::consensus::{
    block_work, Algorithm, BlockHeader, PowNonce, ValidationError, VERSION_ALGO_MASK,
    VERSION_ALGO_SHIFT, VERSION_AUXPOW,
};
use crate::crypto::Hash;
use crate::node::ForkRule;

/// Handle of a node in the [`BlockIndex`] arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Validation progress and data availability of a block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BlockStatus(pub u32);

impl BlockStatus {
    pub const VALID_UNKNOWN: u32 = 0;
    /// Parsed, version ok, hash satisfies claimed PoW
    pub const VALID_HEADER: u32 = 1;
    /// Parent found, difficulty matches, checkpoint ok
    pub const VALID_TREE: u32 = 2;
    pub const VALID_TRANSACTIONS: u32 = 3;
    pub const VALID_CHAIN: u32 = 4;
    pub const VALID_SCRIPTS: u32 = 5;
    pub const VALID_MASK: u32 = 7;

    /// Full block available on disk
    pub const HAVE_DATA: u32 = 8;
    /// Undo data available on disk
    pub const HAVE_UNDO: u32 = 16;

    pub const FAILED_VALID: u32 = 32;
    /// Descends from a failed block
    pub const FAILED_CHILD: u32 = 64;
    pub const FAILED_MASK: u32 = 96;

    pub fn validity(self) -> u32 {
        self.0 & Self::VALID_MASK
    }

    pub fn has(self, flag: u32) -> bool {
        self.0 & flag != 0
    }

    pub fn is_failed(self) -> bool {
        self.has(Self::FAILED_MASK)
    }

    /// Not failed and validated at least up to `level`
    pub fn is_valid(self, level: u32) -> bool {
        !self.is_failed() && self.validity() >= level
    }

    /// Raise the validity level; returns whether it changed
    ///
    /// Failed blocks stay failed and levels never go down.
    pub fn raise_validity(&mut self, level: u32) -> bool {
        if self.is_failed() || self.validity() >= level {
            return false;
        }
        self.0 = (self.0 & !Self::VALID_MASK) | (level & Self::VALID_MASK);
        true
    }

    pub fn set(&mut self, flag: u32) {
        self.0 |= flag;
    }
}

/// Position of block or undo data in the block files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskPos {
    pub file: i32,
    pub pos: u32,
}

/// Block index entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainNode {
    pub hash: Hash,
    /// Predecessor, `None` for genesis
    pub prev: Option<NodeId>,
    pub height: u32,
    /// Total coins issued up to and including this block
    pub money_supply: i64,
    /// Per-algorithm subsidy scaling factor state
    pub subsidy_scaling_factor: i32,
    pub file: i32,
    pub data_pos: u32,
    pub undo_pos: u32,
    /// Total weighted work of the chain up to and including this block
    pub chain_work: U256,
    /// Number of transactions in this block, 0 until the block data is seen
    pub tx_count: u32,
    /// Transactions up to and including this block, 0 if unknown
    pub chain_tx: u64,
    pub status: BlockStatus,
    pub sequence_id: u32,

    pub version: u32,
    pub merkle_root: Hash,
    pub time: u32,
    pub bits: u32,
    pub nonce: PowNonce,
}

impl ChainNode {
    /// Unlinked entry for `header`
    pub fn from_header(header: &BlockHeader) -> Self {
        Self {
            hash: header.hash(),
            prev: None,
            height: 0,
            money_supply: 0,
            subsidy_scaling_factor: 0,
            file: 0,
            data_pos: 0,
            undo_pos: 0,
            chain_work: U256::zero(),
            tx_count: 0,
            chain_tx: 0,
            status: BlockStatus::default(),
            sequence_id: 0,
            version: header.version,
            merkle_root: header.merkle_root,
            time: header.time,
            bits: header.bits,
            nonce: header.nonce.clone(),
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        Algorithm::from_tag((self.version & VERSION_ALGO_MASK) >> VERSION_ALGO_SHIFT)
    }

    pub fn base_version(&self) -> u32 {
        self.version & 0xff
    }

    pub fn is_auxpow(&self) -> bool {
        self.version & VERSION_AUXPOW != 0
    }

    pub fn block_time(&self) -> i64 {
        self.time as i64
    }

    /// This block's own weighted work
    pub fn weighted_work(&self) -> U256 {
        block_work(self.bits, self.algorithm())
    }

    /// Where the block data lives, if we have it
    pub fn block_pos(&self) -> Option<DiskPos> {
        self.status
            .has(BlockStatus::HAVE_DATA)
            .then_some(DiskPos { file: self.file, pos: self.data_pos })
    }

    /// Where the undo data lives, if we have it
    pub fn undo_pos(&self) -> Option<DiskPos> {
        self.status
            .has(BlockStatus::HAVE_UNDO)
            .then_some(DiskPos { file: self.file, pos: self.undo_pos })
    }
}

/// Arena of all known block headers, keyed by hash
#[derive(Debug, Clone)]
pub struct BlockIndex {
    nodes: Vec<ChainNode>,
    by_hash: HashMap<Hash, NodeId>,
    fork_rule: ForkRule,
}

impl BlockIndex {
    pub fn new(fork_rule: ForkRule) -> Self {
        Self {
            nodes: Vec::new(),
            by_hash: HashMap::new(),
            fork_rule,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn fork_rule(&self) -> &ForkRule {
        &self.fork_rule
    }

    /// Add `header`, linking it to its predecessor
    ///
    /// A known header returns its existing node. A header whose previous hash
    /// is zero becomes a root at height 0; any other unknown predecessor is an
    /// error.
    pub fn insert(&mut self, header: &BlockHeader) -> Result<NodeId, ValidationError> {
        let hash = header.hash();
        if let Some(&id) = self.by_hash.get(&hash) {
            return Ok(id);
        }

        let prev = if header.prev_hash.is_zero() {
            None
        } else {
            Some(
                self.lookup(&header.prev_hash)
                    .ok_or(ValidationError::UnknownParent(header.prev_hash))?,
            )
        };

        let mut node = ChainNode::from_header(header);
        node.status.raise_validity(BlockStatus::VALID_TREE);
        Ok(self.push(node, prev))
    }

    /// Add a node restored from storage, linking it to `prev_hash`
    ///
    /// Panics if a predecessor is named but not present.
    pub fn insert_loaded(&mut self, mut node: ChainNode, prev_hash: Option<Hash>) -> NodeId {
        if let Some(&id) = self.by_hash.get(&node.hash) {
            return id;
        }
        let prev = prev_hash.map(|hash| {
            self.lookup(&hash)
                .unwrap_or_else(|| panic!("block index: predecessor {} of {} missing", hash, node.hash))
        });
        node.prev = None;
        self.push(node, prev)
    }

    fn push(&mut self, mut node: ChainNode, prev: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        let work = node.weighted_work();

        match prev {
            Some(prev_id) => {
                let parent = self.get(prev_id);
                node.height = parent.height + 1;
                node.chain_work = parent.chain_work.saturating_add(work);
                if parent.chain_tx != 0 && node.tx_count != 0 {
                    node.chain_tx = parent.chain_tx + node.tx_count as u64;
                }
            }
            None => {
                node.height = 0;
                node.chain_work = work;
                node.chain_tx = node.tx_count as u64;
            }
        }
        node.prev = prev;
        node.sequence_id = id.0;

        self.by_hash.insert(node.hash, id);
        self.nodes.push(node);
        id
    }

    /// Node by handle; handles are only issued by this index
    pub fn get(&self, id: NodeId) -> &ChainNode {
        &self.nodes[id.index()]
    }

    pub fn lookup(&self, hash: &Hash) -> Option<NodeId> {
        self.by_hash.get(hash).copied()
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.by_hash.contains_key(hash)
    }

    pub fn prev(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).prev
    }

    pub fn hash(&self, id: NodeId) -> Hash {
        self.get(id).hash
    }

    pub fn height(&self, id: NodeId) -> u32 {
        self.get(id).height
    }

    /// All nodes in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &ChainNode)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (NodeId(i as u32), node))
    }

    /// `id` and its predecessors, newest first
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors { index: self, next: Some(id) }
    }

    /// Ancestor of `id` at `height`
    pub fn ancestor(&self, id: NodeId, height: u32) -> Option<NodeId> {
        if height > self.height(id) {
            return None;
        }
        self.ancestors(id).find(|&a| self.height(a) == height)
    }

    /// Header of `id` rebuilt from the index
    pub fn header(&self, id: NodeId) -> BlockHeader {
        let node = self.get(id);
        BlockHeader {
            version: node.version,
            prev_hash: node.prev.map(|p| self.hash(p)).unwrap_or_default(),
            merkle_root: node.merkle_root,
            time: node.time,
            bits: node.bits,
            nonce: node.nonce.clone(),
        }
    }

    /// Cumulative weighted work of the chain ending at `id`
    pub fn chain_work(&self, id: NodeId) -> U256 {
        self.get(id).chain_work
    }

    /// Deepest node on both branches
    pub fn last_common_ancestor(&self, a: NodeId, b: NodeId) -> Option<NodeId> {
        let (mut a, mut b) = (Some(a), Some(b));
        while let (Some(x), Some(y)) = (a, b) {
            if x == y {
                return Some(x);
            }
            let (hx, hy) = (self.height(x), self.height(y));
            if hx >= hy {
                a = self.prev(x);
            }
            if hy >= hx {
                b = self.prev(y);
            }
        }
        None
    }

    /// Whether `id` was mined under the post-fork rules
    pub fn on_fork(&self, id: NodeId) -> bool {
        let rule = &self.fork_rule;
        self.height(id) >= rule.height
            && self.super_majority(rule.min_version, self.prev(id), rule.required, rule.window)
    }

    /// True if at least `required` of the `to_check` blocks ending at `start`
    /// have base version `min_version` or above
    pub fn super_majority(
        &self,
        min_version: u32,
        start: Option<NodeId>,
        required: u32,
        to_check: u32,
    ) -> bool {
        let mut found = 0;
        let mut cursor = start;
        let mut checked = 0;
        while let Some(id) = cursor {
            if checked >= to_check || found >= required {
                break;
            }
            if self.get(id).base_version() >= min_version {
                found += 1;
            }
            cursor = self.prev(id);
            checked += 1;
        }
        found >= required
    }

    /// Median time of the last 11 blocks ending at `id`
    ///
    /// Once a post-fork block has been seen, the walk stops after the first
    /// pre-fork block.
    pub fn median_time_past(&self, id: NodeId) -> i64 {
        let mut times = Vec::with_capacity(MEDIAN_TIME_SPAN);
        let mut was_on_fork = false;

        for node_id in self.ancestors(id).take(MEDIAN_TIME_SPAN) {
            times.push(self.get(node_id).block_time());
            let on_fork = self.on_fork(node_id);
            if was_on_fork && !on_fork {
                break;
            }
            was_on_fork |= on_fork;
        }

        times.sort_unstable();
        times[times.len() / 2]
    }

    /// Mean weighted work over the last 50 blocks ending at `id`
    pub fn average_work(&self, id: NodeId) -> U256 {
        let (sum, n) = self
            .ancestors(id)
            .take(AVERAGE_WORK_WINDOW)
            .fold((U256::zero(), 0u64), |(sum, n), a| {
                (sum.saturating_add(self.get(a).weighted_work()), n + 1)
            });
        sum / U256::from(n)
    }

    /// Raise the validity level of `id`
    pub fn raise_validity(&mut self, id: NodeId, level: u32) -> bool {
        self.nodes[id.index()].status.raise_validity(level)
    }

    /// Mark `id` failed and every known descendant failed-child
    pub fn mark_failed(&mut self, id: NodeId) {
        self.nodes[id.index()].status.set(BlockStatus::FAILED_VALID);
        // children always come after their parent in the arena
        for i in id.index() + 1..self.nodes.len() {
            if let Some(prev) = self.nodes[i].prev {
                if self.nodes[prev.index()].status.is_failed() {
                    self.nodes[i].status.set(BlockStatus::FAILED_CHILD);
                }
            }
        }
    }

    /// Record that the block data of `id` is stored at `pos`
    pub fn set_block_data(&mut self, id: NodeId, tx_count: u32, pos: DiskPos) {
        let prev_chain_tx = match self.prev(id) {
            Some(prev) => self.get(prev).chain_tx,
            None => 0,
        };
        let is_root = self.prev(id).is_none();

        let node = &mut self.nodes[id.index()];
        node.tx_count = tx_count;
        if is_root || prev_chain_tx != 0 {
            node.chain_tx = prev_chain_tx + tx_count as u64;
        }
        node.file = pos.file;
        node.data_pos = pos.pos;
        node.status.set(BlockStatus::HAVE_DATA);
        node.status.raise_validity(BlockStatus::VALID_TRANSACTIONS);
    }

    /// Record that the undo data of `id` is stored at `pos`
    pub fn set_undo_data(&mut self, id: NodeId, pos: DiskPos) {
        let node = &mut self.nodes[id.index()];
        node.file = pos.file;
        node.undo_pos = pos.pos;
        node.status.set(BlockStatus::HAVE_UNDO);
    }

    /// Record the cumulative money supply once the block's coinbase is connected
    pub fn set_money_supply(&mut self, id: NodeId, money_supply: i64) {
        self.nodes[id.index()].money_supply = money_supply;
    }
}

/// Iterator over a node and its predecessors
pub struct Ancestors<'a> {
    index: &'a BlockIndex,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.index.prev(current);
        Some(current)
    }
}
