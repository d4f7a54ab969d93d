//! Active chain
//!
//! Height-indexed view of one path through the block index, from genesis to
//! the selected tip.

use serde::{Deserialize, Serialize};
use tracing::info;
use crate::crypto::Hash;
use super::index::{BlockIndex, NodeId};

/// Hashes at exponentially increasing distance from a tip, ending at genesis
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locator {
    pub hashes: Vec<Hash>,
}

impl Locator {
    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}

/// The current best chain; `chain[h]` is the node at height `h`
#[derive(Debug, Clone, Default)]
pub struct ActiveChain {
    chain: Vec<NodeId>,
}

impl ActiveChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn genesis(&self) -> Option<NodeId> {
        self.chain.first().copied()
    }

    pub fn tip(&self) -> Option<NodeId> {
        self.chain.last().copied()
    }

    pub fn at(&self, height: u32) -> Option<NodeId> {
        self.chain.get(height as usize).copied()
    }

    /// Height of the tip
    pub fn height(&self) -> Option<u32> {
        self.chain.len().checked_sub(1).map(|h| h as u32)
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    /// Whether `id` itself sits on this chain
    pub fn contains(&self, index: &BlockIndex, id: NodeId) -> bool {
        self.at(index.height(id)) == Some(id)
    }

    /// Successor of `id` on this chain
    pub fn next(&self, index: &BlockIndex, id: NodeId) -> Option<NodeId> {
        if self.contains(index, id) {
            self.at(index.height(id) + 1)
        } else {
            None
        }
    }

    /// Make `tip` the end of the chain
    ///
    /// Entries are replaced from `tip` back to the first node already in
    /// place. Returns that node (the fork point), or `None` if the new path
    /// shares nothing with the old one.
    pub fn set_tip(&mut self, index: &BlockIndex, tip: Option<NodeId>) -> Option<NodeId> {
        let tip = match tip {
            Some(tip) => tip,
            None => {
                self.chain.clear();
                return None;
            }
        };

        let old_height = self.height();
        let new_height = index.height(tip);

        // drop entries above the new tip, keep the rest for comparison
        self.chain.truncate(new_height as usize + 1);

        let mut fork = None;
        let mut cursor = Some(tip);
        while let Some(id) = cursor {
            let h = index.height(id) as usize;
            if self.chain.get(h) == Some(&id) {
                fork = Some(id);
                break;
            }
            if h < self.chain.len() {
                self.chain[h] = id;
            } else {
                self.chain.resize(h + 1, id);
            }
            cursor = index.prev(id);
        }

        assert_eq!(
            self.chain.len(),
            new_height as usize + 1,
            "active chain: tip at height {} does not reach genesis",
            new_height
        );

        info!(
            old_height = ?old_height,
            new_height,
            fork_height = ?fork.map(|f| index.height(f)),
            tip = %index.hash(tip),
            "new best chain"
        );
        fork
    }

    /// Locator starting at `from`, or at the tip when `from` is `None`
    ///
    /// The 12 most recent blocks are listed one by one, after which the step
    /// doubles each time. The last entry is always the genesis hash.
    pub fn locator(&self, index: &BlockIndex, from: Option<NodeId>) -> Locator {
        let mut hashes = Vec::with_capacity(32);
        let mut step = 1u32;
        let mut cursor = from.or_else(|| self.tip());

        while let Some(id) = cursor {
            hashes.push(index.hash(id));
            let height = index.height(id);
            if height == 0 {
                break;
            }
            let target = height.saturating_sub(step);
            cursor = if self.contains(index, id) {
                self.at(target)
            } else {
                index.ancestor(id, target)
            };
            if hashes.len() > 10 {
                step = step.saturating_mul(2);
            }
        }

        Locator { hashes }
    }

    /// First locator entry that lies on this chain, or genesis
    pub fn find_fork(&self, index: &BlockIndex, locator: &Locator) -> Option<NodeId> {
        locator
            .hashes
            .iter()
            .filter_map(|hash| index.lookup(hash))
            .find(|&id| self.contains(index, id))
            .or_else(|| self.genesis())
    }
}
