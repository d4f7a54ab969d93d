//! Database persistence layer using Sled
//!
//! Stores block index records keyed by block hash and the hash of the best
//! tip. Predecessor handles are process-local, so each record carries its
//! predecessor's hash and the index is relinked on load.

use std::path::Path;
use serde::{Deserialize, Serialize};
use sled::{Db, Tree};
use thiserror::Error;
use tracing::{debug, info};
use crate::crypto::Hash;
use crate::node::{ForkRule, NetworkParams};
use super::index::{BlockIndex, ChainNode, NodeId};
use super::state::ChainState;

const BEST_TIP_KEY: &str = "best_tip";

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Db(#[from] sled::Error),

    #[error("record encoding error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("corrupt index: {0}")]
    Corrupt(String),
}

/// On-disk form of one index entry
#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexRecord {
    node: ChainNode,
    prev_hash: Option<Hash>,
}

/// Block index database
#[derive(Debug, Clone)]
pub struct IndexDb {
    db: Db,
    index_tree: Tree,
    metadata_tree: Tree,
}

impl IndexDb {
    /// Open or create the database
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        Self::from_db(sled::open(path)?)
    }

    /// In-memory database removed on drop
    pub fn temporary() -> Result<Self, StorageError> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: Db) -> Result<Self, StorageError> {
        let index_tree = db.open_tree("block_index")?;
        let metadata_tree = db.open_tree("metadata")?;
        Ok(Self {
            db,
            index_tree,
            metadata_tree,
        })
    }

    /// Write one node of `index`
    pub fn save_node(&self, index: &BlockIndex, id: NodeId) -> Result<(), StorageError> {
        let node = index.get(id);
        let record = IndexRecord {
            node: node.clone(),
            prev_hash: node.prev.map(|prev| index.hash(prev)),
        };
        self.index_tree.insert(node.hash.0, bincode::serialize(&record)?)?;
        Ok(())
    }

    /// Write every node of `index` and flush
    pub fn save_index(&self, index: &BlockIndex) -> Result<(), StorageError> {
        for (id, _) in index.iter() {
            self.save_node(index, id)?;
        }
        self.db.flush()?;
        debug!(nodes = index.len(), "block index saved");
        Ok(())
    }

    /// Read a single node and its predecessor's hash
    pub fn get_node(&self, hash: &Hash) -> Result<Option<(ChainNode, Option<Hash>)>, StorageError> {
        match self.index_tree.get(hash.0)? {
            Some(bytes) => {
                let record: IndexRecord = bincode::deserialize(&bytes)?;
                Ok(Some((record.node, record.prev_hash)))
            }
            None => Ok(None),
        }
    }

    /// Rebuild the whole index
    ///
    /// Records are relinked parents first. A record whose predecessor is
    /// missing makes the load fail.
    pub fn load_index(&self, fork_rule: ForkRule) -> Result<BlockIndex, StorageError> {
        let mut records = Vec::new();
        for item in self.index_tree.iter() {
            let (_, value) = item?;
            let record: IndexRecord = bincode::deserialize(&value)?;
            records.push(record);
        }
        records.sort_by_key(|r| r.node.height);

        let mut index = BlockIndex::new(fork_rule);
        for record in records {
            if let Some(prev) = record.prev_hash {
                if !index.contains(&prev) {
                    return Err(StorageError::Corrupt(format!(
                        "predecessor {} of {} not stored",
                        prev, record.node.hash
                    )));
                }
            }
            index.insert_loaded(record.node, record.prev_hash);
        }

        info!(nodes = index.len(), "block index loaded");
        Ok(index)
    }

    pub fn set_best_tip(&self, hash: &Hash) -> Result<(), StorageError> {
        self.metadata_tree.insert(BEST_TIP_KEY, hash.0.as_ref())?;
        self.db.flush()?;
        Ok(())
    }

    pub fn best_tip(&self) -> Result<Option<Hash>, StorageError> {
        match self.metadata_tree.get(BEST_TIP_KEY)? {
            Some(bytes) => {
                let bytes: [u8; 32] = bytes
                    .as_ref()
                    .try_into()
                    .map_err(|_| StorageError::Corrupt(format!("best tip is {} bytes", bytes.len())))?;
                Ok(Some(Hash(bytes)))
            }
            None => Ok(None),
        }
    }

    /// Persist the index and best tip of `state`
    pub fn save_state(&self, state: &ChainState) -> Result<(), StorageError> {
        self.save_index(state.index())?;
        if let Some(tip) = state.tip_node() {
            self.set_best_tip(&tip.hash)?;
        }
        Ok(())
    }

    /// Chain state from disk, or a fresh genesis-only state if nothing is stored
    pub fn load_state(&self, params: NetworkParams) -> Result<ChainState, StorageError> {
        let index = self.load_index(params.fork_rule)?;
        if index.is_empty() {
            return Ok(ChainState::new(params));
        }
        let best = self.best_tip()?;
        Ok(ChainState::restore(params, index, best))
    }
}
