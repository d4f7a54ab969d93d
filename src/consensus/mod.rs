//! Consensus module - Algorithms, headers, merge-mining proofs, difficulty and checkpoints

mod algorithm;
mod block;
mod difficulty;
mod auxpow;
pub mod encode;
mod validation;
mod checkpoints;

pub use algorithm::*;
pub use block::*;
pub use difficulty::*;
pub use auxpow::*;
pub use encode::{Encodable, EncodeError};
pub use validation::*;
pub use checkpoints::*;
