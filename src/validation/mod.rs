//! Validation module - parent-chain coinbase transactions

mod transaction;

pub use transaction::*;
