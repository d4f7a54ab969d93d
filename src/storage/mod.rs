//! Storage module - Block index, active chain and chain state

mod index;
mod chain;
mod state;
pub mod db;

pub use index::*;
pub use chain::*;
pub use state::*;
