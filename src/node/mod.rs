//! Node module - Network parameters and genesis blocks

mod genesis;
mod params;

pub use genesis::*;
pub use params::*;
