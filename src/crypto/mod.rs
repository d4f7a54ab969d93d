//! Cryptography module - SHA-256d and Keccak hashing, Merkle trees

mod hash;
mod merkle;

pub use hash::*;
pub use merkle::*;
