//! Proof-of-work algorithm table
//!
//! Every block names one of eight hashing algorithms in its version bits.
//! Each algorithm has a fixed weight that normalises its work against the
//! others. The hash functions themselves are supplied by the caller through
//! [`PowHasher`] and [`EquihashVerifier`].

use crate::crypto::Hash;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Proof-of-work algorithm tag (3 bits of the block version)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Algorithm {
    Scrypt = 0,
    Sha256d = 1,
    Yescrypt = 2,
    Argon2 = 3,
    X17 = 4,
    Lyra2REv2 = 5,
    Equihash = 6,
    Cryptonight = 7,
}

impl Algorithm {
    /// All algorithms in tag order
    pub const ALL: [Algorithm; 8] = [
        Algorithm::Scrypt,
        Algorithm::Sha256d,
        Algorithm::Yescrypt,
        Algorithm::Argon2,
        Algorithm::X17,
        Algorithm::Lyra2REv2,
        Algorithm::Equihash,
        Algorithm::Cryptonight,
    ];

    /// Decode a 3-bit tag. Only the low three bits are read, so every
    /// input maps to an algorithm.
    pub fn from_tag(tag: u32) -> Self {
        Self::ALL[(tag & 7) as usize]
    }

    /// The 3-bit tag stored in the block version
    pub fn tag(self) -> u32 {
        self as u32
    }

    /// Work weight used to compare chains mined with different algorithms
    pub fn weight(self) -> u64 {
        match self {
            Algorithm::Sha256d => 1,
            Algorithm::Argon2 => 4_000_000,
            Algorithm::Equihash | Algorithm::Cryptonight => 8_000_000,
            Algorithm::Yescrypt => 800_000,
            Algorithm::Scrypt | Algorithm::X17 | Algorithm::Lyra2REv2 => 8_000,
        }
    }

    /// Lower-case name, as accepted by [`FromStr`]
    pub fn name(self) -> &'static str {
        match self {
            Algorithm::Scrypt => "scrypt",
            Algorithm::Sha256d => "sha256d",
            Algorithm::Yescrypt => "yescrypt",
            Algorithm::Argon2 => "argon2",
            Algorithm::X17 => "x17",
            Algorithm::Lyra2REv2 => "lyra2rev2",
            Algorithm::Equihash => "equihash",
            Algorithm::Cryptonight => "cryptonight",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Unknown algorithm name
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown algorithm: {0}")]
pub struct UnknownAlgorithm(pub String);

impl FromStr for Algorithm {
    type Err = UnknownAlgorithm;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|algo| algo.name() == lower)
            .ok_or_else(|| UnknownAlgorithm(s.to_string()))
    }
}

/// Proof-of-work hash capability, one implementation per algorithm
///
/// `bytes` is the serialized header (or the raw parent bytes for an opaque
/// CryptoNight parent). Implementations may be memory hard and slow; they
/// are called synchronously.
pub trait PowHasher {
    fn pow_hash(&self, algo: Algorithm, bytes: &[u8]) -> Hash;
}

/// Equihash solution verifier for the network's (n, k)
pub trait EquihashVerifier {
    fn verify(&self, n: u32, k: u32, state: &[u8], solution: &[u8]) -> bool;
}

impl<T: PowHasher + ?Sized> PowHasher for &T {
    fn pow_hash(&self, algo: Algorithm, bytes: &[u8]) -> Hash {
        (**self).pow_hash(algo, bytes)
    }
}

impl<T: EquihashVerifier + ?Sized> EquihashVerifier for &T {
    fn verify(&self, n: u32, k: u32, state: &[u8], solution: &[u8]) -> bool {
        (**self).verify(n, k, state, solution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_roundtrip() {
        for algo in Algorithm::ALL {
            assert_eq!(Algorithm::from_tag(algo.tag()), algo);
        }
        assert_eq!(Algorithm::from_tag(0), Algorithm::Scrypt);
        assert_eq!(Algorithm::from_tag(7), Algorithm::Cryptonight);
        // only the low bits count
        assert_eq!(Algorithm::from_tag(9), Algorithm::Sha256d);
    }

    #[test]
    fn test_weights() {
        assert_eq!(Algorithm::Sha256d.weight(), 1);
        assert_eq!(Algorithm::Argon2.weight(), 4_000_000);
        assert_eq!(Algorithm::Equihash.weight(), 8_000_000);
        assert_eq!(Algorithm::Cryptonight.weight(), 8_000_000);
        assert_eq!(Algorithm::Yescrypt.weight(), 800_000);
        assert_eq!(Algorithm::Scrypt.weight(), 8_000);
        assert_eq!(Algorithm::X17.weight(), 8_000);
        assert_eq!(Algorithm::Lyra2REv2.weight(), 8_000);
    }

    #[test]
    fn test_names_parse() {
        for algo in Algorithm::ALL {
            assert_eq!(algo.name().parse::<Algorithm>().unwrap(), algo);
        }
        assert_eq!("SHA256D".parse::<Algorithm>().unwrap(), Algorithm::Sha256d);
        assert!("blake".parse::<Algorithm>().is_err());
    }
}
