//! Difficulty targets and weighted work
//!
//! Targets travel in the compact "bits" form: one exponent byte, a sign bit
//! and a 23-bit mantissa. Work is normalised by the algorithm weight so that
//! chains mined with different algorithms compare on one scale.

use primitive_types::{U256, U512};
use serde::{Deserialize, Serialize};
use super::algorithm::Algorithm;

/// Compact bits of the easiest mainnet-style target, difficulty 1.0
pub const DIFFICULTY_ONE_BITS: u32 = 0x1d00ffff;

/// Compact ("bits") encoding of a 256-bit target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Compact(pub u32);

/// Result of expanding a compact value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    pub value: U256,
    pub negative: bool,
    pub overflow: bool,
}

impl Target {
    /// Usable as a proof-of-work target: positive and representable
    pub fn is_valid(&self) -> bool {
        !self.negative && !self.overflow && !self.value.is_zero()
    }
}

impl Compact {
    /// Expand into a full target with its sign and overflow flags
    pub fn expand(self) -> Target {
        let compact = self.0;
        let size = compact >> 24;
        let mut word = compact & 0x007f_ffff;

        let negative = word != 0 && compact & 0x0080_0000 != 0;
        let overflow = word != 0
            && (size > 34 || (word > 0xff && size > 33) || (word > 0xffff && size > 32));

        let value = if overflow {
            U256::zero()
        } else if size <= 3 {
            word >>= 8 * (3 - size);
            U256::from(word)
        } else {
            U256::from(word) << (8 * (size - 3) as usize)
        };

        Target { value, negative, overflow }
    }

    /// The target if it is usable, otherwise `None`
    pub fn to_target(self) -> Option<U256> {
        let target = self.expand();
        target.is_valid().then_some(target.value)
    }

    /// Encode a target, rounding the mantissa down to 23 bits
    pub fn from_target(target: U256) -> Self {
        let mut size = (target.bits() + 7) / 8;
        let mut compact = (if size <= 3 {
            target.low_u64() << (8 * (3 - size))
        } else {
            (target >> (8 * (size - 3))).low_u64()
        }) as u32;

        // keep the sign bit clear
        if compact & 0x0080_0000 != 0 {
            compact >>= 8;
            size += 1;
        }

        Compact(compact | ((size as u32) << 24))
    }
}

impl From<u32> for Compact {
    fn from(bits: u32) -> Self {
        Compact(bits)
    }
}

/// Weighted work of one block: `2^256 / (target / weight + 1)`
///
/// Invalid targets contribute no work. A quotient that does not fit in
/// 256 bits saturates.
pub fn weighted_work(bits: u32, weight: u64) -> U256 {
    let target = Compact(bits).expand();
    if !target.is_valid() || weight == 0 {
        return U256::zero();
    }

    let divisor = U512::from(target.value) / U512::from(weight) + U512::one();
    let work = (U512::one() << 256) / divisor;
    U256::try_from(work).unwrap_or(U256::MAX)
}

/// Weighted work of a block mined with `algo`
pub fn block_work(bits: u32, algo: Algorithm) -> U256 {
    weighted_work(bits, algo.weight())
}

/// Display difficulty as a multiple of difficulty 1.0 (`0x1d00ffff`)
pub fn difficulty(bits: u32) -> f64 {
    let mantissa = bits & 0x00ff_ffff;
    if mantissa == 0 {
        return 0.0;
    }

    let mut shift = (bits >> 24) & 0xff;
    let mut diff = 0x0000_ffff as f64 / mantissa as f64;

    while shift < 29 {
        diff *= 256.0;
        shift += 1;
    }
    while shift > 29 {
        diff /= 256.0;
        shift -= 1;
    }

    diff
}

/// Display difficulty scaled by the algorithm weight
pub fn weighted_difficulty(bits: u32, algo: Algorithm) -> f64 {
    difficulty(bits) * algo.weight() as f64
}
