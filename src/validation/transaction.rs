//! Transaction structure
//!
//! Only what block headers and merge-mining proofs need: the bitcoin-style
//! transaction used for coinbases and genesis blocks, and the parent-chain
//! coinbase that may arrive as raw bytes in the parent's own format.

use serde::{Deserialize, Serialize};
use crate::consensus::encode::{write_compact_size, Encodable};
use crate::crypto::{keccak256, sha256d, Hash};

/// Second block of the CryptoNight coinbase tree hash (base-transaction RCT hash)
const CRYPTONIGHT_BASE_RCT_HASH: [u8; 32] = [
    0xbc, 0x36, 0x78, 0x9e, 0x7a, 0x1e, 0x28, 0x14, 0x36, 0x46, 0x42, 0x29, 0x82, 0x8f, 0x81, 0x7d,
    0x66, 0x12, 0xf7, 0xb4, 0x77, 0xd6, 0x65, 0x91, 0xff, 0x96, 0xa9, 0xe0, 0x64, 0xbc, 0xc9, 0x8a,
];

const OP_PUSHDATA1: u8 = 0x4c;
const OP_PUSHDATA2: u8 = 0x4d;
const OP_PUSHDATA4: u8 = 0x4e;
/// OP_CHECKSIG
pub const OP_CHECKSIG: u8 = 0xac;

/// Reference to a previous transaction output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutPoint {
    pub hash: Hash,
    pub index: u32,
}

impl OutPoint {
    /// The null outpoint spent by coinbase inputs
    pub fn null() -> Self {
        Self { hash: Hash::zero(), index: 0xFFFF_FFFF }
    }

    pub fn is_null(&self) -> bool {
        self.hash.is_zero() && self.index == 0xFFFF_FFFF
    }
}

/// A transaction input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxIn {
    pub prev_out: OutPoint,
    pub script_sig: Vec<u8>,
    pub sequence: u32,
}

/// A transaction output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOut {
    /// Amount in base units
    pub value: i64,
    pub script_pubkey: Vec<u8>,
}

/// A complete transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction version
    pub version: u32,
    /// Transaction inputs
    pub inputs: Vec<TxIn>,
    /// Transaction outputs
    pub outputs: Vec<TxOut>,
    /// Lock time (block height or timestamp)
    pub lock_time: u32,
}

impl Transaction {
    /// Create a new transaction
    pub fn new(inputs: Vec<TxIn>, outputs: Vec<TxOut>) -> Self {
        Self {
            version: 1,
            inputs,
            outputs,
            lock_time: 0,
        }
    }

    /// Create a coinbase transaction with the given input script
    pub fn coinbase(script_sig: Vec<u8>, outputs: Vec<TxOut>) -> Self {
        Self::new(
            vec![TxIn {
                prev_out: OutPoint::null(),
                script_sig,
                sequence: 0xFFFF_FFFF,
            }],
            outputs,
        )
    }

    /// Check if this is a coinbase transaction
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].prev_out.is_null()
    }

    /// Calculate transaction hash
    pub fn hash(&self) -> Hash {
        sha256d(&self.to_bytes())
    }

    /// Calculate total output value
    pub fn total_output_value(&self) -> i64 {
        self.outputs.iter().map(|o| o.value).sum()
    }
}

/// Hashing rule for a parent coinbase delivered as raw bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RawTxHash {
    /// SHA-256d of the bytes
    Sha256d,
    /// CryptoNight coinbase tree hash
    Keccak,
}

/// The parent chain's coinbase as carried in a merge-mining proof
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoinbaseTx {
    /// Bitcoin-style transaction
    Structured(Transaction),
    /// The parent's native bytes
    Raw { bytes: Vec<u8>, hashing: RawTxHash },
}

impl CoinbaseTx {
    /// Transaction hash used as the leaf of the parent merkle tree
    pub fn hash(&self) -> Hash {
        match self {
            CoinbaseTx::Structured(tx) => tx.hash(),
            CoinbaseTx::Raw { bytes, hashing: RawTxHash::Sha256d } => sha256d(bytes),
            CoinbaseTx::Raw { bytes, hashing: RawTxHash::Keccak } => cryptonight_tx_hash(bytes),
        }
    }

    /// Bytes searched for the merge-mining commitment
    ///
    /// The first input's script for structured transactions, the whole
    /// payload for raw ones. A structured transaction without inputs has
    /// an empty script.
    pub fn script(&self) -> &[u8] {
        match self {
            CoinbaseTx::Structured(tx) => tx
                .inputs
                .first()
                .map(|input| input.script_sig.as_slice())
                .unwrap_or(&[]),
            CoinbaseTx::Raw { bytes, .. } => bytes,
        }
    }

    pub fn is_raw(&self) -> bool {
        matches!(self, CoinbaseTx::Raw { .. })
    }
}

/// CryptoNight coinbase hash: `keccak(keccak(tx) || base RCT hash || zero hash)`
pub fn cryptonight_tx_hash(raw: &[u8]) -> Hash {
    let mut data = [0u8; 96];
    data[..32].copy_from_slice(&keccak256(raw).0);
    data[32..64].copy_from_slice(&CRYPTONIGHT_BASE_RCT_HASH);
    keccak256(&data)
}

/// Append a minimal data push to a script
pub fn push_slice(script: &mut Vec<u8>, data: &[u8]) {
    let len = data.len();
    if len < OP_PUSHDATA1 as usize {
        script.push(len as u8);
    } else if len <= 0xff {
        script.push(OP_PUSHDATA1);
        script.push(len as u8);
    } else if len <= 0xffff {
        script.push(OP_PUSHDATA2);
        script.extend_from_slice(&(len as u16).to_le_bytes());
    } else {
        script.push(OP_PUSHDATA4);
        script.extend_from_slice(&(len as u32).to_le_bytes());
    }
    script.extend_from_slice(data);
}

/// Append a script number push (little-endian, sign bit in the top byte)
pub fn push_int(script: &mut Vec<u8>, value: i64) {
    if value == 0 {
        script.push(0);
        return;
    }

    let negative = value < 0;
    let mut abs = value.unsigned_abs();
    let mut bytes = Vec::new();
    while abs > 0 {
        bytes.push((abs & 0xff) as u8);
        abs >>= 8;
    }
    if bytes.last().map_or(false, |b| b & 0x80 != 0) {
        bytes.push(if negative { 0x80 } else { 0 });
    } else if negative {
        if let Some(last) = bytes.last_mut() {
            *last |= 0x80;
        }
    }
    push_slice(script, &bytes);
}

impl Encodable for Transaction {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.version.to_le_bytes());

        write_compact_size(out, self.inputs.len() as u64);
        for input in &self.inputs {
            out.extend_from_slice(&input.prev_out.hash.0);
            out.extend_from_slice(&input.prev_out.index.to_le_bytes());
            write_compact_size(out, input.script_sig.len() as u64);
            out.extend_from_slice(&input.script_sig);
            out.extend_from_slice(&input.sequence.to_le_bytes());
        }

        write_compact_size(out, self.outputs.len() as u64);
        for output in &self.outputs {
            out.extend_from_slice(&output.value.to_le_bytes());
            write_compact_size(out, output.script_pubkey.len() as u64);
            out.extend_from_slice(&output.script_pubkey);
        }

        out.extend_from_slice(&self.lock_time.to_le_bytes());
    }
}
