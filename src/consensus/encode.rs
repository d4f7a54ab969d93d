//! Consensus serialization
//!
//! Little-endian integers, bitcoin compact-size lengths, and the wire forms
//! of headers, coinbase transactions and merge-mining proofs. The layout of
//! a proof's coinbase and parent header depends on the child block's
//! algorithm, see [`ProofFormat`].

use thiserror::Error;
use crate::crypto::Hash;
use crate::validation::{CoinbaseTx, OutPoint, RawTxHash, Transaction, TxIn, TxOut};
use super::algorithm::Algorithm;
use super::auxpow::{MergeMineProof, ProofFormat};
use super::block::{BlockHeader, HeaderBody, PowNonce};

/// Largest length prefix accepted when decoding
pub const MAX_SIZE: u64 = 0x0200_0000;

/// Decoding errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EncodeError {
    #[error("unexpected end of data: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof { needed: usize, remaining: usize },

    #[error("non-canonical compact size")]
    NonCanonicalSize,

    #[error("length {0} exceeds maximum")]
    OversizedLength(u64),

    #[error("{0} trailing bytes after object")]
    TrailingBytes(usize),

    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),
}

/// Types with a consensus byte encoding
pub trait Encodable {
    fn encode(&self, out: &mut Vec<u8>);

    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode(&mut out);
        out
    }

    fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }
}

/// Append a bitcoin compact-size integer
pub fn write_compact_size(out: &mut Vec<u8>, n: u64) {
    if n < 0xfd {
        out.push(n as u8);
    } else if n <= 0xffff {
        out.push(0xfd);
        out.extend_from_slice(&(n as u16).to_le_bytes());
    } else if n <= 0xffff_ffff {
        out.push(0xfe);
        out.extend_from_slice(&(n as u32).to_le_bytes());
    } else {
        out.push(0xff);
        out.extend_from_slice(&n.to_le_bytes());
    }
}

fn write_var_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    write_compact_size(out, bytes.len() as u64);
    out.extend_from_slice(bytes);
}

fn write_hashes(out: &mut Vec<u8>, hashes: &[Hash]) {
    write_compact_size(out, hashes.len() as u64);
    for hash in hashes {
        out.extend_from_slice(&hash.0);
    }
}

/// Cursor over a byte slice
#[derive(Debug)]
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], EncodeError> {
        if n > self.remaining() {
            return Err(EncodeError::UnexpectedEof {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], EncodeError> {
        let mut arr = [0u8; N];
        arr.copy_from_slice(self.read_bytes(N)?);
        Ok(arr)
    }

    pub fn read_u8(&mut self) -> Result<u8, EncodeError> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, EncodeError> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32, EncodeError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32, EncodeError> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64, EncodeError> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_i64(&mut self) -> Result<i64, EncodeError> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    pub fn read_hash(&mut self) -> Result<Hash, EncodeError> {
        Ok(Hash(self.read_array()?))
    }

    /// Read a canonical compact-size integer
    pub fn read_compact_size(&mut self) -> Result<u64, EncodeError> {
        let (value, min) = match self.read_u8()? {
            0xfd => (self.read_u16()? as u64, 0xfd),
            0xfe => (self.read_u32()? as u64, 0x1_0000),
            0xff => (self.read_u64()?, 0x1_0000_0000),
            n => return Ok(n as u64),
        };
        if value < min {
            return Err(EncodeError::NonCanonicalSize);
        }
        Ok(value)
    }

    /// Read a length, bounded by [`MAX_SIZE`]
    pub fn read_length(&mut self) -> Result<usize, EncodeError> {
        let len = self.read_compact_size()?;
        if len > MAX_SIZE {
            return Err(EncodeError::OversizedLength(len));
        }
        Ok(len as usize)
    }

    pub fn read_var_bytes(&mut self) -> Result<Vec<u8>, EncodeError> {
        let len = self.read_length()?;
        Ok(self.read_bytes(len)?.to_vec())
    }

    pub fn read_hashes(&mut self) -> Result<Vec<Hash>, EncodeError> {
        let count = self.read_length()?;
        (0..count).map(|_| self.read_hash()).collect()
    }

    /// Require that everything was consumed
    pub fn finish(self) -> Result<(), EncodeError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(EncodeError::TrailingBytes(n)),
        }
    }
}

/// Read an 80-byte header with a 32-bit nonce
pub fn decode_header(r: &mut Reader<'_>) -> Result<BlockHeader, EncodeError> {
    Ok(BlockHeader::new(
        r.read_u32()?,
        r.read_hash()?,
        r.read_hash()?,
        r.read_u32()?,
        r.read_u32()?,
        r.read_u32()?,
    ))
}

/// Read an Equihash-layout header
pub fn decode_equihash_header(r: &mut Reader<'_>) -> Result<BlockHeader, EncodeError> {
    let version = r.read_u32()?;
    let prev_hash = r.read_hash()?;
    let merkle_root = r.read_hash()?;
    let reserved = r.read_hash()?;
    let time = r.read_u32()?;
    let bits = r.read_u32()?;
    let nonce = r.read_hash()?;
    let solution = r.read_var_bytes()?;
    Ok(BlockHeader {
        version,
        prev_hash,
        merkle_root,
        time,
        bits,
        nonce: PowNonce::Equihash { reserved, nonce, solution },
    })
}

/// Append a header in its wire form
pub fn encode_header(header: &BlockHeader, out: &mut Vec<u8>) {
    out.extend_from_slice(&header.version.to_le_bytes());
    out.extend_from_slice(&header.prev_hash.0);
    out.extend_from_slice(&header.merkle_root.0);
    match &header.nonce {
        PowNonce::Compact(nonce) => {
            out.extend_from_slice(&header.time.to_le_bytes());
            out.extend_from_slice(&header.bits.to_le_bytes());
            out.extend_from_slice(&nonce.to_le_bytes());
        }
        PowNonce::Equihash { reserved, nonce, solution } => {
            out.extend_from_slice(&reserved.0);
            out.extend_from_slice(&header.time.to_le_bytes());
            out.extend_from_slice(&header.bits.to_le_bytes());
            out.extend_from_slice(&nonce.0);
            write_var_bytes(out, solution);
        }
    }
}

impl Encodable for HeaderBody {
    fn encode(&self, out: &mut Vec<u8>) {
        match self {
            HeaderBody::Structured(header) => encode_header(header, out),
            HeaderBody::Opaque(bytes) => write_var_bytes(out, bytes),
        }
    }
}

/// Read a bitcoin-style transaction
pub fn decode_transaction(r: &mut Reader<'_>) -> Result<Transaction, EncodeError> {
    let version = r.read_u32()?;

    let input_count = r.read_length()?;
    let mut inputs = Vec::with_capacity(input_count.min(1024));
    for _ in 0..input_count {
        let prev_out = OutPoint { hash: r.read_hash()?, index: r.read_u32()? };
        let script_sig = r.read_var_bytes()?;
        let sequence = r.read_u32()?;
        inputs.push(TxIn { prev_out, script_sig, sequence });
    }

    let output_count = r.read_length()?;
    let mut outputs = Vec::with_capacity(output_count.min(1024));
    for _ in 0..output_count {
        let value = r.read_i64()?;
        let script_pubkey = r.read_var_bytes()?;
        outputs.push(TxOut { value, script_pubkey });
    }

    let lock_time = r.read_u32()?;
    Ok(Transaction { version, inputs, outputs, lock_time })
}

impl Encodable for CoinbaseTx {
    fn encode(&self, out: &mut Vec<u8>) {
        match self {
            CoinbaseTx::Structured(tx) => tx.encode(out),
            CoinbaseTx::Raw { bytes, .. } => write_var_bytes(out, bytes),
        }
    }
}

impl Encodable for MergeMineProof {
    fn encode(&self, out: &mut Vec<u8>) {
        self.coinbase.encode(out);
        out.extend_from_slice(&self.parent_block_hash.0);
        write_hashes(out, &self.merkle_branch);
        out.extend_from_slice(&self.index.to_le_bytes());
        write_hashes(out, &self.chain_branch);
        out.extend_from_slice(&self.chain_index.to_le_bytes());
        self.parent.encode(out);
    }
}

/// Read a merge-mining proof for a child block mined with `algo`
pub fn decode_proof(r: &mut Reader<'_>, algo: Algorithm) -> Result<MergeMineProof, EncodeError> {
    let format = ProofFormat::for_algorithm(algo);

    let coinbase = match format {
        ProofFormat::Bitcoin => CoinbaseTx::Structured(decode_transaction(r)?),
        ProofFormat::Equihash => CoinbaseTx::Raw {
            bytes: r.read_var_bytes()?,
            hashing: RawTxHash::Sha256d,
        },
        ProofFormat::Cryptonight => CoinbaseTx::Raw {
            bytes: r.read_var_bytes()?,
            hashing: RawTxHash::Keccak,
        },
    };
    let parent_block_hash = r.read_hash()?;
    let merkle_branch = r.read_hashes()?;
    let index = r.read_i32()?;
    let chain_branch = r.read_hashes()?;
    let chain_index = r.read_i32()?;
    let parent = match format {
        ProofFormat::Bitcoin => HeaderBody::Structured(decode_header(r)?),
        ProofFormat::Equihash => HeaderBody::Structured(decode_equihash_header(r)?),
        ProofFormat::Cryptonight => HeaderBody::Opaque(r.read_var_bytes()?),
    };

    Ok(MergeMineProof {
        coinbase,
        parent_block_hash,
        merkle_branch,
        index,
        chain_branch,
        chain_index,
        parent,
    })
}

/// Decode a proof from hex, as submitted by merge-miners
pub fn proof_from_hex(hex: &str, algo: Algorithm) -> Result<MergeMineProof, EncodeError> {
    let bytes = hex::decode(hex.trim())?;
    let mut r = Reader::new(&bytes);
    let proof = decode_proof(&mut r, algo)?;
    r.finish()?;
    Ok(proof)
}

/// Serialize a child header followed by its proof, if any
pub fn encode_block_header(header: &BlockHeader, auxpow: Option<&MergeMineProof>) -> Vec<u8> {
    let mut out = Vec::new();
    encode_header(header, &mut out);
    if let Some(proof) = auxpow {
        proof.encode(&mut out);
    }
    out
}

/// Decode a child header; a proof follows when the auxpow flag is set
pub fn decode_block_header(
    bytes: &[u8],
) -> Result<(BlockHeader, Option<MergeMineProof>), EncodeError> {
    let mut r = Reader::new(bytes);
    let header = decode_header(&mut r)?;
    let auxpow = if header.is_auxpow() {
        Some(decode_proof(&mut r, header.algorithm())?)
    } else {
        None
    };
    r.finish()?;
    Ok((header, auxpow))
}
